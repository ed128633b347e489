//! Quality tier and review priority assignment.
//!
//! Tiers are assigned on *effective* confidence: the geocoder's confidence
//! with approach/method penalties applied. Records keep the geocoder's
//! confidence; the penalty only shifts how the result is tiered and
//! queued.

use std::collections::{BTreeMap, BTreeSet};

use locate_map_cache_models::{QualityTier, ReviewPriority};

/// Approach tag of the city-centroid fallback strategy.
pub const FALLBACK_APPROACH: &str = "city_centroid_fallback";

/// Penalty applied to fallback geocodes before tiering.
pub const FALLBACK_PENALTY: f64 = 0.10;

/// Tier thresholds on effective confidence.
pub const EXCELLENT_MIN: f64 = 0.90;
/// Lower bound of the GOOD tier.
pub const GOOD_MIN: f64 = 0.80;
/// Lower bound of the ACCEPTABLE tier.
pub const ACCEPTABLE_MIN: f64 = 0.65;
/// Lower bound of the REVIEW_NEEDED tier; below this a result is FAILED.
pub const REVIEW_NEEDED_MIN: f64 = 0.40;

/// Confidence below which an emergency ticket escalates to HIGH priority.
const EMERGENCY_CONFIDENCE_MIN: f64 = 0.75;

/// What the assessor needs to know about a new result.
#[derive(Debug, Clone)]
pub struct AssessmentInput<'a> {
    /// Geocoder confidence, before penalties.
    pub confidence: Option<f64>,
    /// Whether coordinates were produced.
    pub has_coordinates: bool,
    /// Producing stage name.
    pub method: &'a str,
    /// Sub-strategy tag.
    pub approach: Option<&'a str>,
    /// Whether the ticket is an emergency.
    pub is_emergency: bool,
    /// Flags already raised by the validation engine.
    pub flags: &'a BTreeSet<String>,
}

/// The assessor's verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    /// Confidence after penalties, clamped at 0.
    pub effective_confidence: Option<f64>,
    /// Assigned quality tier.
    pub tier: QualityTier,
    /// Assigned review priority.
    pub priority: ReviewPriority,
}

/// Maps geocode results to quality tiers and review priorities.
///
/// The only built-in penalty is the city-centroid fallback's −0.10; other
/// methods can be penalized through the configured map, and default to
/// zero.
#[derive(Debug, Clone, Default)]
pub struct QualityAssessor {
    method_penalties: BTreeMap<String, f64>,
}

impl QualityAssessor {
    /// An assessor with no method penalties beyond the fallback's.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An assessor with additional per-method penalties.
    #[must_use]
    pub const fn with_method_penalties(method_penalties: BTreeMap<String, f64>) -> Self {
        Self { method_penalties }
    }

    /// Assigns a tier and review priority.
    #[must_use]
    pub fn assess(&self, input: &AssessmentInput<'_>) -> Assessment {
        let penalty = self.penalty_for(input.method, input.approach);
        let effective_confidence = input.confidence.map(|c| (c - penalty).max(0.0));

        let mut tier = tier_for(input.has_coordinates, effective_confidence);
        // A city centroid is never better than a guess, no matter how many
        // ticket-context bonuses stacked up.
        if input.approach == Some(FALLBACK_APPROACH) && tier > QualityTier::ReviewNeeded {
            tier = QualityTier::ReviewNeeded;
        }
        let priority = priority_for(input, tier, effective_confidence);

        Assessment {
            effective_confidence,
            tier,
            priority,
        }
    }

    fn penalty_for(&self, method: &str, approach: Option<&str>) -> f64 {
        let approach_penalty = if approach == Some(FALLBACK_APPROACH) {
            FALLBACK_PENALTY
        } else {
            0.0
        };
        approach_penalty + self.method_penalties.get(method).copied().unwrap_or(0.0)
    }
}

fn tier_for(has_coordinates: bool, effective_confidence: Option<f64>) -> QualityTier {
    if !has_coordinates {
        return QualityTier::Failed;
    }
    match effective_confidence {
        Some(c) if c >= EXCELLENT_MIN => QualityTier::Excellent,
        Some(c) if c >= GOOD_MIN => QualityTier::Good,
        Some(c) if c >= ACCEPTABLE_MIN => QualityTier::Acceptable,
        Some(c) if c >= REVIEW_NEEDED_MIN => QualityTier::ReviewNeeded,
        _ => QualityTier::Failed,
    }
}

/// Priority ladder, first match wins. The final LOW floor keeps the
/// no-review guarantee restricted to clean EXCELLENT/GOOD records.
fn priority_for(
    input: &AssessmentInput<'_>,
    tier: QualityTier,
    effective_confidence: Option<f64>,
) -> ReviewPriority {
    let has_flags = !input.flags.is_empty();

    if !input.has_coordinates || tier == QualityTier::Failed {
        return ReviewPriority::Critical;
    }
    if input.approach == Some(FALLBACK_APPROACH) {
        return ReviewPriority::High;
    }
    if input.is_emergency && effective_confidence.unwrap_or(0.0) < EMERGENCY_CONFIDENCE_MIN {
        return ReviewPriority::High;
    }
    if has_flags && tier == QualityTier::ReviewNeeded {
        return ReviewPriority::Medium;
    }
    if has_flags && tier == QualityTier::Acceptable {
        return ReviewPriority::Low;
    }
    if has_flags || tier < QualityTier::Good {
        return ReviewPriority::Low;
    }
    ReviewPriority::None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(confidence: f64, flags: &'a BTreeSet<String>) -> AssessmentInput<'a> {
        AssessmentInput {
            confidence: Some(confidence),
            has_coordinates: true,
            method: "proximity",
            approach: Some("corridor_midpoint"),
            is_emergency: false,
            flags,
        }
    }

    #[test]
    fn tiers_follow_thresholds() {
        let assessor = QualityAssessor::new();
        let flags = BTreeSet::new();
        let cases = [
            (0.95, QualityTier::Excellent),
            (0.90, QualityTier::Excellent),
            (0.85, QualityTier::Good),
            (0.80, QualityTier::Good),
            (0.70, QualityTier::Acceptable),
            (0.65, QualityTier::Acceptable),
            (0.50, QualityTier::ReviewNeeded),
            (0.40, QualityTier::ReviewNeeded),
            (0.39, QualityTier::Failed),
        ];
        for (confidence, expected) in cases {
            let verdict = assessor.assess(&input(confidence, &flags));
            assert_eq!(verdict.tier, expected, "confidence = {confidence}");
        }
    }

    #[test]
    fn missing_coordinates_fail_and_go_critical() {
        let assessor = QualityAssessor::new();
        let flags = BTreeSet::new();
        let mut i = input(0.9, &flags);
        i.has_coordinates = false;
        i.confidence = None;
        let verdict = assessor.assess(&i);
        assert_eq!(verdict.tier, QualityTier::Failed);
        assert_eq!(verdict.priority, ReviewPriority::Critical);
    }

    #[test]
    fn fallback_penalty_shifts_the_tier() {
        let assessor = QualityAssessor::new();
        let flags = BTreeSet::new();
        let mut i = input(0.40, &flags);
        i.approach = Some(FALLBACK_APPROACH);
        let verdict = assessor.assess(&i);
        // 0.40 − 0.10 = 0.30 effective: FAILED, CRITICAL.
        assert!((verdict.effective_confidence.unwrap() - 0.30).abs() < 1e-9);
        assert_eq!(verdict.tier, QualityTier::Failed);
        assert_eq!(verdict.priority, ReviewPriority::Critical);
    }

    #[test]
    fn fallback_never_rises_above_review_needed() {
        let assessor = QualityAssessor::new();
        let flags = BTreeSet::new();
        // A maximally-boosted fallback (0.35 base + 0.40 of bonuses,
        // 0.65 effective after the penalty) is still capped.
        let mut i = input(0.75, &flags);
        i.approach = Some(FALLBACK_APPROACH);
        let verdict = assessor.assess(&i);
        assert_eq!(verdict.tier, QualityTier::ReviewNeeded);
        assert_eq!(verdict.priority, ReviewPriority::High);
    }

    #[test]
    fn emergency_low_confidence_goes_high() {
        let assessor = QualityAssessor::new();
        let flags = BTreeSet::new();
        let mut i = input(0.74, &flags);
        i.is_emergency = true;
        assert_eq!(assessor.assess(&i).priority, ReviewPriority::High);

        let mut calm = input(0.74, &flags);
        calm.is_emergency = false;
        assert_ne!(assessor.assess(&calm).priority, ReviewPriority::High);
    }

    #[test]
    fn flagged_mid_tiers_queue_at_medium_and_low() {
        let assessor = QualityAssessor::new();
        let mut flags = BTreeSet::new();
        flags.insert("low_confidence".to_string());

        assert_eq!(
            assessor.assess(&input(0.64, &flags)).priority,
            ReviewPriority::Medium
        );
        assert_eq!(
            assessor.assess(&input(0.70, &flags)).priority,
            ReviewPriority::Low
        );
    }

    #[test]
    fn none_priority_only_for_clean_good_records() {
        let assessor = QualityAssessor::new();
        let empty = BTreeSet::new();
        assert_eq!(
            assessor.assess(&input(0.85, &empty)).priority,
            ReviewPriority::None
        );
        // A clean ACCEPTABLE record still queues LOW.
        assert_eq!(
            assessor.assess(&input(0.70, &empty)).priority,
            ReviewPriority::Low
        );
        // A flagged GOOD record queues LOW.
        let mut flags = BTreeSet::new();
        flags.insert("city_distance".to_string());
        assert_eq!(
            assessor.assess(&input(0.85, &flags)).priority,
            ReviewPriority::Low
        );
    }

    #[test]
    fn configured_method_penalty_applies() {
        let assessor = QualityAssessor::with_method_penalties(BTreeMap::from([(
            "api_geocode".to_string(),
            0.05,
        )]));
        let flags = BTreeSet::new();
        let mut i = input(0.92, &flags);
        i.method = "api_geocode";
        let verdict = assessor.assess(&i);
        assert!((verdict.effective_confidence.unwrap() - 0.87).abs() < 1e-9);
        assert_eq!(verdict.tier, QualityTier::Good);
    }
}
