//! The reprocessing decider.
//!
//! Stages consult the decider with the ticket's cached record before doing
//! any work. Rules combine with OR semantics: any matching rule skips the
//! ticket, and the decision carries a human-readable reason that surfaces
//! in stage logs.

use locate_map_cache_models::{GeocodeRecord, QualityTier};
use serde::{Deserialize, Serialize};

/// Per-stage skip criteria, part of the stage configuration shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRules {
    /// Skip tickets whose current record is locked.
    #[serde(default = "default_true")]
    pub skip_if_locked: bool,
    /// Skip tickets whose current tier is in this set.
    #[serde(default)]
    pub skip_if_quality: Vec<QualityTier>,
    /// Skip tickets whose current confidence meets this threshold.
    #[serde(default)]
    pub skip_if_confidence: Option<f64>,
    /// Skip tickets last produced by one of these methods.
    #[serde(default)]
    pub skip_if_method: Vec<String>,
    /// Skip tickets this stage already produced the current record for,
    /// unless that attempt failed.
    #[serde(default = "default_true")]
    pub skip_same_stage: bool,
}

const fn default_true() -> bool {
    true
}

impl Default for SkipRules {
    fn default() -> Self {
        Self {
            skip_if_locked: true,
            skip_if_quality: Vec::new(),
            skip_if_confidence: None,
            skip_if_method: Vec::new(),
            skip_same_stage: true,
        }
    }
}

/// The decider's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipDecision {
    /// Whether to skip the ticket.
    pub skip: bool,
    /// Why.
    pub reason: String,
}

impl SkipDecision {
    fn skip(reason: String) -> Self {
        Self { skip: true, reason }
    }

    fn process(reason: &str) -> Self {
        Self {
            skip: false,
            reason: reason.to_string(),
        }
    }
}

/// Decides whether a stage should skip a ticket, given its cached record.
#[must_use]
pub fn decide(
    cached: Option<&GeocodeRecord>,
    incoming_stage_id: &str,
    rules: &SkipRules,
) -> SkipDecision {
    let Some(record) = cached else {
        return SkipDecision::process("no prior record");
    };

    if rules.skip_if_locked && record.locked {
        let reason = record
            .lock_reason
            .as_deref()
            .map_or_else(|| "locked".to_string(), |r| format!("locked: {r}"));
        return SkipDecision::skip(reason);
    }

    if rules.skip_if_quality.contains(&record.quality_tier) {
        return SkipDecision::skip(format!(
            "cached tier {} is in the skip set",
            record.quality_tier
        ));
    }

    if let Some(threshold) = rules.skip_if_confidence
        && let Some(confidence) = record.confidence
        && confidence >= threshold
    {
        return SkipDecision::skip(format!(
            "cached confidence {confidence:.2} meets threshold {threshold:.2}"
        ));
    }

    if rules.skip_if_method.contains(&record.method) {
        return SkipDecision::skip(format!("cached method {} is in the skip set", record.method));
    }

    if rules.skip_same_stage
        && record.created_by_stage == incoming_stage_id
        && record.quality_tier != QualityTier::Failed
    {
        return SkipDecision::skip(format!(
            "stage {incoming_stage_id} already produced version {}",
            record.version
        ));
    }

    SkipDecision::process("prior record eligible for reprocessing")
}
