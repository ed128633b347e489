//! The validation rule engine.
//!
//! Rules are independent pure functions keyed by name. The engine runs
//! every enabled rule against a fresh record, collects the flags that
//! fired, and reports the maximum severity. A rule that errors internally
//! is treated as not fired and the record gains a `validator_error` flag.

use geo::Point;
use locate_map_cache_models::{GeocodeRecord, RuleSeverity};
use locate_map_corridor::{PipelineProximityAnalyzer, RouteCorridorValidator};
use locate_map_roads::geometry::distance_m;

/// Flag set on records whose validation hit an internal rule failure.
pub const VALIDATOR_ERROR_FLAG: &str = "validator_error";

/// Default distance from the city reference beyond which a geocode is
/// suspicious, in kilometers.
pub const DEFAULT_CITY_DISTANCE_KM: f64 = 50.0;

/// Default pipeline-mismatch distance threshold, in meters.
pub const DEFAULT_PIPELINE_MISMATCH_M: f64 = 500.0;

/// Shared read-only context handed to every rule.
pub struct ValidationContext<'a> {
    /// City reference point for the ticket, if known.
    pub city_reference: Option<Point<f64>>,
    /// Route corridor, when one is configured.
    pub corridor: Option<&'a RouteCorridorValidator>,
    /// Pipeline proximity analyzer, when one is configured.
    pub pipeline: Option<&'a PipelineProximityAnalyzer>,
    /// `city_distance` threshold, in kilometers.
    pub city_distance_km: f64,
    /// `pipeline_mismatch` threshold, in meters.
    pub pipeline_mismatch_m: f64,
}

impl Default for ValidationContext<'_> {
    fn default() -> Self {
        Self {
            city_reference: None,
            corridor: None,
            pipeline: None,
            city_distance_km: DEFAULT_CITY_DISTANCE_KM,
            pipeline_mismatch_m: DEFAULT_PIPELINE_MISMATCH_M,
        }
    }
}

/// A fired rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    /// Flag tag recorded on the record.
    pub flag: String,
    /// Severity of the finding.
    pub severity: RuleSeverity,
    /// Suggested follow-up action.
    pub action: String,
}

/// Error raised by a rule that could not evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleError {
    /// Description of the internal failure.
    pub message: String,
}

type RuleFn = fn(&GeocodeRecord, &ValidationContext<'_>) -> Result<Option<RuleHit>, RuleError>;

/// A named validation rule.
#[derive(Clone, Copy)]
pub struct ValidationRule {
    /// Registry name, also used in stage configuration.
    pub name: &'static str,
    /// The check itself.
    pub check: RuleFn,
}

/// Every built-in rule, in registry order. Rules are independent, so the
/// order never changes the resulting flag set.
#[must_use]
pub fn registry() -> &'static [ValidationRule] {
    &[
        ValidationRule {
            name: "low_confidence",
            check: low_confidence,
        },
        ValidationRule {
            name: "emergency_low_confidence",
            check: emergency_low_confidence,
        },
        ValidationRule {
            name: "city_distance",
            check: city_distance,
        },
        ValidationRule {
            name: "fallback_geocode",
            check: fallback_geocode,
        },
        ValidationRule {
            name: "missing_road",
            check: missing_road,
        },
        ValidationRule {
            name: "out_of_corridor",
            check: out_of_corridor,
        },
        ValidationRule {
            name: "pipeline_mismatch",
            check: pipeline_mismatch,
        },
    ]
}

/// What the engine found for one record.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// Every fired rule.
    pub hits: Vec<RuleHit>,
}

impl ValidationOutcome {
    /// Flags of every fired rule.
    #[must_use]
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.flag.as_str())
    }

    /// The maximum severity among fired rules.
    #[must_use]
    pub fn max_severity(&self) -> Option<RuleSeverity> {
        self.hits.iter().map(|h| h.severity).max()
    }
}

/// Runs a configured set of validation rules.
pub struct ValidationEngine {
    rules: Vec<ValidationRule>,
}

impl ValidationEngine {
    /// An engine running every built-in rule.
    #[must_use]
    pub fn with_all_rules() -> Self {
        Self {
            rules: registry().to_vec(),
        }
    }

    /// An engine running only the named rules. Unknown names are logged
    /// and ignored.
    #[must_use]
    pub fn with_rule_names(names: &[String]) -> Self {
        let mut rules = Vec::new();
        for name in names {
            match registry().iter().find(|r| r.name == name) {
                Some(rule) => rules.push(*rule),
                None => log::warn!("Unknown validation rule {name:?} ignored"),
            }
        }
        Self { rules }
    }

    /// An engine over explicit rules (used by tests and extensions).
    #[must_use]
    pub const fn from_rules(rules: Vec<ValidationRule>) -> Self {
        Self { rules }
    }

    /// The configured rule names.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    /// Runs every configured rule against a record.
    #[must_use]
    pub fn run(&self, record: &GeocodeRecord, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        for rule in &self.rules {
            match (rule.check)(record, ctx) {
                Ok(Some(hit)) => outcome.hits.push(hit),
                Ok(None) => {}
                Err(e) => {
                    log::warn!(
                        "Validation rule {} failed on {}: {}",
                        rule.name,
                        record.ticket_number,
                        e.message
                    );
                    outcome.hits.push(RuleHit {
                        flag: VALIDATOR_ERROR_FLAG.to_string(),
                        severity: RuleSeverity::Warning,
                        action: format!("rule {} could not evaluate", rule.name),
                    });
                }
            }
        }
        outcome
    }
}

fn record_point(record: &GeocodeRecord) -> Option<Point<f64>> {
    match (record.latitude, record.longitude) {
        (Some(lat), Some(lng)) => Some(Point::new(lng, lat)),
        _ => None,
    }
}

fn is_emergency(record: &GeocodeRecord) -> bool {
    record
        .ticket_type
        .as_deref()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case("EMERGENCY"))
}

fn low_confidence(
    record: &GeocodeRecord,
    _ctx: &ValidationContext<'_>,
) -> Result<Option<RuleHit>, RuleError> {
    Ok(record
        .confidence
        .filter(|c| *c < 0.65)
        .map(|c| RuleHit {
            flag: "low_confidence".to_string(),
            severity: RuleSeverity::Warning,
            action: format!("confidence {c:.2} below 0.65; verify coordinates"),
        }))
}

fn emergency_low_confidence(
    record: &GeocodeRecord,
    _ctx: &ValidationContext<'_>,
) -> Result<Option<RuleHit>, RuleError> {
    if !is_emergency(record) {
        return Ok(None);
    }
    Ok(record
        .confidence
        .filter(|c| *c < 0.75)
        .map(|c| RuleHit {
            flag: "emergency_low_confidence".to_string(),
            severity: RuleSeverity::Error,
            action: format!("emergency ticket at confidence {c:.2}; expedite review"),
        }))
}

fn city_distance(
    record: &GeocodeRecord,
    ctx: &ValidationContext<'_>,
) -> Result<Option<RuleHit>, RuleError> {
    let (Some(point), Some(city_ref)) = (record_point(record), ctx.city_reference) else {
        return Ok(None);
    };
    let km = distance_m(point, city_ref) / 1000.0;
    if km > ctx.city_distance_km {
        return Ok(Some(RuleHit {
            flag: "city_distance".to_string(),
            severity: RuleSeverity::Warning,
            action: format!(
                "geocode {km:.1} km from the {} reference point",
                record.city.as_deref().unwrap_or("city")
            ),
        }));
    }
    Ok(None)
}

fn fallback_geocode(
    record: &GeocodeRecord,
    _ctx: &ValidationContext<'_>,
) -> Result<Option<RuleHit>, RuleError> {
    if record.approach.as_deref() == Some("city_centroid_fallback") {
        return Ok(Some(RuleHit {
            flag: "fallback_geocode".to_string(),
            severity: RuleSeverity::Warning,
            action: "city-centroid fallback; locate the roads manually".to_string(),
        }));
    }
    Ok(None)
}

fn missing_road(
    record: &GeocodeRecord,
    _ctx: &ValidationContext<'_>,
) -> Result<Option<RuleHit>, RuleError> {
    // The geocoder's reasoning names unresolved roads with "not found".
    if record.reasoning.contains("not found") {
        return Ok(Some(RuleHit {
            flag: "missing_road".to_string(),
            severity: RuleSeverity::Info,
            action: "a named road is absent from the road layer".to_string(),
        }));
    }
    Ok(None)
}

fn out_of_corridor(
    record: &GeocodeRecord,
    ctx: &ValidationContext<'_>,
) -> Result<Option<RuleHit>, RuleError> {
    let (Some(point), Some(corridor)) = (record_point(record), ctx.corridor) else {
        return Ok(None);
    };
    let check = corridor.check(point.y(), point.x());
    if !check.within {
        return Ok(Some(RuleHit {
            flag: "out_of_corridor".to_string(),
            severity: RuleSeverity::Warning,
            action: format!(
                "{:.0} m outside the route corridor buffer",
                check.distance_m - corridor.buffer_m()
            ),
        }));
    }
    Ok(None)
}

fn pipeline_mismatch(
    record: &GeocodeRecord,
    ctx: &ValidationContext<'_>,
) -> Result<Option<RuleHit>, RuleError> {
    let (Some(point), Some(pipeline)) = (record_point(record), ctx.pipeline) else {
        return Ok(None);
    };
    let proximity = pipeline.analyze(point.y(), point.x());
    if proximity.distance_m > ctx.pipeline_mismatch_m {
        return Ok(Some(RuleHit {
            flag: "pipeline_mismatch".to_string(),
            severity: RuleSeverity::Warning,
            action: format!(
                "{:.0} m from the pipeline (threshold {:.0} m)",
                proximity.distance_m, ctx.pipeline_mismatch_m
            ),
        }));
    }
    Ok(None)
}
