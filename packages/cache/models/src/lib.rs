#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Versioned geocode record types and quality taxonomy.
//!
//! These types represent the shapes of data as stored in and retrieved from
//! the geocode cache. Records are immutable after write; supersession flips
//! the `is_current` flag of the prior version and inserts a new row, so a
//! ticket's history is an append-only chain.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Stage identifier reserved for human review actions.
///
/// Only writes carrying this stage id may supersede a locked record.
pub const HUMAN_REVIEW_STAGE: &str = "human_review";

/// Coarse quality label derived from effective confidence.
///
/// Ordered from worst to best so that tier comparisons read naturally:
/// `QualityTier::Good > QualityTier::Acceptable`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityTier {
    /// No coordinates, or effective confidence below 0.40.
    Failed = 1,
    /// Effective confidence in [0.40, 0.65).
    ReviewNeeded = 2,
    /// Effective confidence in [0.65, 0.80).
    Acceptable = 3,
    /// Effective confidence in [0.80, 0.90).
    Good = 4,
    /// Effective confidence at or above 0.90.
    Excellent = 5,
}

/// Human-review queue priority, orthogonal to [`QualityTier`].
///
/// Ordered ascending so the review queue can sort descending on it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewPriority {
    /// No review needed.
    None = 0,
    /// Worth a glance when the queue is otherwise empty.
    Low = 1,
    /// Should be reviewed this cycle.
    Medium = 2,
    /// Review before crews are dispatched.
    High = 3,
    /// Blocks downstream use until a human signs off.
    Critical = 4,
}

/// Severity attached to a fired validation rule.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleSeverity {
    /// Informational only.
    Info = 1,
    /// Suspicious but usable.
    Warning = 2,
    /// Almost certainly wrong.
    Error = 3,
}

/// One version of a ticket's geocode, as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeRecord {
    /// External ticket identifier.
    pub ticket_number: String,
    /// Monotonic version per ticket, starting at 1.
    pub version: u32,
    /// Stable fingerprint over the normalized `(street, intersection,
    /// city, county)` inputs.
    pub geocode_key: String,

    /// Street as it appeared on the ticket.
    pub street: Option<String>,
    /// Cross street as it appeared on the ticket.
    pub intersection: Option<String>,
    /// City as it appeared on the ticket.
    pub city: Option<String>,
    /// County as it appeared on the ticket.
    pub county: Option<String>,
    /// Ticket type (e.g., "Normal", "Emergency").
    pub ticket_type: Option<String>,
    /// Declared work duration.
    pub duration: Option<String>,
    /// Description of the planned work.
    pub work_type: Option<String>,
    /// Excavating company.
    pub excavator: Option<String>,

    /// Latitude (WGS84). `None` iff the geocode failed.
    pub latitude: Option<f64>,
    /// Longitude (WGS84). `None` iff the geocode failed.
    pub longitude: Option<f64>,
    /// Name of the producing stage.
    pub method: String,
    /// Sub-strategy tag (e.g., "corridor_midpoint").
    pub approach: Option<String>,
    /// Geocoder confidence in [0, 1], before assessor penalties.
    pub confidence: Option<f64>,
    /// Human-readable account of how the result was produced.
    pub reasoning: String,
    /// Error message for failed results.
    pub error_message: Option<String>,

    /// Assigned quality tier.
    pub quality_tier: QualityTier,
    /// Assigned review priority.
    pub review_priority: ReviewPriority,
    /// Flags raised by the validation engine.
    pub validation_flags: BTreeSet<String>,

    /// Version superseded by this record (`None` for version 1).
    pub supersedes: Option<u32>,
    /// Whether this is the ticket's current record. Exactly one version
    /// per ticket is current.
    pub is_current: bool,
    /// When this version was written.
    pub created_at: DateTime<Utc>,
    /// Stage that produced this version.
    pub created_by_stage: String,

    /// Whether a human has pinned this record against automated
    /// supersession.
    pub locked: bool,
    /// Why the record was locked.
    pub lock_reason: Option<String>,
    /// When the record was locked.
    pub locked_at: Option<DateTime<Utc>>,
    /// Who locked the record.
    pub locked_by: Option<String>,

    /// Extensible metadata bag. Stages append keys, never overwrite.
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Wall-clock processing time for the producing stage.
    pub processing_time_ms: f64,
}

impl GeocodeRecord {
    /// Whether both coordinates are present.
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Whether the coordinates, if present, are inside WGS84 bounds.
    #[must_use]
    pub fn coordinates_in_bounds(&self) -> bool {
        let lat_ok = self.latitude.is_none_or(|lat| (-90.0..=90.0).contains(&lat));
        let lng_ok = self
            .longitude
            .is_none_or(|lng| (-180.0..=180.0).contains(&lng));
        lat_ok && lng_ok
    }

    /// Whether the confidence, if present, is inside [0, 1].
    #[must_use]
    pub fn confidence_in_bounds(&self) -> bool {
        self.confidence.is_none_or(|c| (0.0..=1.0).contains(&c))
    }

    /// Whether any validation flag is present.
    #[must_use]
    pub fn has_flags(&self) -> bool {
        !self.validation_flags.is_empty()
    }
}

/// Filter for [`GeocodeRecord`] queries against the cache.
///
/// Empty collections and `None` fields mean "don't filter on this". All
/// populated criteria must match (AND semantics across criteria, set
/// membership within one).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordQuery {
    /// Match any of these quality tiers.
    pub tiers: Vec<QualityTier>,
    /// Match any of these review priorities.
    pub priorities: Vec<ReviewPriority>,
    /// Match the lock flag exactly.
    pub locked: Option<bool>,
    /// Match any of these producing methods.
    pub methods: Vec<String>,
    /// Match records with confidence at or above this value.
    pub min_confidence: Option<f64>,
    /// Match this fingerprint exactly.
    pub geocode_key: Option<String>,
}

/// Aggregate counts over the cache's current records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatistics {
    /// Number of records across all versions.
    pub total_records: u64,
    /// Current records per quality tier.
    pub tier_counts: BTreeMap<QualityTier, u64>,
    /// Current records per review priority.
    pub priority_counts: BTreeMap<ReviewPriority, u64>,
    /// Locked current records.
    pub locked_count: u64,
    /// Current records per producing method.
    pub method_counts: BTreeMap<String, u64>,
}
