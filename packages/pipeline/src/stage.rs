//! The stage abstraction.
//!
//! A stage supplies a stable id, its skip rules, and a `process` step; the
//! orchestrator wraps every call in the shared lifecycle (skip decision,
//! timing, validation, quality assessment, cache write). Stages vary only
//! in what `process` does — geocode, revalidate, or enrich.

use std::collections::BTreeMap;

use locate_map_cache_models::GeocodeRecord;
use locate_map_quality::SkipRules;
use locate_map_ticket_models::Ticket;
use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// Coordinates and context produced by a stage for one ticket.
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    /// Latitude (WGS84), absent on failure.
    pub latitude: Option<f64>,
    /// Longitude (WGS84), absent on failure.
    pub longitude: Option<f64>,
    /// Confidence in [0, 1].
    pub confidence: Option<f64>,
    /// Geocoding method that produced the coordinates. Stages that carry
    /// forward an earlier stage's coordinates keep its method.
    pub method: String,
    /// Sub-strategy tag.
    pub approach: Option<String>,
    /// Human-readable account of the result.
    pub reasoning: String,
    /// Failure description.
    pub error_message: Option<String>,
    /// Metadata entries to append to the record's bag.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// What a stage's `process` step decided.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// A new result to validate, assess, and cache.
    Produced(StageOutput),
    /// Nothing to contribute for this ticket; counted as skipped.
    Unchanged {
        /// Why the stage left the record alone.
        reason: String,
    },
}

/// One pipeline stage.
pub trait PipelineStage {
    /// Stable stage identifier ("proximity", "validation", ...).
    fn stage_id(&self) -> &'static str;

    /// Skip criteria evaluated against the cached record.
    fn skip_rules(&self) -> &SkipRules;

    /// Produces this stage's result for one ticket.
    ///
    /// `cached` is the ticket's current record before this stage ran.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] for per-ticket failures; the framework
    /// absorbs them into FAILED records and the batch continues.
    fn process(
        &self,
        ticket: &Ticket,
        cached: Option<&GeocodeRecord>,
    ) -> Result<StageOutcome, StageError>;
}

/// Counters accumulated by the framework for one stage over one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStatistics {
    /// Tickets that reached `process`.
    pub processed: u64,
    /// Records written with coordinates.
    pub succeeded: u64,
    /// FAILED records written.
    pub failed: u64,
    /// Tickets skipped by rules, locks, or unchanged results.
    pub skipped: u64,
    /// Writes whose tier regressed vs. the cached record.
    pub degraded: u64,
    /// Writes whose tier improved vs. the cached record.
    pub improved: u64,
    /// Total `process` wall-clock, in milliseconds.
    pub total_time_ms: f64,
}

impl StageStatistics {
    /// Mean processing time across processed tickets.
    #[must_use]
    pub fn avg_time_ms(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            {
                self.total_time_ms / self.processed as f64
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_time_handles_empty_stages() {
        let mut stats = StageStatistics::default();
        assert!(stats.avg_time_ms().abs() < f64::EPSILON);

        stats.processed = 4;
        stats.total_time_ms = 10.0;
        assert!((stats.avg_time_ms() - 2.5).abs() < f64::EPSILON);
    }
}
