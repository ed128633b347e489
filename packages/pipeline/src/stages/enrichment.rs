//! The corridor / pipeline enrichment stage.
//!
//! Annotates cached records with their distance to the work route and the
//! known pipeline, and applies the pipeline-proximity confidence boost
//! when the geocoding stage did not already claim it.

use std::sync::Arc;

use locate_map_cache_models::GeocodeRecord;
use locate_map_corridor::{PipelineProximityAnalyzer, RouteCorridorValidator};
use locate_map_quality::SkipRules;
use locate_map_ticket_models::Ticket;

use crate::error::StageError;
use crate::stage::{PipelineStage, StageOutcome, StageOutput};

/// Stage id of the enrichment stage.
pub const ENRICHMENT_STAGE_ID: &str = "enrichment";

/// Metadata key marking that the pipeline boost was already applied.
const BOOST_APPLIED_KEY: &str = "pipeline_boost_applied";

/// Adds route-corridor and pipeline-proximity context to cached records.
pub struct EnrichmentStage {
    skip_rules: SkipRules,
    corridor: Option<Arc<RouteCorridorValidator>>,
    pipeline: Option<Arc<PipelineProximityAnalyzer>>,
}

impl EnrichmentStage {
    /// Builds the stage from whichever geometries are configured.
    #[must_use]
    pub const fn new(
        skip_rules: SkipRules,
        corridor: Option<Arc<RouteCorridorValidator>>,
        pipeline: Option<Arc<PipelineProximityAnalyzer>>,
    ) -> Self {
        Self {
            skip_rules,
            corridor,
            pipeline,
        }
    }
}

impl PipelineStage for EnrichmentStage {
    fn stage_id(&self) -> &'static str {
        ENRICHMENT_STAGE_ID
    }

    fn skip_rules(&self) -> &SkipRules {
        &self.skip_rules
    }

    fn process(
        &self,
        _ticket: &Ticket,
        cached: Option<&GeocodeRecord>,
    ) -> Result<StageOutcome, StageError> {
        let Some(record) = cached else {
            return Ok(StageOutcome::Unchanged {
                reason: "no cached record to enrich".to_string(),
            });
        };
        let (Some(lat), Some(lng)) = (record.latitude, record.longitude) else {
            return Ok(StageOutcome::Unchanged {
                reason: "no coordinates to enrich".to_string(),
            });
        };

        let mut output = StageOutput {
            latitude: record.latitude,
            longitude: record.longitude,
            confidence: record.confidence,
            method: record.method.clone(),
            approach: record.approach.clone(),
            reasoning: record.reasoning.clone(),
            error_message: record.error_message.clone(),
            metadata: record.metadata.clone(),
        };

        if let Some(corridor) = &self.corridor {
            let check = corridor.check(lat, lng);
            output.metadata.insert(
                "corridor_distance_m".to_string(),
                serde_json::json!(check.distance_m),
            );
            output
                .metadata
                .insert("corridor_within".to_string(), serde_json::json!(check.within));
        }

        if let Some(pipeline) = &self.pipeline {
            let proximity = pipeline.analyze(lat, lng);
            output.metadata.insert(
                "pipeline_distance_m".to_string(),
                serde_json::json!(proximity.distance_m),
            );
            if proximity.within_boost_zone && !record.metadata.contains_key(BOOST_APPLIED_KEY) {
                let boosted = output
                    .confidence
                    .map(|c| (c + proximity.confidence_boost).clamp(0.0, 1.0));
                output.confidence = boosted;
                output
                    .metadata
                    .insert(BOOST_APPLIED_KEY.to_string(), serde_json::json!(true));
                output.reasoning = format!(
                    "{}; confidence boosted {:.0} m from the pipeline",
                    output.reasoning, proximity.distance_m
                );
            }
        }

        Ok(StageOutcome::Produced(output))
    }
}
