//! The validation stage.
//!
//! Re-runs the rule engine and quality assessor over the ticket's current
//! record. It contributes no coordinates of its own: the cached result is
//! carried forward and the framework's no-change suppression drops the
//! write when flags, tier, and priority come out identical — so the stage
//! only produces versions when the rules (or their configuration) actually
//! changed something.

use locate_map_cache_models::GeocodeRecord;
use locate_map_quality::SkipRules;
use locate_map_ticket_models::Ticket;

use crate::error::StageError;
use crate::stage::{PipelineStage, StageOutcome, StageOutput};

/// Stage id of the validation stage.
pub const VALIDATION_STAGE_ID: &str = "validation";

/// Re-validates cached records under the current rule configuration.
pub struct ValidationStage {
    skip_rules: SkipRules,
}

impl ValidationStage {
    /// Builds the stage.
    #[must_use]
    pub const fn new(skip_rules: SkipRules) -> Self {
        Self { skip_rules }
    }
}

impl PipelineStage for ValidationStage {
    fn stage_id(&self) -> &'static str {
        VALIDATION_STAGE_ID
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
                reason: "no cached record to validate".to_string(),
            });
        };

        Ok(StageOutcome::Produced(StageOutput {
            latitude: record.latitude,
            longitude: record.longitude,
            confidence: record.confidence,
            method: record.method.clone(),
            approach: record.approach.clone(),
            reasoning: record.reasoning.clone(),
            error_message: record.error_message.clone(),
            metadata: record.metadata.clone(),
        }))
    }
}
