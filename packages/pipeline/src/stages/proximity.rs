//! The proximity geocoding stage.

use locate_map_cache_models::GeocodeRecord;
use locate_map_geocoder::ProximityGeocoder;
use locate_map_quality::SkipRules;
use locate_map_ticket_models::Ticket;

use crate::error::StageError;
use crate::stage::{PipelineStage, StageOutcome, StageOutput};

/// Stage id of the proximity geocoder.
pub const PROXIMITY_STAGE_ID: &str = "proximity";

/// Runs the proximity geocoder over every eligible ticket.
pub struct ProximityStage {
    skip_rules: SkipRules,
    geocoder: ProximityGeocoder,
}

impl ProximityStage {
    /// Builds the stage around a geocoder.
    #[must_use]
    pub const fn new(geocoder: ProximityGeocoder, skip_rules: SkipRules) -> Self {
        Self {
            skip_rules,
            geocoder,
        }
    }
}

impl PipelineStage for ProximityStage {
    fn stage_id(&self) -> &'static str {
        PROXIMITY_STAGE_ID
    }

    fn skip_rules(&self) -> &SkipRules {
        &self.skip_rules
    }

    fn process(
        &self,
        ticket: &Ticket,
        _cached: Option<&GeocodeRecord>,
    ) -> Result<StageOutcome, StageError> {
        let outcome = self.geocoder.geocode(ticket);
        Ok(StageOutcome::Produced(StageOutput {
            latitude: outcome.latitude,
            longitude: outcome.longitude,
            confidence: outcome.confidence,
            method: PROXIMITY_STAGE_ID.to_string(),
            approach: outcome.approach.map(|a| a.as_str().to_string()),
            reasoning: outcome.reasoning,
            error_message: outcome.error_message,
            metadata: outcome.metadata,
        }))
    }
}
