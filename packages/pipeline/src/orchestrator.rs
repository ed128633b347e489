//! The pipeline orchestrator.
//!
//! Owns the ordered stages and the cache, and runs batches stage-major:
//! every ticket passes through stage `k` before stage `k+1` sees any of
//! its writes. Per-ticket failures become FAILED records; only storage and
//! configuration problems propagate, and the review queue is emitted even
//! when a batch aborts partway.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use locate_map_cache::key::geocode_key;
use locate_map_cache::{CacheError, GeocodeCache};
use locate_map_cache_models::{GeocodeRecord, QualityTier, ReviewPriority};
use locate_map_corridor::{GeometryIndex, PipelineProximityAnalyzer, RouteCorridorValidator};
use locate_map_geocoder::ProximityGeocoder;
use locate_map_quality::assess::AssessmentInput;
use locate_map_quality::rules::ValidationContext;
use locate_map_quality::{QualityAssessor, ValidationEngine, skip};
use locate_map_roads::{CityIndex, RoadNetwork};
use locate_map_ticket_models::Ticket;
use serde::{Deserialize, Serialize};

use crate::config::{self, PipelineConfig};
use crate::error::{PipelineError, StageError};
use crate::export;
use crate::stage::{PipelineStage, StageOutcome, StageOutput, StageStatistics};
use crate::stages::proximity::PROXIMITY_STAGE_ID;
use crate::stages::{EnrichmentStage, ProximityStage, ValidationStage};

/// Read-only resources shared with every stage for the batch lifetime.
pub struct SharedResources {
    /// City reference map.
    pub cities: Arc<CityIndex>,
    /// Route corridor, when configured.
    pub corridor: Option<Arc<RouteCorridorValidator>>,
    /// Pipeline proximity analyzer, when configured.
    pub pipeline: Option<Arc<PipelineProximityAnalyzer>>,
    /// `city_distance` threshold for non-proximity stages, in kilometers.
    pub city_distance_km: f64,
    /// `city_distance` threshold for proximity-produced records, in
    /// kilometers.
    pub proximity_max_distance_km: f64,
    /// `pipeline_mismatch` threshold, in meters.
    pub pipeline_mismatch_m: f64,
}

impl Default for SharedResources {
    fn default() -> Self {
        Self {
            cities: Arc::new(CityIndex::default()),
            corridor: None,
            pipeline: None,
            city_distance_km: 50.0,
            proximity_max_distance_km: 50.0,
            pipeline_mismatch_m: 500.0,
        }
    }
}

/// Per-stage block of the batch summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSummary {
    /// Stage id.
    pub stage_name: String,
    /// Tickets that reached `process`.
    pub processed: u64,
    /// Records written with coordinates.
    pub succeeded: u64,
    /// FAILED records written.
    pub failed: u64,
    /// Tickets skipped.
    pub skipped: u64,
    /// Quality regressions written.
    pub degraded: u64,
    /// Quality improvements written.
    pub improved: u64,
    /// Mean `process` time, in milliseconds.
    pub avg_time_ms: f64,
}

/// End-of-batch summary object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Timestamp-derived batch identifier.
    pub pipeline_id: String,
    /// Tickets handed to the batch, including rejected ones.
    pub total_tickets: usize,
    /// Tickets rejected for a missing ticket number.
    pub rejected: u64,
    /// Successful writes across all stages.
    pub total_succeeded: u64,
    /// FAILED writes across all stages.
    pub total_failed: u64,
    /// Skips across all stages.
    pub total_skipped: u64,
    /// Batch wall-clock, in milliseconds.
    pub total_time_ms: f64,
    /// Per-stage statistics, in execution order.
    pub stages: Vec<StageSummary>,
    /// Current records per tier at batch end.
    pub tier_counts: BTreeMap<QualityTier, u64>,
    /// Current records per priority at batch end.
    pub priority_counts: BTreeMap<ReviewPriority, u64>,
    /// Error counts by category.
    pub error_counts: BTreeMap<String, u64>,
}

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct PipelineRun {
    /// The summary object (also written to `summary.json`).
    pub summary: PipelineSummary,
    /// Current record per processed ticket.
    pub results: Vec<GeocodeRecord>,
    /// Records needing review, priority-descending then confidence-
    /// ascending.
    pub review_queue: Vec<GeocodeRecord>,
}

/// The batch pipeline: ordered stages over a shared cache.
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
    cache: GeocodeCache,
    engine: ValidationEngine,
    assessor: QualityAssessor,
    resources: SharedResources,
    fail_fast: bool,
    save_intermediate: bool,
    output_dir: PathBuf,
}

impl Pipeline {
    /// Assembles a pipeline from parts. Hosts normally use
    /// [`Pipeline::from_config`].
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stages: Vec<Box<dyn PipelineStage>>,
        cache: GeocodeCache,
        engine: ValidationEngine,
        assessor: QualityAssessor,
        resources: SharedResources,
        fail_fast: bool,
        save_intermediate: bool,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            stages,
            cache,
            engine,
            assessor,
            resources,
            fail_fast,
            save_intermediate,
            output_dir,
        }
    }

    /// Builds the pipeline from configuration, loading every shared
    /// resource. Misconfiguration is caught here, before any ticket is
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] when an enabled stage
    /// lacks its inputs, and loading errors for the cache and geometry
    /// files.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let cache = GeocodeCache::open(&config.cache.db_path)?;

        let cities = match &config.stages.proximity.city_reference_path {
            Some(path) => Arc::new(CityIndex::load(path)?),
            None => Arc::new(CityIndex::default()),
        };

        let corridor = config
            .stages
            .enrichment
            .route
            .as_ref()
            .map(|route| -> Result<_, PipelineError> {
                config::check_geometry_path(&route.kmz_path, "route")?;
                Ok(Arc::new(RouteCorridorValidator::new(
                    GeometryIndex::load(&route.kmz_path)?,
                    route.buffer_m,
                )))
            })
            .transpose()?;

        let pipeline_proximity = config
            .stages
            .enrichment
            .pipeline
            .as_ref()
            .map(|pipeline| -> Result<_, PipelineError> {
                config::check_geometry_path(&pipeline.geometry_path, "pipeline")?;
                Ok(Arc::new(PipelineProximityAnalyzer::new(
                    GeometryIndex::load(&pipeline.geometry_path)?,
                    pipeline.boost_radius_m,
                )))
            })
            .transpose()?;

        let mut stages: Vec<Box<dyn PipelineStage>> = Vec::new();

        if config.stages.proximity.enabled {
            let path = config
                .stages
                .proximity
                .road_network_path
                .as_ref()
                .ok_or_else(|| {
                    PipelineError::configuration(
                        "proximity stage enabled without road_network_path",
                    )
                })?;
            let network = Arc::new(RoadNetwork::load(path)?);
            let mut geocoder = ProximityGeocoder::new(network, Arc::clone(&cities));
            if let Some(pipeline) = &pipeline_proximity {
                geocoder = geocoder.with_pipeline(Arc::clone(pipeline));
            }
            stages.push(Box::new(ProximityStage::new(
                geocoder,
                config.stages.proximity.skip_rules.clone(),
            )));
        }

        if config.stages.validation.enabled {
            stages.push(Box::new(ValidationStage::new(
                config.stages.validation.skip_rules.clone(),
            )));
        }

        if config.stages.enrichment.enabled {
            if corridor.is_none() && pipeline_proximity.is_none() {
                return Err(PipelineError::configuration(
                    "enrichment stage enabled without route or pipeline geometry",
                ));
            }
            stages.push(Box::new(EnrichmentStage::new(
                config.stages.enrichment.skip_rules.clone(),
                corridor.clone(),
                pipeline_proximity.clone(),
            )));
        }

        let engine = match &config.stages.validation.validation_rules {
            Some(names) => ValidationEngine::with_rule_names(names),
            None => ValidationEngine::with_all_rules(),
        };

        Ok(Self::new(
            stages,
            cache,
            engine,
            QualityAssessor::new(),
            SharedResources {
                cities,
                corridor,
                pipeline: pipeline_proximity,
                city_distance_km: config.stages.validation.city_distance_km,
                proximity_max_distance_km: config.stages.proximity.max_distance_km,
                pipeline_mismatch_m: config.stages.validation.pipeline_mismatch_m,
            },
            config.fail_fast,
            config.save_intermediate,
            config.output_dir.clone(),
        ))
    }

    /// Read access to the cache (statistics, ad-hoc queries).
    #[must_use]
    pub const fn cache(&self) -> &GeocodeCache {
        &self.cache
    }

    /// Mutable access to the cache (lock/unlock, human-review writes).
    pub const fn cache_mut(&mut self) -> &mut GeocodeCache {
        &mut self.cache
    }

    /// Runs a batch through every stage and exports results, review
    /// queue, and summary under the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for configuration/storage problems (under
    /// `fail_fast`) and for export failures. Per-ticket failures never
    /// error — they surface as FAILED records.
    pub fn run(&mut self, tickets: &[Ticket]) -> Result<PipelineRun, PipelineError> {
        let batch_start = Instant::now();
        let pipeline_id = format!("pipeline_{}", Utc::now().format("%Y%m%d_%H%M%S"));
        log::info!(
            "Starting {pipeline_id}: {} tickets through {} stages",
            tickets.len(),
            self.stages.len()
        );

        let mut error_counts: BTreeMap<String, u64> = BTreeMap::new();
        let mut rejected = 0u64;
        let mut valid: Vec<&Ticket> = Vec::new();
        for ticket in tickets {
            match ticket.validate() {
                Ok(()) => valid.push(ticket),
                Err(e) => {
                    rejected += 1;
                    bump(&mut error_counts, "input_error");
                    log::warn!("Rejecting ticket: {e}");
                }
            }
        }

        let mut stage_summaries = Vec::new();
        for stage in &self.stages {
            log::info!("Stage {} starting", stage.stage_id());
            let stats = match run_stage(
                stage.as_ref(),
                &valid,
                &mut self.cache,
                &self.engine,
                &self.assessor,
                &self.resources,
                self.fail_fast,
                &mut error_counts,
            ) {
                Ok(stats) => stats,
                Err(e) => {
                    log::error!("Stage {} aborted the batch: {e}", stage.stage_id());
                    emit_review_queue_best_effort(&self.cache, &valid, &self.output_dir);
                    return Err(e);
                }
            };
            log::info!(
                "Stage {} done: {} processed, {} succeeded, {} failed, {} skipped",
                stage.stage_id(),
                stats.processed,
                stats.succeeded,
                stats.failed,
                stats.skipped
            );

            if self.save_intermediate {
                let snapshot = current_records(&self.cache, &valid)?;
                export::write_records_csv(
                    &self
                        .output_dir
                        .join(format!("results_{}.csv", stage.stage_id())),
                    &snapshot,
                )?;
            }

            stage_summaries.push(StageSummary {
                stage_name: stage.stage_id().to_string(),
                processed: stats.processed,
                succeeded: stats.succeeded,
                failed: stats.failed,
                skipped: stats.skipped,
                degraded: stats.degraded,
                improved: stats.improved,
                avg_time_ms: stats.avg_time_ms(),
            });
        }

        let results = current_records(&self.cache, &valid)?;
        let review_queue = review_queue_of(&results);

        let mut tier_counts: BTreeMap<QualityTier, u64> = BTreeMap::new();
        let mut priority_counts: BTreeMap<ReviewPriority, u64> = BTreeMap::new();
        for record in &results {
            *tier_counts.entry(record.quality_tier).or_default() += 1;
            *priority_counts.entry(record.review_priority).or_default() += 1;
        }

        let summary = PipelineSummary {
            pipeline_id,
            total_tickets: tickets.len(),
            rejected,
            total_succeeded: stage_summaries.iter().map(|s| s.succeeded).sum(),
            total_failed: stage_summaries.iter().map(|s| s.failed).sum(),
            total_skipped: stage_summaries.iter().map(|s| s.skipped).sum(),
            total_time_ms: batch_start.elapsed().as_secs_f64() * 1000.0,
            stages: stage_summaries,
            tier_counts,
            priority_counts,
            error_counts,
        };

        export::write_records_csv(&self.output_dir.join("results.csv"), &results)?;
        export::write_records_csv(&self.output_dir.join("review_queue.csv"), &review_queue)?;
        export::write_json(&self.output_dir.join("summary.json"), &summary)?;
        log::info!(
            "{} finished: {} current records, {} queued for review",
            summary.pipeline_id,
            results.len(),
            review_queue.len()
        );

        Ok(PipelineRun {
            summary,
            results,
            review_queue,
        })
    }
}

/// The framework lifecycle for one stage over the whole batch.
#[allow(clippy::too_many_arguments, clippy::too_many_lines)]
fn run_stage(
    stage: &dyn PipelineStage,
    tickets: &[&Ticket],
    cache: &mut GeocodeCache,
    engine: &ValidationEngine,
    assessor: &QualityAssessor,
    resources: &SharedResources,
    fail_fast: bool,
    error_counts: &mut BTreeMap<String, u64>,
) -> Result<StageStatistics, PipelineError> {
    let mut stats = StageStatistics::default();

    for ticket in tickets {
        let cached = match cache.current(&ticket.ticket_number) {
            Ok(cached) => cached,
            Err(e) => {
                bump(error_counts, "storage_error");
                if fail_fast {
                    return Err(e.into());
                }
                log::error!("{}: cache read failed: {e}", ticket.ticket_number);
                stats.failed += 1;
                continue;
            }
        };

        let decision = skip::decide(cached.as_ref(), stage.stage_id(), stage.skip_rules());
        if decision.skip {
            stats.skipped += 1;
            if cached.as_ref().is_some_and(|c| c.locked) {
                bump(error_counts, "locked");
            }
            log::debug!(
                "{}: skipping {}: {}",
                stage.stage_id(),
                ticket.ticket_number,
                decision.reason
            );
            continue;
        }

        let started = Instant::now();
        let processed = stage.process(ticket, cached.as_ref());
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let output = match processed {
            Ok(StageOutcome::Produced(output)) => output,
            Ok(StageOutcome::Unchanged { reason }) => {
                stats.skipped += 1;
                log::debug!(
                    "{}: nothing for {}: {reason}",
                    stage.stage_id(),
                    ticket.ticket_number
                );
                continue;
            }
            Err(e) => {
                bump(error_counts, "stage_error");
                log::warn!(
                    "{}: processing {} failed: {e}",
                    stage.stage_id(),
                    ticket.ticket_number
                );
                failed_output(stage.stage_id(), &e)
            }
        };
        stats.processed += 1;
        stats.total_time_ms += elapsed_ms;

        let mut record = build_record(ticket, output, elapsed_ms);

        let ctx = ValidationContext {
            city_reference: resources
                .cities
                .reference_point(ticket.city_text(), ticket.county_text()),
            corridor: resources.corridor.as_deref(),
            pipeline: resources.pipeline.as_deref(),
            city_distance_km: if stage.stage_id() == PROXIMITY_STAGE_ID {
                resources.proximity_max_distance_km
            } else {
                resources.city_distance_km
            },
            pipeline_mismatch_m: resources.pipeline_mismatch_m,
        };
        let validation = engine.run(&record, &ctx);
        let mut actions = Vec::new();
        for hit in &validation.hits {
            record.validation_flags.insert(hit.flag.clone());
            actions.push(format!("{}: {}", hit.flag, hit.action));
        }
        if let Some(severity) = validation.max_severity() {
            record
                .metadata
                .entry("validation_severity".to_string())
                .or_insert_with(|| serde_json::json!(severity.to_string()));
        }
        if !actions.is_empty() {
            record
                .metadata
                .entry("validation_actions".to_string())
                .or_insert_with(|| serde_json::json!(actions));
        }

        let assessment = assessor.assess(&AssessmentInput {
            confidence: record.confidence,
            has_coordinates: record.has_coordinates(),
            method: &record.method,
            approach: record.approach.as_deref(),
            is_emergency: ticket.is_emergency(),
            flags: &record.validation_flags,
        });
        record.quality_tier = assessment.tier;
        record.review_priority = assessment.priority;
        if let (Some(effective), Some(confidence)) =
            (assessment.effective_confidence, record.confidence)
            && (effective - confidence).abs() > f64::EPSILON
        {
            record
                .metadata
                .entry("effective_confidence".to_string())
                .or_insert_with(|| serde_json::json!(effective));
        }

        if let Some(prev) = cached.as_ref()
            && same_result(&record, prev)
        {
            stats.skipped += 1;
            log::debug!(
                "{}: {} unchanged at version {}",
                stage.stage_id(),
                ticket.ticket_number,
                prev.version
            );
            continue;
        }

        let failed = record.quality_tier == QualityTier::Failed;
        if failed && record.error_message.is_some() {
            bump(error_counts, "strategy_exhausted");
        }

        // Tier movement is only counted once the write actually lands; a
        // locked or failed put writes nothing.
        let prev_tier = cached.as_ref().map(|c| c.quality_tier);
        match cache.put(record, stage.stage_id()) {
            Ok(stored) => {
                if let Some(prev_tier) = prev_tier {
                    if stored.quality_tier < prev_tier {
                        stats.degraded += 1;
                        log::warn!(
                            "{}: {} degraded {} -> {}",
                            stage.stage_id(),
                            ticket.ticket_number,
                            prev_tier,
                            stored.quality_tier
                        );
                    } else if stored.quality_tier > prev_tier {
                        stats.improved += 1;
                    }
                }
                if failed {
                    stats.failed += 1;
                } else {
                    stats.succeeded += 1;
                }
            }
            Err(CacheError::Locked { ticket_number }) => {
                stats.skipped += 1;
                bump(error_counts, "locked");
                log::debug!("{}: {} is locked", stage.stage_id(), ticket_number);
            }
            Err(e) => {
                bump(error_counts, "storage_error");
                if fail_fast {
                    return Err(e.into());
                }
                log::error!(
                    "{}: caching {} failed: {e}",
                    stage.stage_id(),
                    ticket.ticket_number
                );
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}

fn build_record(ticket: &Ticket, output: StageOutput, elapsed_ms: f64) -> GeocodeRecord {
    GeocodeRecord {
        ticket_number: ticket.ticket_number.clone(),
        version: 0,
        geocode_key: geocode_key(
            ticket.street_text(),
            ticket.intersection_text(),
            ticket.city_text(),
            ticket.county_text(),
        ),
        street: ticket.street.clone(),
        intersection: ticket.intersection.clone(),
        city: ticket.city.clone(),
        county: ticket.county.clone(),
        ticket_type: ticket.ticket_type.clone(),
        duration: ticket.duration.clone(),
        work_type: ticket.work_type.clone(),
        excavator: ticket.excavator.clone(),
        latitude: output.latitude,
        longitude: output.longitude,
        method: output.method,
        approach: output.approach,
        confidence: output.confidence,
        reasoning: output.reasoning,
        error_message: output.error_message,
        quality_tier: QualityTier::Failed,
        review_priority: ReviewPriority::None,
        validation_flags: std::collections::BTreeSet::new(),
        supersedes: None,
        is_current: false,
        created_at: Utc::now(),
        created_by_stage: String::new(),
        locked: false,
        lock_reason: None,
        locked_at: None,
        locked_by: None,
        metadata: output.metadata,
        processing_time_ms: elapsed_ms,
    }
}

fn failed_output(stage_id: &str, error: &StageError) -> StageOutput {
    StageOutput {
        method: stage_id.to_string(),
        reasoning: "stage processing error".to_string(),
        error_message: Some(error.message.clone()),
        ..StageOutput::default()
    }
}

/// Whether a candidate write carries nothing new over the cached record.
/// Coordinates and confidence are bit-identical copies on the carry-
/// forward paths, so exact comparison is the correct test.
#[allow(clippy::float_cmp)]
fn same_result(new: &GeocodeRecord, prev: &GeocodeRecord) -> bool {
    new.latitude == prev.latitude
        && new.longitude == prev.longitude
        && new.confidence == prev.confidence
        && new.method == prev.method
        && new.approach == prev.approach
        && new.validation_flags == prev.validation_flags
        && new.quality_tier == prev.quality_tier
        && new.review_priority == prev.review_priority
        && new.metadata == prev.metadata
}

fn bump(error_counts: &mut BTreeMap<String, u64>, category: &str) {
    *error_counts.entry(category.to_string()).or_default() += 1;
}

fn current_records(
    cache: &GeocodeCache,
    tickets: &[&Ticket],
) -> Result<Vec<GeocodeRecord>, PipelineError> {
    let mut records = Vec::new();
    for ticket in tickets {
        if let Some(record) = cache.current(&ticket.ticket_number)? {
            records.push(record);
        }
    }
    Ok(records)
}

/// Filters and orders the review queue: priority descending, then
/// confidence ascending with coordinate-less records first.
fn review_queue_of(results: &[GeocodeRecord]) -> Vec<GeocodeRecord> {
    let mut queue: Vec<GeocodeRecord> = results
        .iter()
        .filter(|r| r.review_priority != ReviewPriority::None)
        .cloned()
        .collect();
    queue.sort_by(|a, b| {
        b.review_priority
            .cmp(&a.review_priority)
            .then_with(|| sort_confidence(a).total_cmp(&sort_confidence(b)))
    });
    queue
}

fn sort_confidence(record: &GeocodeRecord) -> f64 {
    record.confidence.unwrap_or(-1.0)
}

fn emit_review_queue_best_effort(cache: &GeocodeCache, tickets: &[&Ticket], output_dir: &Path) {
    match current_records(cache, tickets) {
        Ok(results) => {
            let queue = review_queue_of(&results);
            if let Err(e) = export::write_records_csv(&output_dir.join("review_queue.csv"), &queue)
            {
                log::warn!("Could not emit review queue after abort: {e}");
            }
        }
        Err(e) => log::warn!("Could not read records for review queue after abort: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use geo::LineString;
    use locate_map_cache_models::HUMAN_REVIEW_STAGE;
    use locate_map_quality::SkipRules;
    use locate_map_roads::cities::CityEntry;

    use super::*;

    const CITY_LAT: f64 = 32.3187;
    const CITY_LNG: f64 = -102.5457;
    const DEG_LAT_M: f64 = 111_194.93;

    fn county_network() -> Arc<RoadNetwork> {
        let cr_offset = 600.0 / DEG_LAT_M;
        Arc::new(RoadNetwork::from_named_lines(vec![
            (
                "US 385".to_string(),
                LineString::from(vec![(-102.54, 32.25), (-102.54, 32.40)]),
            ),
            (
                "FM 1788".to_string(),
                LineString::from(vec![(-102.60, 32.31), (-102.50, 32.31)]),
            ),
            (
                "CR 201".to_string(),
                LineString::from(vec![(-102.60, 32.20), (-102.50, 32.20)]),
            ),
            (
                "CR 203".to_string(),
                LineString::from(vec![
                    (-102.60, 32.20 + cr_offset),
                    (-102.50, 32.20 + cr_offset),
                ]),
            ),
        ]))
    }

    fn city_index() -> Arc<CityIndex> {
        Arc::new(CityIndex::from_entries(&[CityEntry {
            city: "Andrews".to_string(),
            county: "Andrews".to_string(),
            latitude: CITY_LAT,
            longitude: CITY_LNG,
        }]))
    }

    fn test_pipeline(name: &str, proximity_rules: SkipRules) -> Pipeline {
        let cities = city_index();
        let geocoder = ProximityGeocoder::new(county_network(), Arc::clone(&cities));
        let stages: Vec<Box<dyn PipelineStage>> = vec![
            Box::new(ProximityStage::new(geocoder, proximity_rules)),
            Box::new(ValidationStage::new(SkipRules::default())),
        ];
        let output_dir = std::env::temp_dir().join(format!("locate_map_orchestrator_{name}"));
        Pipeline::new(
            stages,
            GeocodeCache::open_in_memory().unwrap(),
            ValidationEngine::with_all_rules(),
            QualityAssessor::new(),
            SharedResources {
                cities,
                ..SharedResources::default()
            },
            false,
            false,
            output_dir,
        )
    }

    fn ticket(number: &str, street: &str, intersection: &str) -> Ticket {
        Ticket {
            ticket_number: number.to_string(),
            street: Some(street.to_string()),
            intersection: Some(intersection.to_string()),
            city: Some("Andrews".to_string()),
            county: Some("Andrews".to_string()),
            ticket_type: Some("Normal".to_string()),
            ..Ticket::default()
        }
    }

    #[test]
    fn clean_intersection_produces_a_clean_good_record() {
        let mut pipeline = test_pipeline("clean", SkipRules::default());
        let run = pipeline.run(&[ticket("T1", "US 385", "FM 1788")]).unwrap();

        assert_eq!(run.results.len(), 1);
        let record = &run.results[0];
        assert_eq!(record.version, 1);
        assert!(record.is_current);
        assert_eq!(record.approach.as_deref(), Some("corridor_midpoint"));
        assert!((record.latitude.unwrap() - 32.31).abs() < 1e-9);
        assert!((record.longitude.unwrap() - -102.54).abs() < 1e-9);
        assert!((record.confidence.unwrap() - 0.85).abs() < 1e-9);
        assert_eq!(record.quality_tier, QualityTier::Good);
        assert_eq!(record.review_priority, ReviewPriority::None);
        assert!(record.validation_flags.is_empty());
        assert!(run.review_queue.is_empty());
    }

    #[test]
    fn parallel_roads_land_in_the_review_queue() {
        let mut pipeline = test_pipeline("parallel", SkipRules::default());
        let run = pipeline.run(&[ticket("T2", "CR 201", "CR 203")]).unwrap();

        let record = &run.results[0];
        assert_eq!(record.approach.as_deref(), Some("closest_point"));
        assert!((record.confidence.unwrap() - 0.64).abs() < 1e-3);
        assert_eq!(record.quality_tier, QualityTier::ReviewNeeded);
        assert_eq!(record.review_priority, ReviewPriority::Medium);
        assert!(record.validation_flags.contains("low_confidence"));
        assert_eq!(run.review_queue.len(), 1);
    }

    #[test]
    fn emergency_fallback_fails_and_goes_critical() {
        let mut pipeline = test_pipeline("emergency", SkipRules::default());
        let mut t = ticket("T4", "FRYING PAN RANCH RD", "P15");
        t.ticket_type = Some("Emergency".to_string());
        let run = pipeline.run(&[t]).unwrap();

        let record = &run.results[0];
        assert_eq!(record.approach.as_deref(), Some("city_centroid_fallback"));
        // 0.35 base + 0.05 emergency bonus, stored before the assessor's
        // fallback penalty.
        assert!((record.confidence.unwrap() - 0.40).abs() < 1e-9);
        assert_eq!(record.quality_tier, QualityTier::Failed);
        assert_eq!(record.review_priority, ReviewPriority::Critical);
        assert!(record.validation_flags.contains("fallback_geocode"));
        assert!(record.validation_flags.contains("emergency_low_confidence"));
        assert!(record.validation_flags.contains("missing_road"));
        let effective = record.metadata.get("effective_confidence").unwrap();
        assert!((effective.as_f64().unwrap() - 0.30).abs() < 1e-9);
    }

    #[test]
    fn quality_skip_rules_prevent_reprocessing() {
        let rules = SkipRules {
            skip_if_quality: vec![QualityTier::Excellent, QualityTier::Good],
            ..SkipRules::default()
        };
        let mut pipeline = test_pipeline("skip_quality", rules);
        let batch = [ticket("T5", "US 385", "FM 1788")];

        let first = pipeline.run(&batch).unwrap();
        assert_eq!(first.summary.stages[0].processed, 1);
        assert_eq!(first.results[0].version, 1);

        let second = pipeline.run(&batch).unwrap();
        assert_eq!(second.summary.stages[0].processed, 0);
        assert_eq!(second.summary.stages[0].skipped, 1);
        assert_eq!(second.results[0].version, 1);
    }

    #[test]
    fn second_run_with_default_rules_is_idempotent() {
        let mut pipeline = test_pipeline("idempotent", SkipRules::default());
        let batch = [
            ticket("T1", "US 385", "FM 1788"),
            ticket("T2", "CR 201", "CR 203"),
        ];

        let first = pipeline.run(&batch).unwrap();
        let second = pipeline.run(&batch).unwrap();

        // Same-stage skip rules stop the proximity stage outright.
        assert_eq!(second.summary.stages[0].processed, 0);
        for (a, b) in first.results.iter().zip(second.results.iter()) {
            assert_eq!(a.version, b.version);
            assert_eq!(a.quality_tier, b.quality_tier);
            assert_eq!(a.validation_flags, b.validation_flags);
        }
    }

    #[test]
    fn locked_records_survive_reruns_unchanged() {
        let mut pipeline = test_pipeline("locked", SkipRules::default());
        let batch = [ticket("T6", "US 385", "FM 1788")];
        pipeline.run(&batch).unwrap();

        pipeline
            .cache_mut()
            .lock("T6", "Field verified", "inspector")
            .unwrap();
        let before = pipeline.cache().current("T6").unwrap().unwrap();

        let run = pipeline.run(&batch).unwrap();
        let after = &run.results[0];
        assert_eq!(after.version, before.version);
        assert!(after.locked);
        assert_eq!(after.lock_reason.as_deref(), Some("Field verified"));
        assert!(run.summary.error_counts.contains_key("locked"));

        // Only the human-review stage may supersede it.
        let err = pipeline
            .cache_mut()
            .put(before.clone(), "proximity")
            .unwrap_err();
        assert!(matches!(err, CacheError::Locked { .. }));
        let stored = pipeline
            .cache_mut()
            .put(before, HUMAN_REVIEW_STAGE)
            .unwrap();
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn blank_ticket_numbers_are_rejected_not_cached() {
        let mut pipeline = test_pipeline("rejected", SkipRules::default());
        let mut bad = ticket("", "US 385", "FM 1788");
        bad.ticket_number = "   ".to_string();
        let run = pipeline
            .run(&[bad, ticket("T1", "US 385", "FM 1788")])
            .unwrap();

        assert_eq!(run.summary.rejected, 1);
        assert_eq!(run.summary.error_counts.get("input_error"), Some(&1));
        assert_eq!(run.results.len(), 1);
        assert_eq!(run.summary.total_tickets, 2);
    }

    #[test]
    fn review_queue_orders_by_priority_then_confidence() {
        let mut pipeline = test_pipeline("queue", SkipRules::default());
        let mut emergency = ticket("T4", "FRYING PAN RANCH RD", "P15");
        emergency.ticket_type = Some("Emergency".to_string());
        let run = pipeline
            .run(&[
                ticket("T1", "US 385", "FM 1788"),
                ticket("T2", "CR 201", "CR 203"),
                emergency,
            ])
            .unwrap();

        let numbers: Vec<&str> = run
            .review_queue
            .iter()
            .map(|r| r.ticket_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["T4", "T2"]);
        assert_eq!(run.review_queue[0].review_priority, ReviewPriority::Critical);
    }

    #[test]
    fn run_exports_tables_and_summary() {
        let mut pipeline = test_pipeline("exports", SkipRules::default());
        pipeline.save_intermediate = true;
        let run = pipeline.run(&[ticket("T1", "US 385", "FM 1788")]).unwrap();

        let dir = &pipeline.output_dir;
        assert!(dir.join("results.csv").exists());
        assert!(dir.join("review_queue.csv").exists());
        assert!(dir.join("summary.json").exists());
        assert!(dir.join("results_proximity.csv").exists());
        assert!(run.summary.pipeline_id.starts_with("pipeline_"));

        let text = std::fs::read_to_string(dir.join("results.csv")).unwrap();
        assert!(text.starts_with("ticket_number,version,latitude,longitude,confidence"));
    }
}
