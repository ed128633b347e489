#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Batch geocoding pipeline for 811 locate tickets.
//!
//! The orchestrator runs an ordered list of stages over a ticket batch,
//! stage-major: proximity geocoding first, then validation, then
//! corridor/pipeline enrichment. Each stage consults the versioned cache
//! through per-stage skip rules, and every write is validated, quality-
//! tiered, and appended as a new record version. At the end of a batch the
//! pipeline exports a results table, a prioritized review queue, and a
//! summary object.

pub mod config;
pub mod error;
pub mod export;
pub mod orchestrator;
pub mod stage;
pub mod stages;

pub use config::PipelineConfig;
pub use error::{PipelineError, StageError};
pub use orchestrator::{Pipeline, PipelineRun, PipelineSummary, SharedResources, StageSummary};
pub use stage::{PipelineStage, StageOutcome, StageOutput, StageStatistics};
