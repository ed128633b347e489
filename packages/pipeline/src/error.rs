//! Pipeline error taxonomy.
//!
//! Per-ticket failures never surface here — they become FAILED records.
//! Only framework-level problems (storage invariants, configuration,
//! export IO) propagate as [`PipelineError`].

use locate_map_cache::CacheError;
use locate_map_corridor::CorridorError;
use locate_map_roads::RoadNetworkError;
use thiserror::Error;

/// Framework-level pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Cache invariant violation or database failure.
    #[error("Storage error: {0}")]
    Storage(#[from] CacheError),

    /// A stage was enabled without its required configuration, or a
    /// configured geometry is unusable.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is missing or wrong.
        message: String,
    },

    /// Road layer loading failure.
    #[error("Road network error: {0}")]
    RoadNetwork(#[from] RoadNetworkError),

    /// Corridor / pipeline geometry loading failure.
    #[error("Corridor error: {0}")]
    Corridor(#[from] CorridorError),

    /// Export or configuration file IO failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Results table export failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Summary serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file parse failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PipelineError {
    /// Shorthand for a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Per-ticket processing failure inside a stage.
///
/// Absorbed by the framework into a FAILED record; never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageError {
    /// What went wrong.
    pub message: String,
}

impl StageError {
    /// Builds a stage error from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StageError {}
