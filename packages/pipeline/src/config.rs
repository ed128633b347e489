//! Pipeline configuration shape.
//!
//! The recognized options, deserialized from TOML by the host. Loading the
//! file is host business; stage construction validates that every enabled
//! stage has the inputs it needs and fails the batch before any ticket is
//! processed.

use std::path::{Path, PathBuf};

use locate_map_quality::SkipRules;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Default `city_distance` threshold, in kilometers.
const DEFAULT_MAX_DISTANCE_KM: f64 = 50.0;
/// Default corridor buffer, in meters.
const DEFAULT_BUFFER_M: f64 = 500.0;
/// Default pipeline boost radius and mismatch threshold, in meters.
const DEFAULT_PIPELINE_RADIUS_M: f64 = 500.0;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Cache store location.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Where results, review queue, and summary land.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Abort the batch on framework errors instead of logging them.
    #[serde(default)]
    pub fail_fast: bool,
    /// Export a results snapshot after each stage.
    #[serde(default)]
    pub save_intermediate: bool,
    /// Per-stage settings.
    #[serde(default)]
    pub stages: StagesConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            output_dir: default_output_dir(),
            fail_fast: false,
            save_intermediate: false,
            stages: StagesConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// Cache store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache database location.
    pub db_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("locate_map_cache.duckdb"),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Settings for every shipped stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagesConfig {
    /// Proximity geocoding stage.
    #[serde(default)]
    pub proximity: ProximityStageConfig,
    /// Validation stage.
    #[serde(default)]
    pub validation: ValidationStageConfig,
    /// Corridor / pipeline enrichment stage.
    #[serde(default)]
    pub enrichment: EnrichmentStageConfig,
}

/// Proximity stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProximityStageConfig {
    /// Whether the stage runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Skip criteria against cached records.
    #[serde(default)]
    pub skip_rules: SkipRules,
    /// Road layer `GeoJSON`. Required when the stage is enabled.
    #[serde(default)]
    pub road_network_path: Option<PathBuf>,
    /// City reference JSON. Optional; without it the fallback strategy
    /// cannot produce coordinates.
    #[serde(default)]
    pub city_reference_path: Option<PathBuf>,
    /// Maximum plausible distance between a geocode and its city
    /// reference, in kilometers; beyond it the `city_distance` flag fires.
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,
}

impl Default for ProximityStageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_rules: SkipRules::default(),
            road_network_path: None,
            city_reference_path: None,
            max_distance_km: DEFAULT_MAX_DISTANCE_KM,
        }
    }
}

/// Validation stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationStageConfig {
    /// Whether the stage runs.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Skip criteria against cached records.
    #[serde(default)]
    pub skip_rules: SkipRules,
    /// Rule names to enable. `None` runs every built-in rule.
    #[serde(default)]
    pub validation_rules: Option<Vec<String>>,
    /// `city_distance` rule threshold, in kilometers.
    #[serde(default = "default_max_distance_km")]
    pub city_distance_km: f64,
    /// `pipeline_mismatch` rule threshold, in meters.
    #[serde(default = "default_pipeline_radius_m")]
    pub pipeline_mismatch_m: f64,
}

impl Default for ValidationStageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            skip_rules: SkipRules::default(),
            validation_rules: None,
            city_distance_km: DEFAULT_MAX_DISTANCE_KM,
            pipeline_mismatch_m: DEFAULT_PIPELINE_RADIUS_M,
        }
    }
}

/// Enrichment stage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentStageConfig {
    /// Whether the stage runs. Off by default; it needs geometry.
    #[serde(default)]
    pub enabled: bool,
    /// Skip criteria against cached records.
    #[serde(default)]
    pub skip_rules: SkipRules,
    /// Route corridor settings.
    #[serde(default)]
    pub route: Option<RouteConfig>,
    /// Pipeline proximity settings.
    #[serde(default)]
    pub pipeline: Option<PipelineGeometryConfig>,
}

/// Route corridor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Route geometry. Named for the KMZ exports routes arrive as, but the
    /// loader reads `GeoJSON`; raw `.kmz` must be converted first.
    pub kmz_path: PathBuf,
    /// Corridor buffer, in meters.
    #[serde(default = "default_buffer_m")]
    pub buffer_m: f64,
}

/// Pipeline geometry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineGeometryConfig {
    /// Pipeline geometry (`GeoJSON`).
    pub geometry_path: PathBuf,
    /// Boost radius, in meters.
    #[serde(default = "default_pipeline_radius_m")]
    pub boost_radius_m: f64,
}

const fn default_true() -> bool {
    true
}

const fn default_max_distance_km() -> f64 {
    DEFAULT_MAX_DISTANCE_KM
}

const fn default_buffer_m() -> f64 {
    DEFAULT_BUFFER_M
}

const fn default_pipeline_radius_m() -> f64 {
    DEFAULT_PIPELINE_RADIUS_M
}

/// Checks that a configured geometry path is something the loader can
/// actually read.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] for missing files and for raw
/// `.kmz` that has not been converted to `GeoJSON`.
pub fn check_geometry_path(path: &Path, what: &str) -> Result<(), PipelineError> {
    if !path.exists() {
        return Err(PipelineError::configuration(format!(
            "{what} geometry {} does not exist",
            path.display()
        )));
    }
    if path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("kmz"))
    {
        return Err(PipelineError::configuration(format!(
            "{what} geometry {} is a raw KMZ; convert it to GeoJSON first",
            path.display()
        )));
    }
    Ok(())
}
