#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Route-corridor and pipeline-proximity checks.
//!
//! Two independent services over the same spatial idea — distance from a
//! point to a 1-D geometry collection — configured separately because
//! their geometries differ: the full work route vs. the known pipeline.
//! Both are built once per batch and shared read-only with the stages.

pub mod index;

pub use index::GeometryIndex;

use geo::Point;
use thiserror::Error;

/// Confidence boost granted inside the pipeline boost zone.
pub const PIPELINE_BOOST: f64 = 0.15;

/// Default corridor buffer, in meters.
pub const DEFAULT_BUFFER_M: f64 = 500.0;

/// Default pipeline boost radius, in meters.
pub const DEFAULT_BOOST_RADIUS_M: f64 = 500.0;

/// Errors from corridor construction.
#[derive(Debug, Error)]
pub enum CorridorError {
    /// Geometry file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Geometry file is not valid `GeoJSON`.
    #[error("GeoJSON parse error: {0}")]
    Geojson(#[from] geojson::Error),

    /// The configured geometry has no line segments.
    #[error("Corridor geometry contains no line segments")]
    EmptyGeometry,
}

/// Result of a corridor containment check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorridorCheck {
    /// Whether the point lies within the buffer.
    pub within: bool,
    /// Perpendicular distance to the closest route segment, in meters.
    pub distance_m: f64,
}

/// Tests whether geocoded points lie within a buffered route corridor.
pub struct RouteCorridorValidator {
    index: GeometryIndex,
    buffer_m: f64,
}

impl RouteCorridorValidator {
    /// Builds the validator from the route geometry and a buffer.
    #[must_use]
    pub const fn new(index: GeometryIndex, buffer_m: f64) -> Self {
        Self { index, buffer_m }
    }

    /// The configured buffer, in meters.
    #[must_use]
    pub const fn buffer_m(&self) -> f64 {
        self.buffer_m
    }

    /// Distance from the point to the route, and whether it falls inside
    /// the buffer.
    #[must_use]
    pub fn check(&self, lat: f64, lng: f64) -> CorridorCheck {
        let (_, distance_m) = self.index.closest_to(Point::new(lng, lat));
        CorridorCheck {
            within: distance_m <= self.buffer_m,
            distance_m,
        }
    }
}

/// Result of a pipeline proximity analysis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineProximity {
    /// Distance to the closest pipeline segment, in meters.
    pub distance_m: f64,
    /// Whether the point is inside the boost zone.
    pub within_boost_zone: bool,
    /// Confidence boost to apply (0.15 inside the zone, else 0).
    pub confidence_boost: f64,
}

/// Scores geocoded points by their distance to the known pipeline.
pub struct PipelineProximityAnalyzer {
    index: GeometryIndex,
    boost_radius_m: f64,
}

impl PipelineProximityAnalyzer {
    /// Builds the analyzer from the pipeline geometry and a boost radius.
    #[must_use]
    pub const fn new(index: GeometryIndex, boost_radius_m: f64) -> Self {
        Self {
            index,
            boost_radius_m,
        }
    }

    /// The configured boost radius, in meters.
    #[must_use]
    pub const fn boost_radius_m(&self) -> f64 {
        self.boost_radius_m
    }

    /// Distance to the pipeline and the boost it earns.
    #[must_use]
    pub fn analyze(&self, lat: f64, lng: f64) -> PipelineProximity {
        let (_, distance_m) = self.index.closest_to(Point::new(lng, lat));
        let within_boost_zone = distance_m <= self.boost_radius_m;
        PipelineProximity {
            distance_m,
            within_boost_zone,
            confidence_boost: if within_boost_zone { PIPELINE_BOOST } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use geo::LineString;

    use super::*;

    // North-south route at -102.55, spanning Andrews.
    fn route_index() -> GeometryIndex {
        GeometryIndex::from_linestrings(&[LineString::from(vec![
            (-102.55, 32.20),
            (-102.55, 32.40),
        ])])
        .unwrap()
    }

    #[test]
    fn corridor_contains_points_inside_the_buffer() {
        let validator = RouteCorridorValidator::new(route_index(), DEFAULT_BUFFER_M);

        let on_route = validator.check(32.30, -102.55);
        assert!(on_route.within);
        assert!(on_route.distance_m < 1.0);

        // ~404 m east of the route: inside a 500 m buffer.
        let near = validator.check(32.3187, -102.5457);
        assert!(near.within, "distance {}", near.distance_m);

        // ~4 km east: outside.
        let far = validator.check(32.3187, -102.5057);
        assert!(!far.within);
        assert!(far.distance_m > 3_000.0);
    }

    #[test]
    fn pipeline_boost_applies_only_inside_the_zone() {
        let analyzer = PipelineProximityAnalyzer::new(route_index(), DEFAULT_BOOST_RADIUS_M);

        let near = analyzer.analyze(32.30, -102.551);
        assert!(near.within_boost_zone);
        assert!((near.confidence_boost - PIPELINE_BOOST).abs() < f64::EPSILON);

        let far = analyzer.analyze(32.30, -102.60);
        assert!(!far.within_boost_zone);
        assert!(far.confidence_boost.abs() < f64::EPSILON);
    }
}
