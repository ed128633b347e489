#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Proximity geocoding for locate tickets.
//!
//! Resolves intersection and single-road tickets against the county road
//! layer using a cascade of geometric strategies, falling back to the city
//! reference point when the named roads cannot be located:
//!
//! 1. **Corridor midpoint** — both roads cross; take the crossing (nearest
//!    the city reference when there are several).
//! 2. **Closest point** — both roads present but disjoint; take the
//!    midpoint of their closest approach, up to 1.5 km apart.
//! 3. **City + primary street** — one road located; snap the city
//!    reference onto it, up to 5 km away.
//! 4. **City-centroid fallback** — neither road located; the city
//!    reference itself, at low confidence.
//!
//! Ticket metadata (emergency flag, declared duration, work type,
//! pipeline proximity) adjusts the strategy's base confidence additively;
//! the sum is clamped to [0, 1] once at the end.

pub mod confidence;
pub mod proximity;

pub use proximity::ProximityGeocoder;

use std::collections::BTreeMap;

/// Geometric strategy that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approach {
    /// Midpoint of the closest approach of two disjoint roads.
    ClosestPoint,
    /// Road crossing (nearest the city reference when several).
    CorridorMidpoint,
    /// City reference snapped onto the one located road.
    CityPrimary,
    /// The city reference point itself.
    CityCentroidFallback,
}

impl Approach {
    /// The tag recorded on cache records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClosestPoint => "closest_point",
            Self::CorridorMidpoint => "corridor_midpoint",
            Self::CityPrimary => "city_primary",
            Self::CityCentroidFallback => "city_centroid_fallback",
        }
    }
}

impl std::fmt::Display for Approach {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the geocoder produced for one ticket.
///
/// A failed geocode carries no coordinates, zero confidence, and an error
/// message; it is data, not an error — the stage turns it into a FAILED
/// record.
#[derive(Debug, Clone)]
pub struct GeocodeOutcome {
    /// Latitude (WGS84), absent on failure.
    pub latitude: Option<f64>,
    /// Longitude (WGS84), absent on failure.
    pub longitude: Option<f64>,
    /// Confidence in [0, 1] after adjustments.
    pub confidence: Option<f64>,
    /// Strategy that produced the result.
    pub approach: Option<Approach>,
    /// Human-readable account: strategy, roads searched, variant matches.
    pub reasoning: String,
    /// Failure description when no strategy produced coordinates.
    pub error_message: Option<String>,
    /// Strategy measurements and adjustment notes for the record's
    /// metadata bag.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl GeocodeOutcome {
    /// Whether coordinates were produced.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}
