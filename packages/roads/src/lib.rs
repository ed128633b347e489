#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Road network spatial layer for ticket geocoding.
//!
//! Loads a county road layer from `GeoJSON` once at pipeline start and
//! answers name lookups and geometric queries against it. Name matching is
//! normalized symmetrically: both the indexed layer and the caller's query
//! go through the same canonicalization, so "Hwy 115", "SH-115", and
//! "HIGHWAY 115" all find the segment indexed as "SH 115".

pub mod cities;
pub mod geometry;
pub mod network;
pub mod normalize;
pub mod variants;

pub use cities::CityIndex;
pub use network::{RoadMatch, RoadNetwork, RoadSegment};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Road classification derived from the canonical name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoadClass {
    /// Interstate highways ("I 20").
    Interstate,
    /// US highways ("US 385").
    Us,
    /// State highways ("SH 115").
    State,
    /// Farm-to-market roads ("FM 1788").
    Fm,
    /// County roads ("CR 201").
    Cr,
    /// Frontage / service roads.
    Service,
    /// Everything else (named local streets, ranch roads).
    Other,
}

impl RoadClass {
    /// Classifies a canonical road name by its prefix family.
    #[must_use]
    pub fn from_canonical(canonical: &str) -> Self {
        let first = canonical.split_whitespace().next().unwrap_or("");
        match first {
            "I" => Self::Interstate,
            "US" => Self::Us,
            "SH" => Self::State,
            "FM" => Self::Fm,
            "CR" => Self::Cr,
            _ if canonical.contains("SERVICE") || canonical.contains("FRONTAGE") => Self::Service,
            _ => Self::Other,
        }
    }

    /// Short label used in reasoning strings and exports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interstate => "INTERSTATE",
            Self::Us => "US",
            Self::State => "STATE",
            Self::Fm => "FM",
            Self::Cr => "CR",
            Self::Service => "SERVICE",
            Self::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for RoadClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from loading or querying the road layer.
#[derive(Debug, Error)]
pub enum RoadNetworkError {
    /// File could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The layer is not valid `GeoJSON`.
    #[error("GeoJSON parse error: {0}")]
    Geojson(#[from] geojson::Error),

    /// A reference file is not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The layer contained no usable line features.
    #[error("No road features in {path}")]
    EmptyLayer {
        /// Path of the offending layer.
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_prefix_families() {
        assert_eq!(RoadClass::from_canonical("US 385"), RoadClass::Us);
        assert_eq!(RoadClass::from_canonical("SH 115"), RoadClass::State);
        assert_eq!(RoadClass::from_canonical("FM 1788"), RoadClass::Fm);
        assert_eq!(RoadClass::from_canonical("CR 201"), RoadClass::Cr);
        assert_eq!(RoadClass::from_canonical("I 20"), RoadClass::Interstate);
        assert_eq!(
            RoadClass::from_canonical("I 20 SERVICE"),
            RoadClass::Interstate
        );
        assert_eq!(
            RoadClass::from_canonical("NW SERVICE ROAD"),
            RoadClass::Service
        );
        assert_eq!(
            RoadClass::from_canonical("FRYING PAN RANCH"),
            RoadClass::Other
        );
    }
}
