//! City reference points.
//!
//! Maps `(city, county)` to a reference coordinate (typically the city
//! centroid). Built by the host from a JSON array and shared read-only
//! with every stage; the geocoder uses it to pick among multiple
//! crossings, to snap single-road tickets, and as the last-resort
//! fallback coordinate.

use std::collections::BTreeMap;
use std::path::Path;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::RoadNetworkError;

/// One city reference entry as stored in the JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityEntry {
    /// City name.
    pub city: String,
    /// County name.
    pub county: String,
    /// Reference latitude (WGS84).
    pub latitude: f64,
    /// Reference longitude (WGS84).
    pub longitude: f64,
}

/// Case-insensitive `(city, county)` → reference point index.
#[derive(Debug, Clone, Default)]
pub struct CityIndex {
    by_city_county: BTreeMap<(String, String), Point<f64>>,
    by_city: BTreeMap<String, Point<f64>>,
}

impl CityIndex {
    /// Builds the index from reference entries.
    #[must_use]
    pub fn from_entries(entries: &[CityEntry]) -> Self {
        let mut index = Self::default();
        for entry in entries {
            let city = normalize(&entry.city);
            let county = normalize(&entry.county);
            let point = Point::new(entry.longitude, entry.latitude);
            index
                .by_city_county
                .entry((city.clone(), county))
                .or_insert(point);
            index.by_city.entry(city).or_insert(point);
        }
        index
    }

    /// Loads the index from a JSON array of entries.
    ///
    /// # Errors
    ///
    /// Returns [`RoadNetworkError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, RoadNetworkError> {
        let text = std::fs::read_to_string(path)?;
        let entries: Vec<CityEntry> = serde_json::from_str(&text)?;
        let index = Self::from_entries(&entries);
        log::info!(
            "Loaded {} city reference points from {}",
            index.by_city_county.len(),
            path.display()
        );
        Ok(index)
    }

    /// Number of distinct `(city, county)` entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_city_county.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_city_county.is_empty()
    }

    /// Looks up the reference point for a ticket's city/county.
    ///
    /// Prefers the exact `(city, county)` pair; a ticket without a county
    /// (or with a county the index doesn't know) falls back to the city
    /// name alone.
    #[must_use]
    pub fn reference_point(&self, city: Option<&str>, county: Option<&str>) -> Option<Point<f64>> {
        let city = normalize(city?);
        if let Some(county) = county {
            let key = (city.clone(), normalize(county));
            if let Some(point) = self.by_city_county.get(&key) {
                return Some(*point);
            }
        }
        self.by_city.get(&city).copied()
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> CityIndex {
        CityIndex::from_entries(&[
            CityEntry {
                city: "Andrews".to_string(),
                county: "Andrews".to_string(),
                latitude: 32.3187,
                longitude: -102.5457,
            },
            CityEntry {
                city: "McKinney Acres".to_string(),
                county: "Andrews".to_string(),
                latitude: 32.2946,
                longitude: -102.5307,
            },
        ])
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let idx = index();
        let p = idx.reference_point(Some("ANDREWS"), Some("andrews")).unwrap();
        assert!((p.y() - 32.3187).abs() < 1e-9);
    }

    #[test]
    fn missing_county_falls_back_to_city() {
        let idx = index();
        assert!(idx.reference_point(Some("Andrews"), None).is_some());
        assert!(idx.reference_point(Some("Andrews"), Some("Winkler")).is_some());
    }

    #[test]
    fn unknown_city_misses() {
        let idx = index();
        assert!(idx.reference_point(Some("Kermit"), Some("Winkler")).is_none());
        assert!(idx.reference_point(None, Some("Andrews")).is_none());
    }
}
