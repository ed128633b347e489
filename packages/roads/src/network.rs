//! The loaded road network and its normalized name index.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{LineString, Point};
use geojson::GeoJson;

use crate::geometry::{self, ClosestPair};
use crate::normalize::normalize_name;
use crate::variants::name_variants;
use crate::{RoadClass, RoadNetworkError};

/// One road polyline with its normalized name and classification.
#[derive(Debug, Clone)]
pub struct RoadSegment {
    /// Name as it appeared in the source layer.
    pub name: String,
    /// Canonical (index) form of the name.
    pub canonical: String,
    /// Prefix-family classification.
    pub class: RoadClass,
    /// Polyline geometry, (lng, lat) vertex order.
    pub geometry: LineString<f64>,
}

/// A successful name lookup: the segments indexed under one canonical name.
#[derive(Debug, Clone)]
pub struct RoadMatch<'a> {
    /// Canonical form of the name the caller asked for.
    pub queried: String,
    /// Canonical name that actually matched (differs from `queried` when
    /// variant generation resolved the lookup).
    pub matched: String,
    /// Whether variant generation was needed.
    pub via_variant: bool,
    /// Matching segments, in layer order.
    pub segments: Vec<&'a RoadSegment>,
}

impl RoadMatch<'_> {
    /// The matched segments' geometries.
    #[must_use]
    pub fn linestrings(&self) -> Vec<&LineString<f64>> {
        self.segments.iter().map(|s| &s.geometry).collect()
    }

    /// Closest point on this road to `p`, with haversine meters.
    #[must_use]
    pub fn closest_to(&self, p: Point<f64>) -> Option<(Point<f64>, f64)> {
        geometry::closest_on_collection(p, &self.linestrings())
    }
}

/// Read-only spatially-queryable road layer, loaded once per batch.
pub struct RoadNetwork {
    segments: Vec<RoadSegment>,
    by_name: BTreeMap<String, Vec<usize>>,
}

impl RoadNetwork {
    /// Loads the layer from a `GeoJSON` FeatureCollection of LineString /
    /// MultiLineString features. The road name is read from the `name`
    /// property, falling back to `FULLNAME` (TIGER/Line exports).
    ///
    /// # Errors
    ///
    /// Returns [`RoadNetworkError`] if the file cannot be read or parsed,
    /// or contains no usable line features.
    pub fn load(path: &Path) -> Result<Self, RoadNetworkError> {
        let text = std::fs::read_to_string(path)?;
        let geojson: GeoJson = text.parse()?;

        let mut named_lines: Vec<(String, LineString<f64>)> = Vec::new();
        if let GeoJson::FeatureCollection(fc) = geojson {
            for feature in fc.features {
                let Some(name) = feature
                    .properties
                    .as_ref()
                    .and_then(|props| props.get("name").or_else(|| props.get("FULLNAME")))
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(ToString::to_string)
                else {
                    continue;
                };
                let Some(geom) = feature.geometry else {
                    continue;
                };
                let geo_geom: geo::Geometry<f64> = match geom.try_into() {
                    Ok(g) => g,
                    Err(e) => {
                        log::warn!("Skipping road {name:?}: {e}");
                        continue;
                    }
                };
                match geo_geom {
                    geo::Geometry::LineString(ls) => named_lines.push((name, ls)),
                    geo::Geometry::MultiLineString(mls) => {
                        named_lines.extend(mls.0.into_iter().map(|ls| (name.clone(), ls)));
                    }
                    _ => log::warn!("Skipping road {name:?}: not a line geometry"),
                }
            }
        }

        if named_lines.is_empty() {
            return Err(RoadNetworkError::EmptyLayer {
                path: path.display().to_string(),
            });
        }

        let network = Self::from_named_lines(named_lines);
        log::info!(
            "Loaded {} road segments under {} names from {}",
            network.segments.len(),
            network.by_name.len(),
            path.display()
        );
        Ok(network)
    }

    /// Builds a network from already-extracted `(name, polyline)` pairs.
    #[must_use]
    pub fn from_named_lines(named_lines: Vec<(String, LineString<f64>)>) -> Self {
        let mut segments = Vec::with_capacity(named_lines.len());
        let mut by_name: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (name, geometry) in named_lines {
            let canonical = normalize_name(&name);
            let class = RoadClass::from_canonical(&canonical);
            by_name.entry(canonical.clone()).or_default().push(segments.len());
            segments.push(RoadSegment {
                name,
                canonical,
                class,
                geometry,
            });
        }

        Self { segments, by_name }
    }

    /// Number of segments in the layer.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the layer is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Looks a road up by (raw) name.
    ///
    /// The name is canonicalized first; on a miss, the same route number is
    /// retried under the other prefix families in deterministic order.
    #[must_use]
    pub fn find_by_name(&self, raw: &str) -> Option<RoadMatch<'_>> {
        let canonical = normalize_name(raw);

        if let Some(indices) = self.by_name.get(&canonical) {
            return Some(self.build_match(canonical.clone(), canonical, false, indices));
        }

        for variant in name_variants(&canonical) {
            if let Some(indices) = self.by_name.get(&variant) {
                log::debug!("Road {canonical:?} resolved via variant {variant:?}");
                return Some(self.build_match(canonical, variant, true, indices));
            }
        }

        None
    }

    fn build_match(
        &self,
        queried: String,
        matched: String,
        via_variant: bool,
        indices: &[usize],
    ) -> RoadMatch<'_> {
        RoadMatch {
            queried,
            matched,
            via_variant,
            segments: indices.iter().map(|&i| &self.segments[i]).collect(),
        }
    }

    /// Crossing points between two matched roads.
    #[must_use]
    pub fn intersections(&self, a: &RoadMatch<'_>, b: &RoadMatch<'_>) -> Vec<Point<f64>> {
        geometry::collection_intersections(&a.linestrings(), &b.linestrings())
    }

    /// Closest pair of points between two matched roads.
    #[must_use]
    pub fn closest_point_pair(&self, a: &RoadMatch<'_>, b: &RoadMatch<'_>) -> Option<ClosestPair> {
        geometry::closest_pair(&a.linestrings(), &b.linestrings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> RoadNetwork {
        RoadNetwork::from_named_lines(vec![
            (
                "SH 115".to_string(),
                LineString::from(vec![(-102.55, 32.28), (-102.55, 32.34)]),
            ),
            (
                "US 385".to_string(),
                LineString::from(vec![(-102.54, 32.25), (-102.54, 32.40)]),
            ),
            (
                "FM 1788".to_string(),
                LineString::from(vec![(-102.60, 32.31), (-102.50, 32.31)]),
            ),
        ])
    }

    #[test]
    fn finds_roads_by_canonical_name() {
        let net = network();
        let hit = net.find_by_name("US 385").unwrap();
        assert_eq!(hit.matched, "US 385");
        assert!(!hit.via_variant);
        assert_eq!(hit.segments.len(), 1);
        assert_eq!(hit.segments[0].class, RoadClass::Us);
    }

    #[test]
    fn finds_roads_through_prefix_canonicalization() {
        let net = network();
        let hit = net.find_by_name("Hwy 115").unwrap();
        assert_eq!(hit.matched, "SH 115");
        assert!(!hit.via_variant);
    }

    #[test]
    fn falls_back_to_variant_generation() {
        let net = network();
        // Mistagged family: the layer has FM 1788, the ticket says CR 1788.
        let hit = net.find_by_name("COUNTY ROAD 1788").unwrap();
        assert_eq!(hit.queried, "CR 1788");
        assert_eq!(hit.matched, "FM 1788");
        assert!(hit.via_variant);
    }

    #[test]
    fn unknown_roads_miss() {
        let net = network();
        assert!(net.find_by_name("P15").is_none());
        assert!(net.find_by_name("CR 9999").is_none());
    }

    #[test]
    fn intersections_between_crossing_roads() {
        let net = network();
        let us = net.find_by_name("US 385").unwrap();
        let fm = net.find_by_name("FM 1788").unwrap();
        let crossings = net.intersections(&us, &fm);
        assert_eq!(crossings.len(), 1);
        assert!((crossings[0].x() - -102.54).abs() < 1e-9);
        assert!((crossings[0].y() - 32.31).abs() < 1e-9);
    }

    #[test]
    fn closest_pair_between_parallel_roads() {
        let net = network();
        let us = net.find_by_name("US 385").unwrap();
        let sh = net.find_by_name("SH 115").unwrap();
        assert!(net.intersections(&us, &sh).is_empty());
        let pair = net.closest_point_pair(&us, &sh).unwrap();
        // ~0.01° of longitude at 32.3°N.
        assert!((pair.distance_m - 940.0).abs() < 20.0, "{}", pair.distance_m);
    }
}
