//! R-tree index over a 1-D geometry collection.
//!
//! Built once per batch from the route (or pipeline) polylines and queried
//! per geocoded point. Nearest-neighbor ordering runs in degree space; the
//! top candidates are refined with haversine meters, which absorbs the
//! latitude/longitude anisotropy at this working scale.

use std::path::Path;

use geo::{Line, LineString, Point};
use geojson::GeoJson;
use rstar::{AABB, PointDistance, RTree, RTreeObject};

use locate_map_roads::geometry::{closest_on_segment, distance_m};

use crate::CorridorError;

/// Degree-space candidates refined with haversine before picking the
/// nearest segment.
const REFINE_CANDIDATES: usize = 16;

/// One indexed segment of the geometry collection.
struct SegmentEntry {
    line: Line<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for SegmentEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        // Plain degree-space squared distance; consistent with the AABB
        // metric the tree prunes with.
        let p = Point::new(point[0], point[1]);
        let (dx, dy) = raw_offset(p, self.line);
        dx.mul_add(dx, dy * dy)
    }
}

/// Unscaled degree offsets from `p` to its projection on `line`.
fn raw_offset(p: Point<f64>, line: Line<f64>) -> (f64, f64) {
    let ax = line.start.x - p.x();
    let ay = line.start.y - p.y();
    let dx = line.end.x - line.start.x;
    let dy = line.end.y - line.start.y;
    let len2 = dx.mul_add(dx, dy * dy);
    let t = if len2 == 0.0 {
        0.0
    } else {
        (-ax.mul_add(dx, ay * dy) / len2).clamp(0.0, 1.0)
    };
    (t.mul_add(dx, ax), t.mul_add(dy, ay))
}

/// Spatial index over a route or pipeline geometry collection.
pub struct GeometryIndex {
    tree: RTree<SegmentEntry>,
    segment_count: usize,
}

impl GeometryIndex {
    /// Builds the index from polylines.
    ///
    /// # Errors
    ///
    /// Returns [`CorridorError::EmptyGeometry`] if the collection has no
    /// segments; corridor checks against nothing are configuration
    /// mistakes, not geometry answers.
    pub fn from_linestrings(geoms: &[LineString<f64>]) -> Result<Self, CorridorError> {
        let entries: Vec<SegmentEntry> = geoms
            .iter()
            .flat_map(LineString::lines)
            .map(|line| SegmentEntry {
                line,
                envelope: AABB::from_corners(
                    [line.start.x.min(line.end.x), line.start.y.min(line.end.y)],
                    [line.start.x.max(line.end.x), line.start.y.max(line.end.y)],
                ),
            })
            .collect();

        if entries.is_empty() {
            return Err(CorridorError::EmptyGeometry);
        }

        let segment_count = entries.len();
        Ok(Self {
            tree: RTree::bulk_load(entries),
            segment_count,
        })
    }

    /// Loads every line geometry from a `GeoJSON` file and indexes it.
    ///
    /// # Errors
    ///
    /// Returns [`CorridorError`] if the file cannot be read or parsed, or
    /// contains no line geometry.
    pub fn load(path: &Path) -> Result<Self, CorridorError> {
        let geoms = linestrings_from_geojson(path)?;
        let index = Self::from_linestrings(&geoms)?;
        log::info!(
            "Indexed {} corridor segments from {}",
            index.segment_count,
            path.display()
        );
        Ok(index)
    }

    /// Number of indexed segments.
    #[must_use]
    pub const fn segment_count(&self) -> usize {
        self.segment_count
    }

    /// Closest point on the collection to `p`, with haversine meters.
    #[must_use]
    pub fn closest_to(&self, p: Point<f64>) -> (Point<f64>, f64) {
        let query = [p.x(), p.y()];
        let mut best: Option<(Point<f64>, f64)> = None;

        for entry in self.tree.nearest_neighbor_iter(&query).take(REFINE_CANDIDATES) {
            let candidate = closest_on_segment(p, entry.line);
            let d = distance_m(p, candidate);
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((candidate, d));
            }
        }

        // Non-empty by construction.
        best.map_or((p, f64::INFINITY), |found| found)
    }
}

/// Extracts every LineString (including MultiLineString members) from a
/// `GeoJSON` file, ignoring non-line geometries.
fn linestrings_from_geojson(path: &Path) -> Result<Vec<LineString<f64>>, CorridorError> {
    let text = std::fs::read_to_string(path)?;
    let geojson: GeoJson = text.parse()?;

    let mut lines = Vec::new();
    let mut push_geometry = |geom: geojson::Geometry| {
        let geo_geom: geo::Geometry<f64> = match geom.try_into() {
            Ok(g) => g,
            Err(e) => {
                log::warn!("Skipping corridor geometry: {e}");
                return;
            }
        };
        collect_lines(geo_geom, &mut lines);
    };

    match geojson {
        GeoJson::FeatureCollection(fc) => {
            for feature in fc.features {
                if let Some(geom) = feature.geometry {
                    push_geometry(geom);
                }
            }
        }
        GeoJson::Feature(feature) => {
            if let Some(geom) = feature.geometry {
                push_geometry(geom);
            }
        }
        GeoJson::Geometry(geom) => push_geometry(geom),
    }

    Ok(lines)
}

fn collect_lines(geom: geo::Geometry<f64>, out: &mut Vec<LineString<f64>>) {
    match geom {
        geo::Geometry::LineString(ls) => out.push(ls),
        geo::Geometry::MultiLineString(mls) => out.extend(mls.0),
        geo::Geometry::GeometryCollection(gc) => {
            for inner in gc.0 {
                collect_lines(inner, out);
            }
        }
        _ => log::warn!("Skipping non-line corridor geometry"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_collections() {
        assert!(matches!(
            GeometryIndex::from_linestrings(&[]),
            Err(CorridorError::EmptyGeometry)
        ));
    }

    #[test]
    fn finds_nearest_segment_among_many() {
        let far = LineString::from(vec![(-102.0, 32.0), (-102.0, 32.1)]);
        let near = LineString::from(vec![(-102.55, 32.28), (-102.55, 32.34)]);
        let index = GeometryIndex::from_linestrings(&[far, near]).unwrap();

        let p = Point::new(-102.5457, 32.3187);
        let (on_route, d) = index.closest_to(p);
        assert!((on_route.x() - -102.55).abs() < 1e-9);
        // ~0.0043° of longitude at 32.3°N ≈ 404 m.
        assert!((d - 404.0).abs() < 10.0, "{d}");
    }
}
