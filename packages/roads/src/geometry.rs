//! Geometric primitives over road polylines.
//!
//! All distances are haversine meters. Closest-point projection runs in a
//! local equirectangular frame (longitude scaled by the cosine of the
//! query latitude), which is exact to well under a meter at county scale.

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{BoundingRect, Distance, Haversine, InterpolatePoint, Line, LineString, Point, Rect};

/// Two intersection points closer than this are treated as one crossing.
const DUPLICATE_CROSSING_M: f64 = 1.0;

/// Bounding-box slack for segment-pair prechecks, in degrees (~20 m).
const BBOX_MARGIN_DEG: f64 = 0.0002;

/// The closest points between two geometry collections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPair {
    /// Closest point on the first collection.
    pub on_a: Point<f64>,
    /// Closest point on the second collection.
    pub on_b: Point<f64>,
    /// Haversine distance between the two, in meters.
    pub distance_m: f64,
}

/// Haversine distance between two points, in meters.
#[must_use]
pub fn distance_m(a: Point<f64>, b: Point<f64>) -> f64 {
    Haversine.distance(a, b)
}

/// Great-circle midpoint of two points.
#[must_use]
pub fn midpoint(a: Point<f64>, b: Point<f64>) -> Point<f64> {
    Haversine.point_at_ratio_between(a, b, 0.5)
}

/// Closest point to `p` on a single segment.
#[must_use]
pub fn closest_on_segment(p: Point<f64>, line: Line<f64>) -> Point<f64> {
    let kx = p.y().to_radians().cos();
    let ax = (line.start.x - p.x()) * kx;
    let ay = line.start.y - p.y();
    let bx = (line.end.x - p.x()) * kx;
    let by = line.end.y - p.y();

    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx.mul_add(dx, dy * dy);
    let t = if len2 == 0.0 {
        0.0
    } else {
        (-ax.mul_add(dx, ay * dy) / len2).clamp(0.0, 1.0)
    };

    Point::new(
        t.mul_add(line.end.x - line.start.x, line.start.x),
        t.mul_add(line.end.y - line.start.y, line.start.y),
    )
}

/// Closest point to `p` on a polyline, with its distance in meters.
///
/// `None` only for degenerate (empty) polylines.
#[must_use]
pub fn closest_on_linestring(p: Point<f64>, ls: &LineString<f64>) -> Option<(Point<f64>, f64)> {
    let mut best: Option<(Point<f64>, f64)> = None;
    for segment in ls.lines() {
        let candidate = closest_on_segment(p, segment);
        let d = distance_m(p, candidate);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((candidate, d));
        }
    }
    best
}

/// Closest point to `p` across a collection of polylines.
#[must_use]
pub fn closest_on_collection(
    p: Point<f64>,
    geoms: &[&LineString<f64>],
) -> Option<(Point<f64>, f64)> {
    let mut best: Option<(Point<f64>, f64)> = None;
    for ls in geoms {
        if let Some((candidate, d)) = closest_on_linestring(p, ls)
            && best.is_none_or(|(_, bd)| d < bd)
        {
            best = Some((candidate, d));
        }
    }
    best
}

/// All crossing points between two geometry collections.
///
/// Crossings within a meter of each other collapse to the first one found,
/// so a crossing that lands exactly on a shared vertex of two consecutive
/// segments reports once.
#[must_use]
pub fn collection_intersections(
    a: &[&LineString<f64>],
    b: &[&LineString<f64>],
) -> Vec<Point<f64>> {
    let mut crossings: Vec<Point<f64>> = Vec::new();

    for ls_a in a {
        let Some(rect_a) = ls_a.bounding_rect() else {
            continue;
        };
        for ls_b in b {
            let Some(rect_b) = ls_b.bounding_rect() else {
                continue;
            };
            if !rects_overlap(&rect_a, &rect_b) {
                continue;
            }
            for seg_a in ls_a.lines() {
                for seg_b in ls_b.lines() {
                    let Some(hit) = line_intersection(seg_a, seg_b) else {
                        continue;
                    };
                    let point = match hit {
                        LineIntersection::SinglePoint { intersection, .. } => {
                            Point::from(intersection)
                        }
                        // Overlapping collinear stretches report their center.
                        LineIntersection::Collinear { intersection } => midpoint(
                            Point::from(intersection.start),
                            Point::from(intersection.end),
                        ),
                    };
                    if crossings
                        .iter()
                        .all(|c| distance_m(*c, point) > DUPLICATE_CROSSING_M)
                    {
                        crossings.push(point);
                    }
                }
            }
        }
    }

    crossings
}

/// The closest pair of points between two geometry collections.
///
/// Candidates are every vertex of one side projected onto the other,
/// evaluated symmetrically; for road polylines this finds the true minimum.
#[must_use]
pub fn closest_pair(a: &[&LineString<f64>], b: &[&LineString<f64>]) -> Option<ClosestPair> {
    let mut best: Option<ClosestPair> = None;

    for ls_a in a {
        for va in ls_a.points() {
            if let Some((pb, d)) = closest_on_collection(va, b)
                && best.is_none_or(|p| d < p.distance_m)
            {
                best = Some(ClosestPair {
                    on_a: va,
                    on_b: pb,
                    distance_m: d,
                });
            }
        }
    }
    for ls_b in b {
        for vb in ls_b.points() {
            if let Some((pa, d)) = closest_on_collection(vb, a)
                && best.is_none_or(|p| d < p.distance_m)
            {
                best = Some(ClosestPair {
                    on_a: pa,
                    on_b: vb,
                    distance_m: d,
                });
            }
        }
    }

    best
}

fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x - BBOX_MARGIN_DEG <= b.max().x
        && b.min().x - BBOX_MARGIN_DEG <= a.max().x
        && a.min().y - BBOX_MARGIN_DEG <= b.max().y
        && b.min().y - BBOX_MARGIN_DEG <= a.max().y
}

#[cfg(test)]
mod tests {
    use super::*;

    // Around 32°N (Andrews County): 1° of latitude ≈ 111,195 m.
    const LAT: f64 = 32.3;
    const LNG: f64 = -102.5;
    const DEG_LAT_M: f64 = 111_195.0;

    fn ns_line(lng: f64, lat_lo: f64, lat_hi: f64) -> LineString<f64> {
        LineString::from(vec![(lng, lat_lo), (lng, lat_hi)])
    }

    fn ew_line(lat: f64, lng_lo: f64, lng_hi: f64) -> LineString<f64> {
        LineString::from(vec![(lng_lo, lat), (lng_hi, lat)])
    }

    #[test]
    fn crossing_roads_intersect_once() {
        let ns = ns_line(LNG, LAT - 0.05, LAT + 0.05);
        let ew = ew_line(LAT, LNG - 0.05, LNG + 0.05);
        let crossings = collection_intersections(&[&ns], &[&ew]);
        assert_eq!(crossings.len(), 1);
        assert!((crossings[0].x() - LNG).abs() < 1e-9);
        assert!((crossings[0].y() - LAT).abs() < 1e-9);
    }

    #[test]
    fn disjoint_roads_do_not_intersect() {
        let a = ns_line(LNG, LAT, LAT + 0.05);
        let b = ns_line(LNG + 0.01, LAT, LAT + 0.05);
        assert!(collection_intersections(&[&a], &[&b]).is_empty());
    }

    #[test]
    fn shared_vertex_crossing_reports_once() {
        // Two polylines that touch exactly at a shared endpoint of two
        // consecutive segments.
        let bent = LineString::from(vec![
            (LNG - 0.02, LAT),
            (LNG, LAT),
            (LNG + 0.02, LAT + 0.01),
        ]);
        let ns = ns_line(LNG, LAT - 0.02, LAT + 0.02);
        let crossings = collection_intersections(&[&bent], &[&ns]);
        assert_eq!(crossings.len(), 1);
    }

    #[test]
    fn closest_pair_between_parallel_roads() {
        // Two north-south roads 600 m apart (offset in latitude-equivalent
        // meters via longitude at this latitude).
        let offset_deg = 600.0 / (DEG_LAT_M * LAT.to_radians().cos());
        let a = ns_line(LNG, LAT - 0.02, LAT + 0.02);
        let b = ns_line(LNG + offset_deg, LAT - 0.02, LAT + 0.02);

        let pair = closest_pair(&[&a], &[&b]).unwrap();
        assert!((pair.distance_m - 600.0).abs() < 5.0, "{}", pair.distance_m);
    }

    #[test]
    fn closest_point_projects_onto_segment_interior() {
        let road = ns_line(LNG, LAT - 0.02, LAT + 0.02);
        let p = Point::new(LNG + 0.01, LAT);
        let (on_road, d) = closest_on_linestring(p, &road).unwrap();
        assert!((on_road.x() - LNG).abs() < 1e-9);
        assert!((on_road.y() - LAT).abs() < 1e-6);
        let expected = 0.01 * DEG_LAT_M * LAT.to_radians().cos();
        assert!((d - expected).abs() < 2.0, "{d} vs {expected}");
    }

    #[test]
    fn midpoint_halves_the_distance() {
        let a = Point::new(LNG, LAT);
        let b = Point::new(LNG, LAT + 0.02);
        let m = midpoint(a, b);
        let d_am = distance_m(a, m);
        let d_total = distance_m(a, b);
        assert!((d_am - d_total / 2.0).abs() < 0.5);
    }
}
