//! The proximity geocoder.

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::Point;
use locate_map_corridor::PipelineProximityAnalyzer;
use locate_map_roads::{CityIndex, RoadMatch, RoadNetwork, geometry};
use locate_map_ticket_models::Ticket;

use crate::confidence::{self, Adjustment};
use crate::{Approach, GeocodeOutcome};

/// Maximum closest-approach distance for disjoint roads, in meters.
const CLOSEST_POINT_MAX_M: f64 = 1500.0;
/// Closest-point confidence at zero separation.
const CLOSEST_POINT_BASE: f64 = 0.70;
/// Closest-point confidence at the maximum separation.
const CLOSEST_POINT_MIN: f64 = 0.55;
/// Confidence for a road crossing.
const CORRIDOR_MIDPOINT_CONFIDENCE: f64 = 0.85;
/// Confidence for a city reference snapped onto one road.
const CITY_PRIMARY_CONFIDENCE: f64 = 0.65;
/// Maximum snap distance for the city-primary strategy, in meters.
const CITY_SNAP_MAX_M: f64 = 5_000.0;
/// Confidence for the raw city reference point.
const FALLBACK_CONFIDENCE: f64 = 0.35;

/// Resolves tickets against the road network and city reference map.
///
/// Pure with respect to its inputs: the network, city index, and pipeline
/// geometry are shared read-only for the lifetime of a batch, and the same
/// ticket always produces the same outcome.
pub struct ProximityGeocoder {
    network: Arc<RoadNetwork>,
    cities: Arc<CityIndex>,
    pipeline: Option<Arc<PipelineProximityAnalyzer>>,
}

impl ProximityGeocoder {
    /// Builds a geocoder over the shared road network and city index.
    #[must_use]
    pub const fn new(network: Arc<RoadNetwork>, cities: Arc<CityIndex>) -> Self {
        Self {
            network,
            cities,
            pipeline: None,
        }
    }

    /// Enables the pipeline-proximity confidence boost.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Arc<PipelineProximityAnalyzer>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Geocodes one ticket.
    #[must_use]
    pub fn geocode(&self, ticket: &Ticket) -> GeocodeOutcome {
        let street = ticket.street_text();
        let cross = ticket.intersection_text();
        let city_ref = self
            .cities
            .reference_point(ticket.city_text(), ticket.county_text());

        let street_match = street.and_then(|name| self.network.find_by_name(name));
        let cross_match = cross.and_then(|name| self.network.find_by_name(name));

        let mut notes = Vec::new();
        push_lookup_note(&mut notes, "street", street, street_match.as_ref());
        push_lookup_note(&mut notes, "intersection", cross, cross_match.as_ref());

        match (&street_match, &cross_match) {
            (Some(a), Some(b)) => self.geocode_road_pair(ticket, a, b, city_ref, notes),
            (Some(road), None) | (None, Some(road)) => {
                self.geocode_single_road(ticket, road, city_ref, notes)
            }
            (None, None) => self.geocode_fallback(ticket, city_ref, notes),
        }
    }

    fn geocode_road_pair(
        &self,
        ticket: &Ticket,
        a: &RoadMatch<'_>,
        b: &RoadMatch<'_>,
        city_ref: Option<Point<f64>>,
        mut notes: Vec<String>,
    ) -> GeocodeOutcome {
        let crossings = self.network.intersections(a, b);
        if !crossings.is_empty() {
            let point = nearest_to_reference(&crossings, city_ref);
            notes.push(if crossings.len() == 1 {
                "roads cross once".to_string()
            } else {
                format!(
                    "roads cross {} times; chose the crossing nearest the city reference",
                    crossings.len()
                )
            });
            let mut metadata = BTreeMap::new();
            metadata.insert(
                "crossing_count".to_string(),
                serde_json::json!(crossings.len()),
            );
            return self.finish(
                ticket,
                Approach::CorridorMidpoint,
                point,
                CORRIDOR_MIDPOINT_CONFIDENCE,
                notes,
                metadata,
            );
        }

        if let Some(pair) = self.network.closest_point_pair(a, b) {
            if pair.distance_m <= CLOSEST_POINT_MAX_M {
                let point = geometry::midpoint(pair.on_a, pair.on_b);
                let base = (pair.distance_m / CLOSEST_POINT_MAX_M)
                    .mul_add(CLOSEST_POINT_MIN - CLOSEST_POINT_BASE, CLOSEST_POINT_BASE);
                notes.push(format!(
                    "roads do not cross; closest approach {:.0} m, using its midpoint",
                    pair.distance_m
                ));
                let mut metadata = BTreeMap::new();
                metadata.insert(
                    "closest_distance_m".to_string(),
                    serde_json::json!(pair.distance_m),
                );
                return self.finish(
                    ticket,
                    Approach::ClosestPoint,
                    point,
                    base,
                    notes,
                    metadata,
                );
            }
            notes.push(format!(
                "roads do not cross and are {:.0} m apart (over the {CLOSEST_POINT_MAX_M:.0} m limit)",
                pair.distance_m
            ));
        }

        self.geocode_fallback(ticket, city_ref, notes)
    }

    fn geocode_single_road(
        &self,
        ticket: &Ticket,
        road: &RoadMatch<'_>,
        city_ref: Option<Point<f64>>,
        mut notes: Vec<String>,
    ) -> GeocodeOutcome {
        if let Some(city) = city_ref {
            if let Some((snapped, snap_m)) = road.closest_to(city) {
                if snap_m <= CITY_SNAP_MAX_M {
                    notes.push(format!(
                        "snapped the city reference onto {} at {:.0} m",
                        road.matched, snap_m
                    ));
                    let mut metadata = BTreeMap::new();
                    metadata.insert("snap_distance_m".to_string(), serde_json::json!(snap_m));
                    return self.finish(
                        ticket,
                        Approach::CityPrimary,
                        snapped,
                        CITY_PRIMARY_CONFIDENCE,
                        notes,
                        metadata,
                    );
                }
                notes.push(format!(
                    "{} runs {:.0} m from the city reference (over the {CITY_SNAP_MAX_M:.0} m snap limit)",
                    road.matched, snap_m
                ));
            }
        }
        self.geocode_fallback(ticket, city_ref, notes)
    }

    fn geocode_fallback(
        &self,
        ticket: &Ticket,
        city_ref: Option<Point<f64>>,
        mut notes: Vec<String>,
    ) -> GeocodeOutcome {
        if let Some(point) = city_ref {
            notes.push("using the city reference point".to_string());
            return self.finish(
                ticket,
                Approach::CityCentroidFallback,
                point,
                FALLBACK_CONFIDENCE,
                notes,
                BTreeMap::new(),
            );
        }

        notes.push("no city reference available".to_string());
        let reasoning = notes.join("; ");
        GeocodeOutcome {
            latitude: None,
            longitude: None,
            confidence: Some(0.0),
            approach: None,
            reasoning: reasoning.clone(),
            error_message: Some(format!("every strategy exhausted: {reasoning}")),
            metadata: BTreeMap::new(),
        }
    }

    /// Applies ticket-context and pipeline adjustments and assembles the
    /// outcome.
    fn finish(
        &self,
        ticket: &Ticket,
        approach: Approach,
        point: Point<f64>,
        base: f64,
        notes: Vec<String>,
        mut metadata: BTreeMap<String, serde_json::Value>,
    ) -> GeocodeOutcome {
        let mut adjustments = confidence::ticket_adjustments(ticket);

        if let Some(pipeline) = &self.pipeline {
            let proximity = pipeline.analyze(point.y(), point.x());
            metadata.insert(
                "pipeline_distance_m".to_string(),
                serde_json::json!(proximity.distance_m),
            );
            if proximity.within_boost_zone {
                adjustments.push(Adjustment {
                    reason: "pipeline proximity",
                    delta: proximity.confidence_boost,
                });
                metadata.insert(
                    "pipeline_boost_applied".to_string(),
                    serde_json::json!(true),
                );
            }
        }

        let final_confidence = confidence::apply(base, &adjustments);
        if !adjustments.is_empty() {
            metadata.insert(
                "confidence_adjustments".to_string(),
                serde_json::json!(
                    adjustments
                        .iter()
                        .map(|a| format!("{:+.2} {}", a.delta, a.reason))
                        .collect::<Vec<_>>()
                ),
            );
        }

        log::debug!(
            "{}: {} at ({:.5}, {:.5}) confidence {:.2}",
            ticket.ticket_number,
            approach,
            point.y(),
            point.x(),
            final_confidence
        );

        GeocodeOutcome {
            latitude: Some(point.y()),
            longitude: Some(point.x()),
            confidence: Some(final_confidence),
            approach: Some(approach),
            reasoning: format!("{approach}: {}", notes.join("; ")),
            error_message: None,
            metadata,
        }
    }
}

/// Reasoning note for one road lookup.
fn push_lookup_note(
    notes: &mut Vec<String>,
    label: &str,
    raw: Option<&str>,
    matched: Option<&RoadMatch<'_>>,
) {
    match (raw, matched) {
        (Some(raw), Some(m)) => notes.push(format!("{label} {raw:?} matched {}", m.matched)),
        (Some(raw), None) => notes.push(format!("{label} {raw:?} not found in road network")),
        (None, _) => {}
    }
}

/// The crossing nearest the city reference, or the first one without it.
fn nearest_to_reference(crossings: &[Point<f64>], city_ref: Option<Point<f64>>) -> Point<f64> {
    city_ref.map_or(crossings[0], |reference| {
        crossings
            .iter()
            .copied()
            .min_by(|a, b| {
                geometry::distance_m(*a, reference)
                    .total_cmp(&geometry::distance_m(*b, reference))
            })
            .unwrap_or(crossings[0])
    })
}

#[cfg(test)]
mod tests {
    use geo::LineString;
    use locate_map_corridor::{DEFAULT_BOOST_RADIUS_M, GeometryIndex, PipelineProximityAnalyzer};
    use locate_map_roads::cities::CityEntry;

    use super::*;

    const CITY_LAT: f64 = 32.3187;
    const CITY_LNG: f64 = -102.5457;
    const DEG_LAT_M: f64 = 111_194.93;

    fn cities() -> Arc<CityIndex> {
        Arc::new(CityIndex::from_entries(&[CityEntry {
            city: "Andrews".to_string(),
            county: "Andrews".to_string(),
            latitude: CITY_LAT,
            longitude: CITY_LNG,
        }]))
    }

    fn county_network() -> Arc<RoadNetwork> {
        Arc::new(RoadNetwork::from_named_lines(vec![
            (
                "US 385".to_string(),
                LineString::from(vec![(-102.54, 32.25), (-102.54, 32.40)]),
            ),
            (
                "FM 1788".to_string(),
                LineString::from(vec![(-102.60, 32.31), (-102.50, 32.31)]),
            ),
            (
                "SH 115".to_string(),
                LineString::from(vec![(-102.58, 32.25), (-102.58, 32.40)]),
            ),
            (
                "CR 500".to_string(),
                LineString::from(vec![(-102.45, 32.25), (-102.45, 32.40)]),
            ),
        ]))
    }

    /// A network with just two east-west parallel roads `offset_m` apart.
    fn parallel_network(offset_m: f64) -> Arc<RoadNetwork> {
        let offset_deg = offset_m / DEG_LAT_M;
        Arc::new(RoadNetwork::from_named_lines(vec![
            (
                "CR 201".to_string(),
                LineString::from(vec![(-102.60, 32.20), (-102.50, 32.20)]),
            ),
            (
                "CR 203".to_string(),
                LineString::from(vec![(-102.60, 32.20 + offset_deg), (-102.50, 32.20 + offset_deg)]),
            ),
        ]))
    }

    fn ticket(street: &str, intersection: &str) -> Ticket {
        Ticket {
            ticket_number: "T1".to_string(),
            street: Some(street.to_string()),
            intersection: Some(intersection.to_string()),
            city: Some("Andrews".to_string()),
            county: Some("Andrews".to_string()),
            ticket_type: Some("Normal".to_string()),
            ..Ticket::default()
        }
    }

    #[test]
    fn clean_intersection_uses_the_crossing() {
        let geocoder = ProximityGeocoder::new(county_network(), cities());
        let outcome = geocoder.geocode(&ticket("US 385", "FM 1788"));

        assert_eq!(outcome.approach, Some(Approach::CorridorMidpoint));
        assert!((outcome.latitude.unwrap() - 32.31).abs() < 1e-9);
        assert!((outcome.longitude.unwrap() - -102.54).abs() < 1e-9);
        assert!((outcome.confidence.unwrap() - 0.85).abs() < 1e-9);
        assert!(outcome.reasoning.contains("US 385"));
        assert!(outcome.reasoning.contains("FM 1788"));
    }

    #[test]
    fn parallel_roads_use_the_closest_approach_midpoint() {
        let geocoder = ProximityGeocoder::new(parallel_network(600.0), cities());
        let outcome = geocoder.geocode(&ticket("CR 201", "CR 203"));

        assert_eq!(outcome.approach, Some(Approach::ClosestPoint));
        // 0.70 at 0 m → 0.55 at 1500 m: 600 m gives 0.64.
        assert!(
            (outcome.confidence.unwrap() - 0.64).abs() < 1e-3,
            "{:?}",
            outcome.confidence
        );
        // Midpoint sits between the two roads.
        let lat = outcome.latitude.unwrap();
        assert!(lat > 32.20 && lat < 32.21);
    }

    #[test]
    fn closest_point_confidence_bottoms_at_the_limit() {
        let geocoder = ProximityGeocoder::new(parallel_network(1499.5), cities());
        let outcome = geocoder.geocode(&ticket("CR 201", "CR 203"));

        assert_eq!(outcome.approach, Some(Approach::ClosestPoint));
        assert!(
            (outcome.confidence.unwrap() - 0.55).abs() < 1e-3,
            "{:?}",
            outcome.confidence
        );
    }

    #[test]
    fn distant_parallel_roads_fall_back_to_the_city() {
        let geocoder = ProximityGeocoder::new(parallel_network(2_000.0), cities());
        let outcome = geocoder.geocode(&ticket("CR 201", "CR 203"));

        assert_eq!(outcome.approach, Some(Approach::CityCentroidFallback));
        assert!((outcome.latitude.unwrap() - CITY_LAT).abs() < 1e-9);
        assert!(outcome.reasoning.contains("apart"));
    }

    #[test]
    fn variant_lookup_reports_the_matched_name() {
        let geocoder = ProximityGeocoder::new(county_network(), cities());
        let outcome = geocoder.geocode(&ticket("HWY 115", "FM 1788"));

        assert!(outcome.succeeded());
        assert!(
            outcome.reasoning.contains("SH 115"),
            "reasoning: {}",
            outcome.reasoning
        );
    }

    #[test]
    fn single_road_snaps_the_city_reference() {
        let geocoder = ProximityGeocoder::new(county_network(), cities());
        let mut t = ticket("US 385", "");
        t.intersection = None;
        let outcome = geocoder.geocode(&t);

        assert_eq!(outcome.approach, Some(Approach::CityPrimary));
        assert!((outcome.confidence.unwrap() - 0.65).abs() < 1e-9);
        // Snapped onto the road, at the city's latitude.
        assert!((outcome.longitude.unwrap() - -102.54).abs() < 1e-9);
        assert!((outcome.latitude.unwrap() - CITY_LAT).abs() < 1e-6);
    }

    #[test]
    fn one_missing_road_still_geocodes_on_the_other() {
        let geocoder = ProximityGeocoder::new(county_network(), cities());
        let outcome = geocoder.geocode(&ticket("US 385", "CR 9999"));

        assert_eq!(outcome.approach, Some(Approach::CityPrimary));
        assert!(
            outcome.reasoning.contains("not found"),
            "reasoning: {}",
            outcome.reasoning
        );
    }

    #[test]
    fn snap_beyond_the_limit_falls_back() {
        let geocoder = ProximityGeocoder::new(county_network(), cities());
        let mut t = ticket("CR 500", "");
        t.intersection = None;
        let outcome = geocoder.geocode(&t);

        // CR 500 runs ~9 km east of the city reference.
        assert_eq!(outcome.approach, Some(Approach::CityCentroidFallback));
        assert!(outcome.reasoning.contains("snap limit"));
    }

    #[test]
    fn emergency_fallback_keeps_its_bonus() {
        let geocoder = ProximityGeocoder::new(county_network(), cities());
        let mut t = ticket("FRYING PAN RANCH RD", "P15");
        t.ticket_type = Some("Emergency".to_string());
        let outcome = geocoder.geocode(&t);

        assert_eq!(outcome.approach, Some(Approach::CityCentroidFallback));
        // 0.35 base + 0.05 emergency.
        assert!((outcome.confidence.unwrap() - 0.40).abs() < 1e-9);
        assert!((outcome.latitude.unwrap() - CITY_LAT).abs() < 1e-9);
        assert!(outcome.reasoning.contains("not found"));
    }

    #[test]
    fn no_city_reference_exhausts_every_strategy() {
        let geocoder = ProximityGeocoder::new(county_network(), cities());
        let mut t = ticket("FRYING PAN RANCH RD", "P15");
        t.city = Some("Notrees".to_string());
        t.county = Some("Ector".to_string());
        let outcome = geocoder.geocode(&t);

        assert!(!outcome.succeeded());
        assert_eq!(outcome.approach, None);
        assert_eq!(outcome.confidence, Some(0.0));
        assert!(outcome.error_message.is_some());
        assert!(outcome.reasoning.contains("\"FRYING PAN RANCH RD\" not found"));
        assert!(outcome.reasoning.contains("\"P15\" not found"));
    }

    #[test]
    fn pipeline_boost_raises_confidence_near_the_line() {
        // Pipeline running along US 385.
        let pipeline = Arc::new(PipelineProximityAnalyzer::new(
            GeometryIndex::from_linestrings(&[LineString::from(vec![
                (-102.54, 32.25),
                (-102.54, 32.40),
            ])])
            .unwrap(),
            DEFAULT_BOOST_RADIUS_M,
        ));
        let geocoder = ProximityGeocoder::new(county_network(), cities()).with_pipeline(pipeline);

        let mut t = ticket("US 385", "");
        t.intersection = None;
        let outcome = geocoder.geocode(&t);

        // 0.65 city-primary + 0.15 boost.
        assert!((outcome.confidence.unwrap() - 0.80).abs() < 1e-9);
        assert!(outcome.metadata.contains_key("pipeline_distance_m"));
    }

    #[test]
    fn multiple_crossings_pick_the_one_nearest_the_city() {
        // A winding road that crosses US 385 twice: once near the city,
        // once far south.
        let network = Arc::new(RoadNetwork::from_named_lines(vec![
            (
                "US 385".to_string(),
                LineString::from(vec![(-102.54, 32.10), (-102.54, 32.40)]),
            ),
            (
                "FM 181".to_string(),
                LineString::from(vec![
                    (-102.60, 32.32),
                    (-102.50, 32.32),
                    (-102.50, 32.12),
                    (-102.60, 32.12),
                ]),
            ),
        ]));
        let geocoder = ProximityGeocoder::new(network, cities());
        let outcome = geocoder.geocode(&ticket("US 385", "FM 181"));

        assert_eq!(outcome.approach, Some(Approach::CorridorMidpoint));
        // The 32.32 crossing is ~150 m from the city; 32.12 is ~22 km away.
        assert!((outcome.latitude.unwrap() - 32.32).abs() < 1e-9);
        assert!(outcome.reasoning.contains("nearest the city reference"));
    }
}
