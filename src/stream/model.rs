//! Domain records carried by the streaming channels.
//!
//! Field names follow the backend's snake_case JSON. Unknown fields are
//! ignored so the server can add data without breaking older clients.
//! Timestamps stay ISO 8601 strings; nothing in this crate does time math
//! on them.

// ============================================================================
// Imports
// ============================================================================

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

// ============================================================================
// Prediction
// ============================================================================

/// Real-time arrival/departure estimate for one trip at one stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    pub direction_id: u8,
    #[serde(default = "default_true")]
    pub revenue: bool,
    #[serde(default)]
    pub schedule_relationship: ScheduleRelationship,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<u32>,
    pub route_id: String,
    pub stop_id: String,
    pub trip_id: String,
    #[serde(default)]
    pub vehicle_id: Option<String>,
}

/// How a prediction relates to the schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleRelationship {
    Added,
    Cancelled,
    NoData,
    Skipped,
    Unscheduled,
    #[default]
    #[serde(other)]
    Scheduled,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Trip
// ============================================================================

/// One run of a vehicle along a route pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: String,
    pub direction_id: u8,
    pub headsign: String,
    pub route_id: String,
    #[serde(default)]
    pub route_pattern_id: Option<String>,
    #[serde(default)]
    pub shape_id: Option<String>,
    #[serde(default)]
    pub stop_ids: Option<Vec<String>>,
}

// ============================================================================
// Vehicle
// ============================================================================

/// Last reported position of a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    #[serde(default)]
    pub bearing: Option<f64>,
    #[serde(default)]
    pub carriages: Option<Vec<Carriage>>,
    pub current_status: CurrentStatus,
    #[serde(default)]
    pub current_stop_sequence: Option<u32>,
    pub direction_id: u8,
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: String,
    #[serde(default)]
    pub decoration: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub trip_id: Option<String>,
}

/// Where the vehicle is relative to its current stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentStatus {
    IncomingAt,
    StoppedAt,
    InTransitTo,
}

/// One car of a multi-car vehicle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carriage {
    #[serde(default)]
    pub occupancy_status: Option<String>,
    #[serde(default)]
    pub occupancy_percentage: Option<u8>,
    #[serde(default)]
    pub label: Option<String>,
}

// ============================================================================
// Alert
// ============================================================================

/// Service alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub active_period: Vec<ActivePeriod>,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub effect_name: Option<String>,
    #[serde(default)]
    pub header: Option<String>,
    pub informed_entity: Vec<InformedEntity>,
    pub lifecycle: String,
    pub severity: i32,
    pub updated_at: String,
}

/// Interval an alert is in effect. An open end runs until further notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePeriod {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

/// Part of the network an alert applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InformedEntity {
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub direction_id: Option<u8>,
    #[serde(default)]
    pub facility: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub route_type: Option<String>,
    #[serde(default)]
    pub stop: Option<String>,
    #[serde(default)]
    pub trip: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

/// Flat prediction snapshot, keyed by object ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionsStreamDataResponse {
    pub predictions: BTreeMap<String, Prediction>,
    #[serde(default)]
    pub trips: BTreeMap<String, Trip>,
    #[serde(default)]
    pub vehicles: BTreeMap<String, Vehicle>,
}

impl PredictionsStreamDataResponse {
    /// Returns the number of predictions.
    #[inline]
    #[must_use]
    pub fn prediction_quantity(&self) -> usize {
        self.predictions.len()
    }
}

/// Join reply of the per-stop predictions channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionsByStopJoinResponse {
    pub predictions_by_stop: BTreeMap<String, BTreeMap<String, Prediction>>,
    #[serde(default)]
    pub trips: BTreeMap<String, Trip>,
    #[serde(default)]
    pub vehicles: BTreeMap<String, Vehicle>,
}

/// Update for a single stop on the per-stop predictions channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionsByStopMessageResponse {
    pub stop_id: String,
    pub predictions: BTreeMap<String, Prediction>,
    #[serde(default)]
    pub trips: BTreeMap<String, Trip>,
    #[serde(default)]
    pub vehicles: BTreeMap<String, Vehicle>,
}

impl PredictionsByStopJoinResponse {
    /// Applies a single-stop update.
    ///
    /// The stop's predictions are replaced wholesale. Trips and vehicles
    /// from both sides are kept only while some prediction still refers to
    /// them.
    #[must_use]
    pub fn merge_predictions(&self, update: &PredictionsByStopMessageResponse) -> Self {
        let mut predictions_by_stop = self.predictions_by_stop.clone();
        predictions_by_stop.insert(update.stop_id.clone(), update.predictions.clone());

        let mut trip_ids = BTreeSet::new();
        let mut vehicle_ids = BTreeSet::new();
        for prediction in predictions_by_stop.values().flat_map(BTreeMap::values) {
            trip_ids.insert(prediction.trip_id.as_str());
            if let Some(vehicle_id) = &prediction.vehicle_id {
                vehicle_ids.insert(vehicle_id.as_str());
            }
        }

        let trips = self
            .trips
            .iter()
            .chain(&update.trips)
            .filter(|(id, _)| trip_ids.contains(id.as_str()))
            .map(|(id, trip)| (id.clone(), trip.clone()))
            .collect();

        let vehicles = self
            .vehicles
            .iter()
            .chain(&update.vehicles)
            .filter(|(id, _)| vehicle_ids.contains(id.as_str()))
            .map(|(id, vehicle)| (id.clone(), vehicle.clone()))
            .collect();

        Self {
            predictions_by_stop,
            trips,
            vehicles,
        }
    }

    /// Flattens per-stop predictions into one map.
    #[must_use]
    pub fn to_predictions_stream_data_response(&self) -> PredictionsStreamDataResponse {
        PredictionsStreamDataResponse {
            predictions: self
                .predictions_by_stop
                .values()
                .flat_map(|stop| stop.iter().map(|(id, p)| (id.clone(), p.clone())))
                .collect(),
            trips: self.trips.clone(),
            vehicles: self.vehicles.clone(),
        }
    }

    /// Returns the number of predictions across all stops.
    #[must_use]
    pub fn prediction_quantity(&self) -> usize {
        self.predictions_by_stop.values().map(BTreeMap::len).sum()
    }
}

/// Vehicles on a route, keyed by vehicle ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehiclesStreamDataResponse {
    pub vehicles: BTreeMap<String, Vehicle>,
}

/// All current alerts, keyed by alert ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertsStreamDataResponse {
    pub alerts: BTreeMap<String, Alert>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn prediction(id: &str, stop_id: &str, trip_id: &str, vehicle_id: Option<&str>) -> Prediction {
        Prediction {
            id: id.to_string(),
            arrival_time: Some("2024-05-15T09:05:00-04:00".to_string()),
            departure_time: None,
            direction_id: 0,
            revenue: true,
            schedule_relationship: ScheduleRelationship::Scheduled,
            status: None,
            stop_sequence: Some(10),
            route_id: "Red".to_string(),
            stop_id: stop_id.to_string(),
            trip_id: trip_id.to_string(),
            vehicle_id: vehicle_id.map(str::to_string),
        }
    }

    fn trip(id: &str) -> Trip {
        Trip {
            id: id.to_string(),
            direction_id: 0,
            headsign: "Alewife".to_string(),
            route_id: "Red".to_string(),
            route_pattern_id: None,
            shape_id: None,
            stop_ids: None,
        }
    }

    fn vehicle(id: &str) -> Vehicle {
        Vehicle {
            id: id.to_string(),
            bearing: Some(90.0),
            carriages: None,
            current_status: CurrentStatus::StoppedAt,
            current_stop_sequence: Some(10),
            direction_id: 0,
            latitude: 42.35,
            longitude: -71.06,
            updated_at: "2024-05-15T09:00:00-04:00".to_string(),
            decoration: None,
            route_id: Some("Red".to_string()),
            stop_id: Some("1".to_string()),
            trip_id: None,
        }
    }

    fn map<T: Clone>(items: &[(&str, T)]) -> BTreeMap<String, T> {
        items
            .iter()
            .map(|(id, item)| ((*id).to_string(), item.clone()))
            .collect()
    }

    #[test]
    fn test_merge_replaces_stop_predictions() {
        let p1 = prediction("p1", "1", "t1", Some("v1"));
        let mut p1_cancelled = p1.clone();
        p1_cancelled.schedule_relationship = ScheduleRelationship::Cancelled;
        let p2 = prediction("p2", "1", "t1", Some("v1"));
        let p3 = prediction("p3", "2", "t1", Some("v1"));

        let existing = PredictionsByStopJoinResponse {
            predictions_by_stop: map(&[
                ("1", map(&[("p1", p1)])),
                ("2", map(&[("p3", p3.clone())])),
            ]),
            trips: map(&[("t1", trip("t1"))]),
            vehicles: map(&[("v1", vehicle("v1"))]),
        };
        let update = PredictionsByStopMessageResponse {
            stop_id: "1".to_string(),
            predictions: map(&[("p1", p1_cancelled.clone()), ("p2", p2.clone())]),
            trips: BTreeMap::new(),
            vehicles: BTreeMap::new(),
        };

        let merged = existing.merge_predictions(&update);

        assert_eq!(
            merged.predictions_by_stop["1"],
            map(&[("p1", p1_cancelled), ("p2", p2)])
        );
        assert_eq!(merged.predictions_by_stop["2"], map(&[("p3", p3)]));
        assert_eq!(merged.trips, map(&[("t1", trip("t1"))]));
        assert_eq!(merged.vehicles, map(&[("v1", vehicle("v1"))]));
    }

    #[test]
    fn test_merge_drops_unreferenced_trips_and_vehicles() {
        let existing = PredictionsByStopJoinResponse {
            predictions_by_stop: map(&[
                ("1", map(&[("p1", prediction("p1", "1", "t1", Some("v1")))])),
                ("2", map(&[("p2", prediction("p2", "2", "t2", Some("v2")))])),
            ]),
            trips: map(&[("t1", trip("t1")), ("t2", trip("t2"))]),
            vehicles: map(&[("v1", vehicle("v1")), ("v2", vehicle("v2"))]),
        };
        let update = PredictionsByStopMessageResponse {
            stop_id: "1".to_string(),
            ..Default::default()
        };

        let merged = existing.merge_predictions(&update);

        assert!(merged.predictions_by_stop["1"].is_empty());
        assert_eq!(merged.trips, map(&[("t2", trip("t2"))]));
        assert_eq!(merged.vehicles, map(&[("v2", vehicle("v2"))]));
    }

    #[test]
    fn test_merge_adds_new_trips_from_update() {
        let existing = PredictionsByStopJoinResponse::default();
        let update = PredictionsByStopMessageResponse {
            stop_id: "5".to_string(),
            predictions: map(&[("p9", prediction("p9", "5", "t9", None))]),
            trips: map(&[("t9", trip("t9"))]),
            vehicles: map(&[("v9", vehicle("v9"))]),
        };

        let merged = existing.merge_predictions(&update);

        assert_eq!(merged.trips, map(&[("t9", trip("t9"))]));
        assert!(merged.vehicles.is_empty());
    }

    #[test]
    fn test_flatten_and_quantity() {
        let data = PredictionsByStopJoinResponse {
            predictions_by_stop: map(&[
                (
                    "1",
                    map(&[
                        ("a", prediction("a", "1", "t1", None)),
                        ("b", prediction("b", "1", "t1", None)),
                    ]),
                ),
                ("2", map(&[("c", prediction("c", "2", "t1", None))])),
            ]),
            trips: map(&[("t1", trip("t1"))]),
            vehicles: BTreeMap::new(),
        };

        assert_eq!(data.prediction_quantity(), 3);
        let flat = data.to_predictions_stream_data_response();
        assert_eq!(flat.prediction_quantity(), 3);
        assert_eq!(flat.trips.len(), 1);
    }

    #[test]
    fn test_vehicle_parses_backend_shape() {
        let payload = json!({
            "vehicles": {
                "y1886": {
                    "id": "y1886",
                    "bearing": 315,
                    "current_status": "in_transit_to",
                    "current_stop_sequence": 30,
                    "direction_id": 0,
                    "latitude": 42.359901428222656,
                    "longitude": -71.09449005126953,
                    "occupancy_status": "full",
                    "updated_at": "2024-05-15T09:00:00-04:00",
                    "route_id": "1",
                    "stop_id": "99",
                    "trip_id": "61391720",
                    "decoration": "pride",
                    "carriages": [
                        {"occupancy_status": "no_data_available", "occupancy_percentage": null, "label": "1234"},
                        {"occupancy_status": "not_accepting_passengers", "occupancy_percentage": 100, "label": "4321"}
                    ]
                }
            }
        });

        let parsed: VehiclesStreamDataResponse = serde_json::from_value(payload).expect("parse");
        let vehicle = &parsed.vehicles["y1886"];
        assert_eq!(vehicle.bearing, Some(315.0));
        assert_eq!(vehicle.current_status, CurrentStatus::InTransitTo);
        assert_eq!(vehicle.decoration.as_deref(), Some("pride"));
        let carriages = vehicle.carriages.as_ref().expect("carriages");
        assert_eq!(carriages[1].occupancy_percentage, Some(100));
    }

    #[test]
    fn test_unknown_schedule_relationship_defaults_to_scheduled() {
        let parsed: ScheduleRelationship =
            serde_json::from_value(json!("something_new")).expect("parse");
        assert_eq!(parsed, ScheduleRelationship::Scheduled);
    }
}
