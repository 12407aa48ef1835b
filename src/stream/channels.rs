//! Channel catalogue.
//!
//! | Channel | Topic | Join payload |
//! |---------|-------|--------------|
//! | [`PredictionsForStops`] | `predictions:stops` | `{"stop_ids": [...]}` |
//! | [`PredictionsForStopsV2`] | `predictions:stops:v2:<ids>` | `{}` |
//! | [`TripPredictions`] | `predictions:trip:<id>` | `{}` |
//! | [`VehiclesOnRoute`] | `vehicles:routes:<ids>:<direction>` | `{}` |
//! | [`Alerts`] | `alerts` | `{}` |
//!
//! `<ids>` is a comma-joined list. Every channel pushes `stream_data`.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};

use super::StreamChannel;
use super::model::{
    AlertsStreamDataResponse, PredictionsByStopJoinResponse, PredictionsByStopMessageResponse,
    PredictionsStreamDataResponse, VehiclesStreamDataResponse,
};

fn collect_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Into::into).collect()
}

// ============================================================================
// PredictionsForStops
// ============================================================================

/// Flat predictions for a set of stops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionsForStops {
    /// Stops to watch, sent in the join payload.
    pub stop_ids: Vec<String>,
}

impl PredictionsForStops {
    #[must_use]
    pub fn new<I, S>(stop_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stop_ids: collect_ids(stop_ids),
        }
    }
}

impl StreamChannel for PredictionsForStops {
    type Join = PredictionsStreamDataResponse;
    type Message = PredictionsStreamDataResponse;

    fn topic(&self) -> String {
        "predictions:stops".to_string()
    }

    fn join_payload(&self) -> Value {
        json!({ "stop_ids": self.stop_ids })
    }
}

// ============================================================================
// PredictionsForStopsV2
// ============================================================================

/// Per-stop predictions; each push updates one stop.
///
/// Fold pushes into the join reply with
/// [`PredictionsByStopJoinResponse::merge_predictions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionsForStopsV2 {
    /// Stops to watch, encoded in the topic.
    pub stop_ids: Vec<String>,
}

impl PredictionsForStopsV2 {
    #[must_use]
    pub fn new<I, S>(stop_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stop_ids: collect_ids(stop_ids),
        }
    }
}

impl StreamChannel for PredictionsForStopsV2 {
    type Join = PredictionsByStopJoinResponse;
    type Message = PredictionsByStopMessageResponse;

    fn topic(&self) -> String {
        format!("predictions:stops:v2:{}", self.stop_ids.join(","))
    }
}

// ============================================================================
// TripPredictions
// ============================================================================

/// Predictions along one trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripPredictions {
    /// Trip to follow.
    pub trip_id: String,
}

impl TripPredictions {
    #[must_use]
    pub fn new(trip_id: impl Into<String>) -> Self {
        Self {
            trip_id: trip_id.into(),
        }
    }
}

impl StreamChannel for TripPredictions {
    type Join = PredictionsStreamDataResponse;
    type Message = PredictionsStreamDataResponse;

    fn topic(&self) -> String {
        format!("predictions:trip:{}", self.trip_id)
    }
}

// ============================================================================
// VehiclesOnRoute
// ============================================================================

/// Vehicle positions on a set of routes in one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehiclesOnRoute {
    /// Routes to watch.
    pub route_ids: Vec<String>,
    /// Direction of travel, `0` or `1`.
    pub direction_id: u8,
}

impl VehiclesOnRoute {
    #[must_use]
    pub fn new<I, S>(route_ids: I, direction_id: u8) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            route_ids: collect_ids(route_ids),
            direction_id,
        }
    }
}

impl StreamChannel for VehiclesOnRoute {
    type Join = VehiclesStreamDataResponse;
    type Message = VehiclesStreamDataResponse;

    fn topic(&self) -> String {
        format!(
            "vehicles:routes:{}:{}",
            self.route_ids.join(","),
            self.direction_id
        )
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// All service alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Alerts;

impl StreamChannel for Alerts {
    type Join = AlertsStreamDataResponse;
    type Message = AlertsStreamDataResponse;

    fn topic(&self) -> String {
        "alerts".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
