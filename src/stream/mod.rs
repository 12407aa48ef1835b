//! Typed per-feature channels.
//!
//! A [`StreamChannel`] turns a typed request (stop IDs, a trip ID, ...) into
//! the generic topic and join payload, and turns generic payload JSON back
//! into typed responses. It holds no socket state.
//!
//! # Example
//!
//! ```ignore
//! use transit_stream::stream::{PredictionsForStops, StreamEvent};
//!
//! let channel = PredictionsForStops::new(["place-sstat", "place-dwnxg"]);
//! let handle = client.subscribe_stream(channel, |event| match event {
//!     Ok(StreamEvent::Joined(data) | StreamEvent::Message(data)) => {
//!         println!("{} predictions", data.prediction_quantity());
//!     }
//!     Ok(StreamEvent::Rejoining) => {}
//!     Err(e) => eprintln!("{e}"),
//! });
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channels` | Channel catalogue |
//! | `model` | Domain records and responses |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;

use crate::channel::{ChannelEvent, ChannelHandler, ChannelRegistry, SubscriptionHandle, TopicRequest};
use crate::error::{Error, Result};
use crate::protocol::STREAM_DATA;

// ============================================================================
// Submodules
// ============================================================================

/// Channel catalogue.
pub mod channels;

/// Domain records and responses.
pub mod model;

// ============================================================================
// Re-exports
// ============================================================================

pub use channels::{
    Alerts, PredictionsForStops, PredictionsForStopsV2, TripPredictions, VehiclesOnRoute,
};
pub use model::{
    ActivePeriod, Alert, AlertsStreamDataResponse, Carriage, CurrentStatus, InformedEntity,
    Prediction, PredictionsByStopJoinResponse, PredictionsByStopMessageResponse,
    PredictionsStreamDataResponse, ScheduleRelationship, Trip, Vehicle, VehiclesStreamDataResponse,
};

// ============================================================================
// StreamEvent
// ============================================================================

/// Typed event delivered to a stream callback.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<J, M> {
    /// Join accepted; carries the parsed join reply.
    Joined(J),
    /// Feature event; carries the parsed payload.
    Message(M),
    /// Transport dropped; a rejoin follows on reconnect.
    Rejoining,
}

/// Result handed to stream callbacks.
pub type StreamResult<C> =
    Result<StreamEvent<<C as StreamChannel>::Join, <C as StreamChannel>::Message>>;

// ============================================================================
// StreamChannel
// ============================================================================

/// Translation between a typed feature request and the generic channel.
pub trait StreamChannel: Send + Sync + 'static {
    /// Parsed join reply.
    type Join: DeserializeOwned + Send + 'static;

    /// Parsed feature event payload.
    type Message: DeserializeOwned + Send + 'static;

    /// Topic to join.
    fn topic(&self) -> String;

    /// Payload sent with the join.
    fn join_payload(&self) -> Value {
        json!({})
    }

    /// Feature event carrying data.
    fn data_event(&self) -> &'static str {
        STREAM_DATA
    }

    /// Parses a join reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the response does not match [`Self::Join`].
    fn parse_join(&self, response: Value) -> Result<Self::Join> {
        parse_payload(&self.topic(), response)
    }

    /// Parses a feature event payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the payload does not match [`Self::Message`].
    fn parse_message(&self, payload: Value) -> Result<Self::Message> {
        parse_payload(&self.topic(), payload)
    }

    /// Returns the generic request for this channel.
    fn request(&self) -> TopicRequest {
        TopicRequest::new(self.topic(), self.join_payload(), self.data_event())
    }
}

/// Deserializes a payload, tagging failures with the topic.
///
/// # Errors
///
/// Returns [`Error::Parse`] on schema mismatch.
pub fn parse_payload<T: DeserializeOwned>(topic: &str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| Error::parse(topic, &e))
}

// ============================================================================
// Subscription Adapter
// ============================================================================

/// Maps one generic channel event to a typed one.
///
/// Join rejections, channel failures and schema mismatches become errors.
pub fn translate<C: StreamChannel>(channel: &C, event: ChannelEvent) -> StreamResult<C> {
    match event {
        ChannelEvent::Joined(response) => channel.parse_join(response).map(StreamEvent::Joined),
        ChannelEvent::Message { payload, .. } => {
            channel.parse_message(payload).map(StreamEvent::Message)
        }
        ChannelEvent::JoinFailed(response) => Err(Error::join_rejected(channel.topic(), response)),
        ChannelEvent::Errored(_) | ChannelEvent::Closed => {
            Err(Error::channel_failure(channel.topic()))
        }
        ChannelEvent::Rejoining => Ok(StreamEvent::Rejoining),
    }
}

/// Subscribes a typed callback to `channel`.
pub fn subscribe<C, F>(registry: &ChannelRegistry, channel: C, on_event: F) -> SubscriptionHandle
where
    C: StreamChannel,
    F: Fn(StreamResult<C>) + Send + Sync + 'static,
{
    let request = channel.request();
    let handler: ChannelHandler = Arc::new(move |event: ChannelEvent| {
        let result = translate(&channel, event);
        if let Err(e) = &result
            && e.is_parse_error()
        {
            warn!(error = %e, "Stream payload did not match its schema");
        }
        on_event(result);
    });

    registry.subscribe(request, handler)
}

// ============================================================================
// Tests
// ============================================================================
