//! Topic subscriptions multiplexed over one socket.
//!
//! The [`ChannelRegistry`] owns the subscription table. Callers hold only a
//! [`SubscriptionHandle`]; the table entry itself never leaves the registry.
//!
//! # Lifecycle
//!
//! ```text
//! subscribe ─► Pending ─(connected)─► Joining ─(ok)─► Joined
//!                                        │              │
//!                                     (error)     (close/error)
//!                                        ▼              ▼
//!                                     Errored ◄─────────┘
//!
//! any state ─(transport drop)─► Pending ─(reconnect)─► Joining (fresh ref)
//! ```
//!
//! The first listener on a topic triggers the `phx_join`; later listeners
//! share it. The last `unsubscribe` sends `phx_leave` and drops the entry.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | [`ChannelRegistry`] and dispatch |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::identifiers::SubscriptionId;
use crate::protocol::STREAM_DATA;

// ============================================================================
// Submodules
// ============================================================================

/// Subscription table and inbound dispatch.
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use registry::ChannelRegistry;

// ============================================================================
// ChannelEvent
// ============================================================================

/// Logical event delivered to a topic listener.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The join succeeded. Carries the reply `response`.
    Joined(Value),

    /// The server rejected the join. Carries the reply `response`.
    ///
    /// Not retried until the next reconnect.
    JoinFailed(Value),

    /// A feature event the listener asked for.
    Message {
        /// Event name, e.g. `stream_data`.
        event: String,
        /// Event payload.
        payload: Value,
    },

    /// The server reported `phx_error` for the channel.
    Errored(Value),

    /// The server closed the channel with `phx_close`.
    Closed,

    /// The transport dropped; the topic will be rejoined on reconnect.
    Rejoining,
}

/// Listener callback.
///
/// Runs on a task owned by the listener, one event at a time, in arrival
/// order for the topic.
pub type ChannelHandler = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

// ============================================================================
// TopicRequest
// ============================================================================

/// What a listener wants to join and hear.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRequest {
    /// Topic to join.
    pub topic: String,

    /// Payload sent with `phx_join`.
    pub join_payload: Value,

    /// Feature event forwarded to the listener as [`ChannelEvent::Message`].
    pub event: String,
}

impl TopicRequest {
    /// Creates a request for an explicit feature event.
    #[must_use]
    pub fn new(topic: impl Into<String>, join_payload: Value, event: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            join_payload,
            event: event.into(),
        }
    }

    /// Creates a request listening for `stream_data`.
    #[must_use]
    pub fn stream_data(topic: impl Into<String>, join_payload: Value) -> Self {
        Self::new(topic, join_payload, STREAM_DATA)
    }
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Weak reference to one listener on a topic.
///
/// Holding a handle keeps nothing alive. Pass it to
/// [`ChannelRegistry::unsubscribe`] to stop delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    topic: String,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId, topic: impl Into<String>) -> Self {
        Self {
            id,
            topic: topic.into(),
        }
    }

    /// Returns the listener ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the topic this handle listens on.
    #[inline]
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.topic)
    }
}

// ============================================================================
// SubscriptionState
// ============================================================================

/// Join state of a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Waiting for a connection before joining.
    Pending,
    /// `phx_join` sent, reply outstanding.
    Joining {
        /// Ref of the outstanding join.
        join_ref: String,
    },
    /// Joined.
    Joined {
        /// Ref of the accepted join.
        join_ref: String,
    },
    /// Join rejected or channel failed. Rejoined on the next reconnect.
    Errored,
}

impl SubscriptionState {
    /// Returns the ref of the current join attempt, if any.
    #[must_use]
    pub fn join_ref(&self) -> Option<&str> {
        match self {
            Self::Joining { join_ref } | Self::Joined { join_ref } => Some(join_ref),
            Self::Pending | Self::Errored => None,
        }
    }

    /// Returns `true` once the server accepted the join.
    #[inline]
    #[must_use]
    pub fn is_joined(&self) -> bool {
        matches!(self, Self::Joined { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
