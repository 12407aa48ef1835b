//! Reserved topics, event names and reply statuses.
//!
//! | Name | Direction | Purpose |
//! |------|-----------|---------|
//! | `phx_join` | Client → Server | Join a topic |
//! | `phx_leave` | Client → Server | Leave a topic |
//! | `phx_reply` | Server → Client | Reply to a ref'd request |
//! | `phx_error` | Server → Client | Unsolicited channel failure |
//! | `phx_close` | Server → Client | Channel closed by the server |
//! | `heartbeat` | Client → Server | Liveness ping on the `phoenix` topic |
//!
//! Feature events such as `stream_data` are agreed out-of-band per topic.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// Names
// ============================================================================

/// Control topic used for heartbeats.
pub const PHOENIX_TOPIC: &str = "phoenix";

/// Join request.
pub const PHX_JOIN: &str = "phx_join";

/// Leave request.
pub const PHX_LEAVE: &str = "phx_leave";

/// Reply to a request carrying a ref.
pub const PHX_REPLY: &str = "phx_reply";

/// Unsolicited channel-level failure.
pub const PHX_ERROR: &str = "phx_error";

/// Channel closed by the server.
pub const PHX_CLOSE: &str = "phx_close";

/// Liveness ping.
pub const HEARTBEAT: &str = "heartbeat";

/// Push event carrying new data on streaming topics.
pub const STREAM_DATA: &str = "stream_data";

/// Returns `true` for events owned by the channel protocol itself.
#[inline]
#[must_use]
pub fn is_control_event(event: &str) -> bool {
    matches!(
        event,
        PHX_JOIN | PHX_LEAVE | PHX_REPLY | PHX_ERROR | PHX_CLOSE | HEARTBEAT
    )
}

// ============================================================================
// ReplyStatus
// ============================================================================

/// Status of a `phx_reply`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReplyStatus {
    /// Request succeeded.
    Ok,
    /// Request failed.
    Error,
    /// Any other status string the server sent.
    Other(String),
}

impl ReplyStatus {
    /// Parses a wire status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "ok" => Self::Ok,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the wire representation.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Other(status) => status,
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
