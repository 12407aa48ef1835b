//! Channel protocol message types.
//!
//! This module defines the wire format spoken over the socket.
//!
//! # Frame Layout
//!
//! ```text
//! [joinRef: string|null, ref: string|null, topic: string, event: string, payload: object]
//! ```
//!
//! | Topic | Event | Purpose |
//! |-------|-------|---------|
//! | `phoenix` | `heartbeat` | Liveness ping |
//! | any | `phx_join` / `phx_leave` | Subscribe / unsubscribe |
//! | any | `phx_reply` | Reply to a ref'd request |
//! | any | `phx_error` / `phx_close` | Server-side channel failure |
//! | any | feature event | e.g. `stream_data` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | [`Envelope`] and its codec |
//! | `event` | Reserved names and [`ReplyStatus`] |

// ============================================================================
// Submodules
// ============================================================================

/// Envelope type and wire codec.
pub mod envelope;

/// Reserved topic and event names.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::Envelope;
pub use event::{
    HEARTBEAT, PHOENIX_TOPIC, PHX_CLOSE, PHX_ERROR, PHX_JOIN, PHX_LEAVE, PHX_REPLY, ReplyStatus,
    STREAM_DATA, is_control_event,
};
