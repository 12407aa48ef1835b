//! Socket transport layer.
//!
//! This module owns the single multiplexed connection to the streaming
//! backend and everything needed to keep it alive.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   SocketCommand    ┌──────────────┐    Link     ┌──────────┐
//! │ ChannelRegistry  │───────────────────►│ Socket actor │◄──────────►│  Server  │
//! │                  │◄───────────────────│ (tokio task) │  Connector  │          │
//! └──────────────────┘    SocketEvent     └──────────────┘             └──────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Socket::spawn` - Start the actor, which connects through a [`Connector`]
//! 2. `SocketEvent::Connected` - Link is up, heartbeats start
//! 3. `SocketEvent::Disconnected` - Link dropped, reconnect with [`Backoff`]
//! 4. `Socket::shutdown` - Close the link and stop reconnecting
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | Reconnect delay policy |
//! | `connector` | [`Connector`] seam and the WebSocket implementation |
//! | `memory` | In-process connector for tests |
//! | `socket` | Socket actor and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect delay policy.
pub mod backoff;

/// Connection seam and WebSocket connector.
pub mod connector;

/// In-process connector/server pair.
pub mod memory;

/// Socket actor and event loop.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::Backoff;
pub use connector::{Connector, FrameSink, FrameStream, Link, WsConnector};
pub use memory::{MemoryConnector, MemoryPeer, MemoryServer};
pub use socket::{ConnectionState, Socket, SocketConfig, SocketEvent};
