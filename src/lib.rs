//! Transit Stream - real-time channel client with a categorized JSON cache.
//!
//! This library keeps transit data (predictions, vehicle positions, alerts)
//! live over one persistent socket and persists the last-known state so a
//! UI can render something sensible through restarts and disconnects.
//!
//! # Architecture
//!
//! ```text
//! StreamClient
//!  ├── stream      typed channels (topic, join payload, parsing)
//!  │    └── channel     topic registry: join / leave / rejoin, fan-out
//!  │         └── transport   socket actor: connect, heartbeat, backoff
//!  │              └── protocol    envelope codec
//!  ├── reconcile   cached snapshot + live stream → one current state
//!  └── cache       category/group/name → JSON file, atomic writes
//! ```
//!
//! Key design principles:
//!
//! - One socket per [`StreamClient`], owned by a tokio task
//! - Listeners hold handles; the registry owns all subscription state
//! - Transport failures are recovered by reconnecting, never surfaced
//! - Cache failures degrade to a miss, never an error
//!
//! # Quick Start
//!
//! ```no_run
//! use transit_stream::stream::{PredictionsForStops, StreamEvent};
//! use transit_stream::{Result, StreamClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = StreamClient::builder()
//!         .endpoint("wss://backend.example.com/socket")
//!         .build()?;
//!
//!     let handle = client.subscribe_stream(
//!         PredictionsForStops::new(["place-sstat"]),
//!         |event| match event {
//!             Ok(StreamEvent::Joined(data) | StreamEvent::Message(data)) => {
//!                 println!("{} predictions", data.prediction_quantity());
//!             }
//!             Ok(StreamEvent::Rejoining) => println!("reconnecting"),
//!             Err(e) => eprintln!("stream error: {e}"),
//!         },
//!     );
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!     client.unsubscribe(&handle);
//!     client.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | Categorized on-disk JSON cache |
//! | [`channel`] | Topic subscriptions and dispatch |
//! | [`client`] | [`StreamClient`] and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelope and codec |
//! | [`reconcile`] | Cache + live state reconciliation |
//! | [`stream`] | Typed feature channels |
//! | [`transport`] | Socket actor and connectors |

// ============================================================================
// Modules
// ============================================================================

/// Categorized on-disk JSON cache.
pub mod cache;

/// Topic subscriptions multiplexed over one socket.
pub mod channel;

/// Client entry point and configuration.
///
/// Use [`StreamClient::builder()`] to create a configured client.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire envelope and codec.
pub mod protocol;

/// Cached snapshot plus live stream reconciliation.
pub mod reconcile;

/// Typed feature channels and domain records.
pub mod stream;

/// Socket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Cache types
pub use cache::{CachePaths, CacheStore, Category, KeyedCache};

// Channel types
pub use channel::{
    ChannelEvent, ChannelHandler, ChannelRegistry, SubscriptionHandle, SubscriptionState,
    TopicRequest,
};

// Client types
pub use client::{ClientOptions, StreamClient, StreamClientBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RefCounter, SubscriptionId};

// Protocol types
pub use protocol::{Envelope, ReplyStatus};

// Reconciliation types
pub use reconcile::{Reconcile, Reconciled, Snapshot, Source};

// Stream types
pub use stream::{StreamChannel, StreamEvent, StreamResult};

// Transport types
pub use transport::{Backoff, ConnectionState, Connector, WsConnector};
