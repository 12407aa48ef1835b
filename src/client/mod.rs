//! Stream client module.
//!
//! This module provides the entry point for streaming and caching.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`StreamClient`] | Owns the socket, registry and cache |
//! | [`StreamClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Timing, queueing and cache options |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Client tuning options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{StreamClientBuilder, socket_url};
pub use self::core::StreamClient;
pub use options::ClientOptions;
