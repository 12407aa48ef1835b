//! Error types for the transit stream client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use transit_stream::{Envelope, Result};
//!
//! fn example(text: &str) -> Result<()> {
//!     let envelope = Envelope::decode(text)?;
//!     println!("{}", envelope.topic);
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Transport | [`Error::Connection`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Decode`] |
//! | Channel | [`Error::JoinRejected`], [`Error::ChannelFailure`] |
//! | Schema | [`Error::Parse`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |
//!
//! Transport errors never reach subscribers; the socket recovers them by
//! reconnecting. The cache layer converts its errors into `bool`/`Option`
//! at its boundary.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by the client builder when options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Socket connection failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Socket closed, or the socket actor has shut down.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed wire frame.
    ///
    /// Returned when a frame is not a JSON array of exactly five elements,
    /// or an element has the wrong JSON type.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decoding failure.
        message: String,
    },

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// The server answered a join with `status = "error"`.
    #[error("Join rejected for topic {topic}: {response}")]
    JoinRejected {
        /// Topic whose join was rejected.
        topic: String,
        /// Response carried by the error reply.
        response: Value,
    },

    /// The server reported an unsolicited channel failure or closed the channel.
    #[error("Channel failure on topic {topic}")]
    ChannelFailure {
        /// Topic that failed.
        topic: String,
    },

    // ========================================================================
    // Schema Errors
    // ========================================================================
    /// A payload did not match the expected typed response.
    #[error("Failed to parse payload on {topic}: {message}")]
    Parse {
        /// Topic the payload arrived on.
        topic: String,
        /// Deserializer message.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a join rejected error.
    #[inline]
    pub fn join_rejected(topic: impl Into<String>, response: Value) -> Self {
        Self::JoinRejected {
            topic: topic.into(),
            response,
        }
    }

    /// Creates a channel failure error.
    #[inline]
    pub fn channel_failure(topic: impl Into<String>) -> Self {
        Self::ChannelFailure {
            topic: topic.into(),
        }
    }

    /// Creates a parse error from a deserializer failure.
    #[inline]
    pub fn parse(topic: impl Into<String>, err: &serde_json::Error) -> Self {
        Self::Parse {
            topic: topic.into(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a typed payload parse error.
    #[inline]
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors clear up on their own once the socket reconnects
    /// and the topic is rejoined.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
                | Self::ChannelFailure { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
