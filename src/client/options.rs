//! Client tuning options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use transit_stream::ClientOptions;
//!
//! let options = ClientOptions::new()
//!     .with_heartbeat_interval(Duration::from_secs(15))
//!     .with_param("client_version", "2.4.0");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::cache::CachePaths;
use crate::error::{Error, Result};
use crate::transport::backoff::{DEFAULT_BASE, DEFAULT_MAX};
use crate::transport::socket::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_INBOUND_CAPACITY,
};
use crate::transport::{Backoff, SocketConfig};

// ============================================================================
// ClientOptions
// ============================================================================

/// Socket timing, queueing, connect parameters and cache location.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Period between heartbeats while connected.
    pub heartbeat_interval: Duration,

    /// Time allowed for one connect attempt.
    pub connect_timeout: Duration,

    /// Reconnect delay policy.
    pub backoff: Backoff,

    /// Capacity of the inbound event queue.
    pub inbound_capacity: usize,

    /// Extra query parameters sent when connecting.
    pub params: Vec<(String, String)>,

    /// Cache roots. `None` resolves the platform directories at build time.
    pub cache_paths: Option<CachePaths>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            backoff: Backoff::new(DEFAULT_BASE, DEFAULT_MAX),
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            params: Vec::new(),
            cache_paths: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the heartbeat period.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    #[inline]
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the inbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    /// Adds a connect query parameter.
    #[inline]
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Sets explicit cache roots.
    #[inline]
    #[must_use]
    pub fn with_cache_paths(mut self, paths: CachePaths) -> Self {
        self.cache_paths = Some(paths);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(Error::config("heartbeat_interval must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect_timeout must be greater than zero"));
        }
        if self.inbound_capacity == 0 {
            return Err(Error::config("inbound_capacity must be at least 1"));
        }
        if self.backoff.base.is_zero() || self.backoff.max < self.backoff.base {
            return Err(Error::config(
                "backoff base must be non-zero and not exceed backoff max",
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(Error::config("backoff jitter must be within 0.0..=1.0"));
        }
        if let Some((key, _)) = self.params.iter().find(|(key, _)| key.is_empty()) {
            return Err(Error::config(format!("connect parameter key is empty: {key:?}")));
        }
        Ok(())
    }

    /// Returns the socket configuration part.
    #[must_use]
    pub fn socket_config(&self) -> SocketConfig {
        SocketConfig {
            heartbeat_interval: self.heartbeat_interval,
            connect_timeout: self.connect_timeout,
            backoff: self.backoff,
            inbound_capacity: self.inbound_capacity,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(options.inbound_capacity, 256);
        assert_eq!(options.backoff, Backoff::default());
        assert!(options.params.is_empty());
        assert!(options.cache_paths.is_none());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let options = ClientOptions::new()
            .with_heartbeat_interval(Duration::from_secs(5))
            .with_inbound_capacity(8)
            .with_param("token", "abc")
            .with_cache_paths(CachePaths::under("/tmp/x"));

        assert_eq!(options.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(options.inbound_capacity, 8);
        assert_eq!(options.params, vec![("token".to_string(), "abc".to_string())]);
        assert!(options.cache_paths.is_some());

        let socket = options.socket_config();
        assert_eq!(socket.inbound_capacity, 8);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(ClientOptions::new()
            .with_heartbeat_interval(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ClientOptions::new()
            .with_inbound_capacity(0)
            .validate()
            .is_err());
        assert!(ClientOptions::new()
            .with_backoff(Backoff::new(Duration::from_secs(10), Duration::from_secs(1)))
            .validate()
            .is_err());
        assert!(ClientOptions::new().with_param("", "x").validate().is_err());
    }
}
