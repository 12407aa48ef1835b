//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`StreamClient`]
//! instances.
//!
//! # Example
//!
//! ```ignore
//! use transit_stream::StreamClient;
//!
//! let client = StreamClient::builder()
//!     .endpoint("wss://backend.example.com/socket")
//!     .app_name("transit-app")
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::cache::CachePaths;
use crate::error::{Error, Result};
use crate::transport::{Connector, WsConnector};

use super::core::StreamClient;
use super::options::ClientOptions;

// ============================================================================
// Constants
// ============================================================================

/// Path segment the socket endpoint must end with.
const WEBSOCKET_SEGMENT: &str = "websocket";

/// Serializer version query parameter.
const VSN_PARAM: &str = "vsn";

/// Serializer version spoken by this client.
const VSN: &str = "2.0.0";

/// Cache directory name used when none is configured.
const DEFAULT_APP_NAME: &str = "transit-stream";

// ============================================================================
// StreamClientBuilder
// ============================================================================

/// Builder for configuring a [`StreamClient`].
///
/// Use [`StreamClient::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct StreamClientBuilder {
    /// Socket endpoint, e.g. `wss://host/socket`.
    endpoint: Option<String>,
    /// Tuning options.
    options: ClientOptions,
    /// Connection factory. Defaults to [`WsConnector`].
    connector: Option<Arc<dyn Connector>>,
    /// Directory name for platform cache roots.
    app_name: Option<String>,
}

impl fmt::Debug for StreamClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClientBuilder")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("custom_connector", &self.connector.is_some())
            .field("app_name", &self.app_name)
            .finish()
    }
}

// ============================================================================
// StreamClientBuilder Implementation
// ============================================================================

impl StreamClientBuilder {
    /// Creates a new builder with no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the socket endpoint.
    ///
    /// `http`/`https` are accepted and mapped to `ws`/`wss`. The path gets
    /// a `/websocket` suffix if it lacks one.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces all tuning options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Adds a connect query parameter.
    #[inline]
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options = self.options.with_param(key, value);
        self
    }

    /// Sets explicit cache roots.
    #[inline]
    #[must_use]
    pub fn cache_paths(mut self, paths: CachePaths) -> Self {
        self.options = self.options.with_cache_paths(paths);
        self
    }

    /// Sets the directory name used under the platform cache/data roots.
    #[inline]
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Replaces the connection factory.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Builds the client and starts connecting.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is missing or not a socket URL
    /// - [`Error::Config`] if an option is invalid
    /// - [`Error::Config`] if no cache roots are set and the platform has none
    pub fn build(self) -> Result<StreamClient> {
        let url = self.validate_endpoint()?;
        self.options.validate()?;
        let cache_paths = self.resolve_cache_paths()?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector));

        Ok(StreamClient::new(url, &self.options, connector, cache_paths))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl StreamClientBuilder {
    /// Validates and normalizes the endpoint.
    fn validate_endpoint(&self) -> Result<Url> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            Error::config(
                "Socket endpoint is required. Use .endpoint() to set it.\n\
                 Example: StreamClient::builder().endpoint(\"wss://host/socket\")",
            )
        })?;

        socket_url(endpoint, &self.options.params)
    }

    fn resolve_cache_paths(&self) -> Result<CachePaths> {
        match &self.options.cache_paths {
            Some(paths) => Ok(paths.clone()),
            None => CachePaths::for_app(self.app_name.as_deref().unwrap_or(DEFAULT_APP_NAME)),
        }
    }
}

/// Builds the connect URL from an endpoint and extra parameters.
///
/// # Errors
///
/// Returns [`Error::Config`] if `endpoint` is not a `ws`, `wss`, `http` or
/// `https` URL.
pub fn socket_url(endpoint: &str, params: &[(String, String)]) -> Result<Url> {
    let mut url = Url::parse(endpoint)
        .map_err(|e| Error::config(format!("Invalid socket endpoint {endpoint:?}: {e}")))?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(Error::config(format!(
                "Unsupported socket scheme {other:?}, expected ws or wss"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::config(format!("Cannot use scheme {scheme} for {endpoint}")))?;

    let path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with(&format!("/{WEBSOCKET_SEGMENT}")) {
        url.set_path(&format!("{path}/{WEBSOCKET_SEGMENT}"));
    }

    let has_vsn = url.query_pairs().any(|(key, _)| key == VSN_PARAM);
    {
        let mut query = url.query_pairs_mut();
        if !has_vsn {
            query.append_pair(VSN_PARAM, VSN);
        }
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }

    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn test_new_creates_empty_builder() {
        let builder = StreamClientBuilder::new();
        assert!(builder.endpoint.is_none());
        assert!(builder.connector.is_none());
        assert_eq!(builder.options, ClientOptions::default());
    }

    #[test]
    fn test_missing_endpoint_is_config_error() {
        let err = StreamClientBuilder::new()
            .validate_endpoint()
            .expect_err("endpoint required");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_socket_url_appends_suffix_and_version() {
        let url = socket_url("wss://backend.example.com/socket", &[]).expect("url");
        assert_eq!(
            url.as_str(),
            "wss://backend.example.com/socket/websocket?vsn=2.0.0"
        );
    }

    #[test]
    fn test_socket_url_keeps_existing_suffix() {
        let url = socket_url("ws://localhost:4000/socket/websocket/", &[]).expect("url");
        assert_eq!(url.path(), "/socket/websocket");
    }

    #[test]
    fn test_socket_url_maps_http_schemes_and_params() {
        let params = vec![("token".to_string(), "a b".to_string())];
        let url = socket_url("https://host/socket?vsn=1.0.0", &params).expect("url");
        assert_eq!(url.scheme(), "wss");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("vsn".to_string(), "1.0.0".to_string()),
                ("token".to_string(), "a b".to_string()),
            ]
        );
    }

    #[test]
    fn test_socket_url_rejects_other_schemes() {
        assert!(socket_url("ftp://host/socket", &[]).is_err());
        assert!(socket_url("not a url", &[]).is_err());
    }

    #[test]
    fn test_invalid_options_fail_build() {
        let err = StreamClientBuilder::new()
            .endpoint("ws://localhost/socket")
            .options(ClientOptions::new().with_heartbeat_interval(Duration::ZERO))
            .build()
            .expect_err("invalid options");
        assert!(matches!(err, Error::Config { .. }));
    }
}
