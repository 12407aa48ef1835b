//! Stream client composition root.
//!
//! The [`StreamClient`] owns the one socket, the channel registry over it
//! and the cache store. Nothing else in the crate constructs a transport.
//!
//! # Example
//!
//! ```ignore
//! use transit_stream::{Category, StreamClient};
//! use transit_stream::stream::PredictionsForStops;
//!
//! let client = StreamClient::builder()
//!     .endpoint("wss://backend.example.com/socket")
//!     .build()?;
//!
//! let predictions = client.reconciled(PredictionsForStops::new(["place-sstat"]));
//! let mut updates = predictions.watch();
//! while updates.changed().await.is_ok() {
//!     if let Some(snapshot) = updates.borrow().as_ref() {
//!         println!("{:?}: {}", snapshot.source, snapshot.value.prediction_quantity());
//!     }
//! }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;
use url::Url;

use crate::cache::{CachePaths, CacheStore, Category};
use crate::channel::{ChannelRegistry, SubscriptionHandle};
use crate::reconcile::{Reconcile, Reconciled};
use crate::stream::{self, StreamChannel, StreamResult};
use crate::transport::{ConnectionState, Connector, Socket};

use super::builder::StreamClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the client.
struct ClientInner {
    /// Normalized connect URL.
    url: Url,

    /// Socket actor handle.
    socket: Socket,

    /// Subscription table over the socket.
    registry: ChannelRegistry,

    /// On-disk JSON cache.
    cache: CacheStore,
}

// ============================================================================
// StreamClient
// ============================================================================

/// Real-time stream client with a categorized cache.
///
/// Cloning shares the same socket.
#[derive(Clone)]
pub struct StreamClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamClient")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .field("subscriptions", &self.inner.registry.subscription_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// StreamClient - Construction
// ============================================================================

impl StreamClient {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> StreamClientBuilder {
        StreamClientBuilder::new()
    }

    /// Spawns the socket and registry. Called by the builder after validation.
    pub(crate) fn new(
        url: Url,
        options: &ClientOptions,
        connector: Arc<dyn Connector>,
        cache_paths: CachePaths,
    ) -> Self {
        info!(url = %url, "Starting stream client");

        let (socket, events) = Socket::spawn(connector, url.clone(), options.socket_config());
        let registry = ChannelRegistry::new(socket.clone(), events);

        Self {
            inner: Arc::new(ClientInner {
                url,
                socket,
                registry,
                cache: CacheStore::new(cache_paths),
            }),
        }
    }
}

// ============================================================================
// StreamClient - Streaming
// ============================================================================

impl StreamClient {
    /// Subscribes a typed callback to a feature channel.
    ///
    /// The callback receives the parsed join reply, every parsed feature
    /// event, and `Rejoining` when the transport drops. Join rejection,
    /// channel failure and schema mismatch arrive as errors.
    pub fn subscribe_stream<C, F>(&self, channel: C, on_event: F) -> SubscriptionHandle
    where
        C: StreamChannel,
        F: Fn(StreamResult<C>) + Send + Sync + 'static,
    {
        stream::subscribe(&self.inner.registry, channel, on_event)
    }

    /// Stops delivery to a subscription.
    ///
    /// Returns `false` if the handle was not subscribed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.registry.unsubscribe(handle)
    }

    /// Subscribes to a channel and folds it, with the cache, into one state.
    pub fn reconciled<C: Reconcile>(&self, channel: C) -> Reconciled<C::State> {
        Reconciled::start(&self.inner.registry, self.inner.cache.clone(), channel)
    }
}

// ============================================================================
// StreamClient - Cache
// ============================================================================

impl StreamClient {
    /// Reads a cached document. Any failure is a miss.
    pub async fn read_cached<T>(&self, category: Category, group: Option<&str>, name: &str) -> Option<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.inner.cache.read(category, group, name).await
    }

    /// Writes a document to the cache. Returns `false` on failure.
    pub async fn write_cached<T: Serialize + ?Sized>(
        &self,
        category: Category,
        group: Option<&str>,
        name: &str,
        value: &T,
    ) -> bool {
        self.inner.cache.write(category, group, name, value).await
    }

    /// Deletes a cached document. Returns `false` if it did not exist.
    pub async fn delete_cached(&self, category: Category, group: Option<&str>, name: &str) -> bool {
        self.inner.cache.delete(category, group, name).await
    }

    /// Returns the cache store.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }
}

// ============================================================================
// StreamClient - Connection
// ============================================================================

impl StreamClient {
    /// Returns the normalized connect URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Returns the channel registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry {
        &self.inner.registry
    }

    /// Returns the socket lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.socket.state()
    }

    /// Returns `true` while the socket is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.socket.is_connected()
    }

    /// Closes the socket and stops reconnecting.
    pub fn shutdown(&self) {
        info!(url = %self.inner.url, "Shutting down stream client");
        self.inner.socket.shutdown();
    }
}
