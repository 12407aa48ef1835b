//! Cached snapshot plus live stream, as one current state.
//!
//! A [`Reconciled`] value subscribes to a channel and publishes the best
//! state it knows through a [`watch`] channel:
//!
//! | Source | When |
//! |--------|------|
//! | [`Source::Cached`] | Loaded from disk at start, no live data yet |
//! | [`Source::Live`] | Built from the stream |
//! | [`Source::Stale`] | Was live, the transport dropped, no fresh data yet |
//!
//! Every live state is written through to the cache by one writer task, in
//! order, skipping intermediate states when it falls behind. A cache read
//! or write failure behaves like a cold cache.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::cache::{CacheStore, Category};
use crate::channel::{ChannelRegistry, SubscriptionHandle};
use crate::stream::{
    self, Alerts, AlertsStreamDataResponse, PredictionsByStopJoinResponse, PredictionsForStops,
    PredictionsForStopsV2, PredictionsStreamDataResponse, StreamChannel, StreamEvent,
    TripPredictions, VehiclesOnRoute, VehiclesStreamDataResponse,
};

// ============================================================================
// Snapshot
// ============================================================================

/// Where a snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Restored from the cache.
    Cached,
    /// Received on the stream since the last (re)join.
    Live,
    /// Received live before the transport dropped.
    Stale,
}

/// One published state.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<S> {
    /// The reconciled channel state.
    pub value: S,
    /// Whether the value came from the cache or the stream.
    pub source: Source,
    /// When the value was received, or written to the cache.
    pub updated_at: SystemTime,
}

impl<S> Snapshot<S> {
    fn live(value: S) -> Self {
        Self {
            value,
            source: Source::Live,
            updated_at: SystemTime::now(),
        }
    }

    /// Returns `true` if the value is older than `age`.
    #[must_use]
    pub fn is_older_than(&self, age: Duration) -> bool {
        self.updated_at
            .elapsed()
            .is_ok_and(|elapsed| elapsed > age)
    }
}

// ============================================================================
// Reconcile
// ============================================================================

/// How a channel's events fold into a cacheable state.
pub trait Reconcile: StreamChannel + Clone {
    /// State published and cached.
    type State: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Cache category. Defaults to [`Category::Cache`].
    fn cache_category(&self) -> Category {
        Category::Cache
    }

    /// Cache group shared by all requests of this channel.
    fn cache_group(&self) -> &'static str;

    /// Cache entry name for this request.
    fn cache_name(&self) -> String;

    /// Folds an event into the current state.
    ///
    /// Returns `None` to keep the current state. Never called with
    /// [`StreamEvent::Rejoining`].
    fn apply(
        &self,
        current: Option<&Self::State>,
        event: StreamEvent<Self::Join, Self::Message>,
    ) -> Option<Self::State>;
}

// ============================================================================
// Reconciled
// ============================================================================

/// A live subscription folded into one observable state.
pub struct Reconciled<S> {
    handle: SubscriptionHandle,
    state: watch::Receiver<Option<Snapshot<S>>>,
}

impl<S> fmt::Debug for Reconciled<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciled")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<S> Reconciled<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Subscribes to `channel` and starts the cold-start load and the
    /// cache writer.
    pub fn start<C>(registry: &ChannelRegistry, store: CacheStore, channel: C) -> Self
    where
        C: Reconcile<State = S>,
    {
        let (state_tx, state) = watch::channel(None);
        let state_tx = Arc::new(state_tx);
        let (write_tx, write_rx) = mpsc::unbounded_channel::<S>();

        let category = channel.cache_category();
        let group = channel.cache_group();
        let name = channel.cache_name();

        tokio::spawn(run_writer::<S>(
            store.clone(),
            category,
            group,
            name.clone(),
            write_rx,
        ));

        tokio::spawn(load_cached::<S>(
            store,
            category,
            group,
            name,
            Arc::clone(&state_tx),
        ));

        let folder = channel.clone();
        let handle = stream::subscribe(registry, channel, move |event| match event {
            Ok(StreamEvent::Rejoining) => {
                state_tx.send_if_modified(|snapshot| match snapshot {
                    Some(current) if current.source == Source::Live => {
                        current.source = Source::Stale;
                        true
                    }
                    _ => false,
                });
            }
            Ok(event) => {
                state_tx.send_if_modified(|snapshot| {
                    let current = snapshot.as_ref().map(|s| &s.value);
                    match folder.apply(current, event) {
                        Some(next) => {
                            let _ = write_tx.send(next.clone());
                            *snapshot = Some(Snapshot::live(next));
                            true
                        }
                        None => false,
                    }
                });
            }
            Err(e) => {
                warn!(topic = %folder.topic(), error = %e, "Stream event not applied");
            }
        });

        Self { handle, state }
    }

    /// Returns the subscription handle. Unsubscribe it to stop.
    #[inline]
    #[must_use]
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Returns the current snapshot, if any.
    #[must_use]
    pub fn current(&self) -> Option<Snapshot<S>> {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes every published snapshot.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<Snapshot<S>>> {
        self.state.clone()
    }
}

/// Loads the cached state unless live data already arrived.
async fn load_cached<S>(
    store: CacheStore,
    category: Category,
    group: &'static str,
    name: String,
    state_tx: Arc<watch::Sender<Option<Snapshot<S>>>>,
) where
    S: DeserializeOwned + Send + Sync + 'static,
{
    let Some(value) = store.read::<S>(category, Some(group), &name).await else {
        trace!(group, name = %name, "No cached snapshot");
        return;
    };
    let updated_at = store
        .modified_at(category, Some(group), &name)
        .await
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let loaded = state_tx.send_if_modified(|snapshot| {
        if snapshot.is_some() {
            return false;
        }
        *snapshot = Some(Snapshot {
            value,
            source: Source::Cached,
            updated_at,
        });
        true
    });

    if loaded {
        debug!(group, name = %name, "Cached snapshot restored");
    }
}

/// Writes live states to the cache, newest first when behind.
async fn run_writer<S>(
    store: CacheStore,
    category: Category,
    group: &'static str,
    name: String,
    mut rx: mpsc::UnboundedReceiver<S>,
) where
    S: Serialize + Send + Sync + 'static,
{
    while let Some(mut value) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            value = newer;
        }
        if !store.write(category, Some(group), &name, &value).await {
            debug!(group, name = %name, "Snapshot not cached");
        }
    }
    trace!(group, name = %name, "Cache writer stopped");
}

// ============================================================================
// Channel Implementations
// ============================================================================

/// Longest id list kept as-is in a cache name.
const MAX_READABLE_IDS: usize = 64;

/// Order-independent cache key for a set of ids.
///
/// Ids are sorted and deduplicated. A list longer than
/// [`MAX_READABLE_IDS`], or one holding a path separator or NUL, is
/// replaced by its SHA-256 hex digest so the file name stays bounded.
fn ids_key<S: AsRef<str>>(ids: &[S]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let joined = sorted.join(",");

    if joined.len() <= MAX_READABLE_IDS && !joined.contains(['/', '\\', '\0']) {
        return joined;
    }
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Reconcile for PredictionsForStops {
    type State = PredictionsStreamDataResponse;

    fn cache_group(&self) -> &'static str {
        "predictions"
    }

    fn cache_name(&self) -> String {
        format!("stops-{}", ids_key(&self.stop_ids))
    }

    fn apply(
        &self,
        _current: Option<&Self::State>,
        event: StreamEvent<Self::Join, Self::Message>,
    ) -> Option<Self::State> {
        match event {
            StreamEvent::Joined(data) | StreamEvent::Message(data) => Some(data),
            StreamEvent::Rejoining => None,
        }
    }
}

impl Reconcile for PredictionsForStopsV2 {
    type State = PredictionsByStopJoinResponse;

    fn cache_group(&self) -> &'static str {
        "predictions"
    }

    fn cache_name(&self) -> String {
        format!("stops-v2-{}", ids_key(&self.stop_ids))
    }

    fn apply(
        &self,
        current: Option<&Self::State>,
        event: StreamEvent<Self::Join, Self::Message>,
    ) -> Option<Self::State> {
        match event {
            StreamEvent::Joined(data) => Some(data),
            StreamEvent::Message(update) => Some(
                current
                    .cloned()
                    .unwrap_or_default()
                    .merge_predictions(&update),
            ),
            StreamEvent::Rejoining => None,
        }
    }
}

impl Reconcile for TripPredictions {
    type State = PredictionsStreamDataResponse;

    fn cache_group(&self) -> &'static str {
        "predictions"
    }

    fn cache_name(&self) -> String {
        format!("trip-{}", ids_key(&[&self.trip_id]))
    }

    fn apply(
        &self,
        _current: Option<&Self::State>,
        event: StreamEvent<Self::Join, Self::Message>,
    ) -> Option<Self::State> {
        match event {
            StreamEvent::Joined(data) | StreamEvent::Message(data) => Some(data),
            StreamEvent::Rejoining => None,
        }
    }
}

impl Reconcile for VehiclesOnRoute {
    type State = VehiclesStreamDataResponse;

    fn cache_group(&self) -> &'static str {
        "vehicles"
    }

    fn cache_name(&self) -> String {
        format!("routes-{}-{}", ids_key(&self.route_ids), self.direction_id)
    }

    fn apply(
        &self,
        _current: Option<&Self::State>,
        event: StreamEvent<Self::Join, Self::Message>,
    ) -> Option<Self::State> {
        match event {
            StreamEvent::Joined(data) | StreamEvent::Message(data) => Some(data),
            StreamEvent::Rejoining => None,
        }
    }
}

impl Reconcile for Alerts {
    type State = AlertsStreamDataResponse;

    fn cache_group(&self) -> &'static str {
        "alerts"
    }

    fn cache_name(&self) -> String {
        "current".to_string()
    }

    fn apply(
        &self,
        _current: Option<&Self::State>,
        event: StreamEvent<Self::Join, Self::Message>,
    ) -> Option<Self::State> {
        match event {
            StreamEvent::Joined(data) | StreamEvent::Message(data) => Some(data),
            StreamEvent::Rejoining => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
