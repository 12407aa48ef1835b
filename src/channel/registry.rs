//! Channel registry and inbound dispatch.
//!
//! The registry keeps one entry per topic, reference-counted by listeners.
//! A dispatch task drains the socket's event queue and applies every event
//! to the table under a single lock, so subscribe, unsubscribe and inbound
//! traffic never interleave half-way.
//!
//! Listener callbacks do not run under that lock. Each listener owns a
//! task fed by an unbounded queue; the dispatch task only enqueues.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::identifiers::SubscriptionId;
use crate::protocol::{Envelope, PHX_CLOSE, PHX_ERROR, ReplyStatus};
use crate::transport::{Socket, SocketEvent};

use super::{ChannelEvent, ChannelHandler, SubscriptionHandle, SubscriptionState, TopicRequest};

// ============================================================================
// Listener
// ============================================================================

/// One registered callback.
struct Listener {
    /// Feature event this listener asked for.
    event: String,
    /// Queue feeding the listener task.
    tx: mpsc::UnboundedSender<ChannelEvent>,
    /// Cleared on unsubscribe; the task stops before the next event.
    active: Arc<AtomicBool>,
}

impl Listener {
    /// Spawns the task that runs `handler` for each queued event.
    fn spawn(event: String, handler: ChannelHandler) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ChannelEvent>();
        let active = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&active);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                handler(event);
            }
        });

        Self { event, tx, active }
    }

    fn deliver(&self, event: ChannelEvent) {
        let _ = self.tx.send(event);
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

// ============================================================================
// TopicEntry
// ============================================================================

/// Registry-owned state for one topic.
struct TopicEntry {
    /// Payload used for the next (re)join.
    join_payload: Value,
    state: SubscriptionState,
    /// Response of the last accepted join, replayed to late listeners.
    join_response: Option<Value>,
    /// Response of the last rejected join, replayed while errored.
    join_failure: Option<Value>,
    listeners: FxHashMap<SubscriptionId, Listener>,
}

impl TopicEntry {
    fn new(join_payload: Value) -> Self {
        Self {
            join_payload,
            state: SubscriptionState::Pending,
            join_response: None,
            join_failure: None,
            listeners: FxHashMap::default(),
        }
    }

    fn broadcast(&self, event: &ChannelEvent) {
        for listener in self.listeners.values() {
            listener.deliver(event.clone());
        }
    }

    /// Returns `true` if an inbound `join_ref` belongs to an older join.
    fn is_stale(&self, join_ref: Option<&str>) -> bool {
        match join_ref {
            Some(join_ref) => self.state.join_ref() != Some(join_ref),
            None => false,
        }
    }
}

// ============================================================================
// Table
// ============================================================================

#[derive(Default)]
struct Table {
    topics: FxHashMap<String, TopicEntry>,
    handles: FxHashMap<SubscriptionId, String>,
    /// Last connection state seen by the dispatch task.
    connected: bool,
}

// ============================================================================
// ChannelRegistry
// ============================================================================

/// Tracks topic subscriptions and routes inbound envelopes to listeners.
///
/// Cloning shares the same table.
#[derive(Clone)]
pub struct ChannelRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    socket: Socket,
    table: Mutex<Table>,
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    /// Creates a registry over `socket` and spawns its dispatch task.
    ///
    /// `events` must be the queue returned alongside `socket` by
    /// [`Socket::spawn`].
    #[must_use]
    pub fn new(socket: Socket, mut events: mpsc::Receiver<SocketEvent>) -> Self {
        let inner = Arc::new(RegistryInner {
            socket,
            table: Mutex::new(Table::default()),
        });

        // Weak, so dropping the last registry handle releases the socket.
        let dispatch: Weak<RegistryInner> = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = dispatch.upgrade() else {
                    break;
                };
                inner.handle_socket_event(event);
            }
            if let Some(inner) = dispatch.upgrade() {
                inner.table.lock().connected = false;
            }
            debug!("Channel dispatch terminated");
        });

        Self { inner }
    }

    /// Adds a listener to a topic.
    ///
    /// The first listener on a topic sends `phx_join` (immediately when
    /// connected, otherwise on connect). Later listeners share that join;
    /// their payload replaces the stored one for the next rejoin. A listener
    /// added after the join was accepted receives [`ChannelEvent::Joined`]
    /// with the cached response.
    pub fn subscribe(&self, request: TopicRequest, handler: ChannelHandler) -> SubscriptionHandle {
        let TopicRequest {
            topic,
            join_payload,
            event,
        } = request;

        let id = SubscriptionId::generate();
        let listener = Listener::spawn(event, handler);

        let mut table = self.inner.table.lock();
        let connected = table.connected;
        table.handles.insert(id, topic.clone());

        match table.topics.get_mut(&topic) {
            Some(entry) => {
                trace!(topic = %topic, listener = %id, "Sharing existing join");
                entry.join_payload = join_payload;
                if entry.state.is_joined()
                    && let Some(response) = &entry.join_response
                {
                    listener.deliver(ChannelEvent::Joined(response.clone()));
                } else if entry.state == SubscriptionState::Errored
                    && let Some(failure) = &entry.join_failure
                {
                    listener.deliver(ChannelEvent::JoinFailed(failure.clone()));
                }
                entry.listeners.insert(id, listener);
            }
            None => {
                let mut entry = TopicEntry::new(join_payload);
                entry.listeners.insert(id, listener);
                if connected {
                    self.inner.send_join(&topic, &mut entry);
                } else {
                    debug!(topic = %topic, "Join deferred until connected");
                }
                table.topics.insert(topic.clone(), entry);
            }
        }

        SubscriptionHandle::new(id, topic)
    }

    /// Removes a listener.
    ///
    /// Events already handed to the listener task may still run; nothing
    /// after this call is delivered. Removing the last listener sends
    /// `phx_leave` if connected and drops the topic either way.
    ///
    /// Returns `false` if the handle was not subscribed.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut table = self.inner.table.lock();

        let Some(topic) = table.handles.remove(&handle.id()) else {
            return false;
        };

        let connected = table.connected;
        let Some(entry) = table.topics.get_mut(&topic) else {
            return false;
        };

        if let Some(listener) = entry.listeners.remove(&handle.id()) {
            listener.deactivate();
        }

        if !entry.listeners.is_empty() {
            return true;
        }

        if let Some(entry) = table.topics.remove(&topic) {
            match entry.state.join_ref() {
                Some(join_ref) if connected => {
                    let leave = Envelope::leave(&topic, join_ref, self.inner.socket.refs().next());
                    if let Err(e) = self.inner.socket.send(leave) {
                        debug!(topic = %topic, error = %e, "Leave not sent");
                    }
                    debug!(topic = %topic, "Left topic");
                }
                _ => debug!(topic = %topic, "Removed topic locally"),
            }
        }

        true
    }

    /// Returns `true` while `handle` is registered.
    #[must_use]
    pub fn is_subscribed(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.table.lock().handles.contains_key(&handle.id())
    }

    /// Returns the join state of a topic, if tracked.
    #[must_use]
    pub fn topic_state(&self, topic: &str) -> Option<SubscriptionState> {
        self.inner
            .table
            .lock()
            .topics
            .get(topic)
            .map(|entry| entry.state.clone())
    }

    /// Returns the number of tracked topics.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.table.lock().topics.len()
    }

    /// Returns the number of listeners on a topic.
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .table
            .lock()
            .topics
            .get(topic)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Returns the socket this registry writes to.
    #[inline]
    #[must_use]
    pub fn socket(&self) -> &Socket {
        &self.inner.socket
    }
}

// ============================================================================
// RegistryInner - Dispatch
// ============================================================================

impl RegistryInner {
    /// Allocates a fresh join ref and writes `phx_join` for `entry`.
    fn send_join(&self, topic: &str, entry: &mut TopicEntry) {
        let join_ref = self.socket.refs().next();
        let join = Envelope::join(topic, join_ref.clone(), entry.join_payload.clone());

        debug!(topic = %topic, join_ref = %join_ref, "Joining topic");
        entry.state = SubscriptionState::Joining { join_ref };
        entry.join_response = None;
        entry.join_failure = None;

        if let Err(e) = self.socket.send(join) {
            warn!(topic = %topic, error = %e, "Join not sent");
        }
    }

    fn handle_socket_event(&self, event: SocketEvent) {
        let mut table = self.table.lock();

        match event {
            SocketEvent::Connected => {
                table.connected = true;
                for (topic, entry) in &mut table.topics {
                    self.send_join(topic, entry);
                }
            }

            SocketEvent::Disconnected => {
                table.connected = false;
                for (topic, entry) in &mut table.topics {
                    trace!(topic = %topic, "Marked for rejoin");
                    entry.state = SubscriptionState::Pending;
                    entry.broadcast(&ChannelEvent::Rejoining);
                }
            }

            SocketEvent::Envelope(envelope) => {
                let Some(entry) = table.topics.get_mut(&envelope.topic) else {
                    trace!(topic = %envelope.topic, event = %envelope.event, "No subscription, dropped");
                    return;
                };

                if envelope.is_reply() {
                    Self::handle_reply(entry, envelope);
                } else {
                    Self::handle_push(entry, envelope);
                }
            }
        }
    }

    /// Matches a reply against the topic's outstanding join.
    fn handle_reply(entry: &mut TopicEntry, envelope: Envelope) {
        let join_ref = match &entry.state {
            SubscriptionState::Joining { join_ref } if *join_ref == envelope.message_ref => {
                join_ref.clone()
            }
            _ => {
                trace!(
                    topic = %envelope.topic,
                    message_ref = %envelope.message_ref,
                    "Reply does not match an outstanding join, dropped"
                );
                return;
            }
        };

        let status = envelope.reply_status();
        let topic = envelope.topic.clone();
        let response = envelope.into_data();

        match status {
            Some(ReplyStatus::Ok) => {
                debug!(topic = %topic, join_ref = %join_ref, "Joined topic");
                entry.state = SubscriptionState::Joined { join_ref };
                entry.join_response = Some(response.clone());
                entry.broadcast(&ChannelEvent::Joined(response));
            }
            status => {
                warn!(
                    topic = %topic,
                    status = ?status,
                    "Join rejected, waiting for reconnect"
                );
                entry.state = SubscriptionState::Errored;
                entry.join_failure = Some(response.clone());
                entry.broadcast(&ChannelEvent::JoinFailed(response));
            }
        }
    }

    /// Handles a server push: channel failure, close, or a feature event.
    fn handle_push(entry: &mut TopicEntry, envelope: Envelope) {
        if entry.is_stale(envelope.join_ref.as_deref()) {
            trace!(
                topic = %envelope.topic,
                event = %envelope.event,
                "Message from a previous join, dropped"
            );
            return;
        }

        match envelope.event.as_str() {
            PHX_ERROR => {
                warn!(topic = %envelope.topic, "Channel errored, waiting for reconnect");
                entry.state = SubscriptionState::Errored;
                entry.broadcast(&ChannelEvent::Errored(envelope.payload));
            }

            PHX_CLOSE => {
                debug!(topic = %envelope.topic, "Channel closed by server");
                entry.state = SubscriptionState::Errored;
                entry.broadcast(&ChannelEvent::Closed);
            }

            event => {
                let mut delivered = 0usize;
                for listener in entry.listeners.values().filter(|l| l.event == event) {
                    listener.deliver(ChannelEvent::Message {
                        event: envelope.event.clone(),
                        payload: envelope.payload.clone(),
                    });
                    delivered += 1;
                }
                trace!(topic = %envelope.topic, event = %event, delivered, "Message dispatched");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
