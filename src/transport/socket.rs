//! Socket actor and event loop.
//!
//! The socket owns exactly one physical link at a time and runs a tokio task
//! that handles:
//!
//! - Connecting, and reconnecting with backoff after a drop
//! - Serialized writes of outbound envelopes
//! - Heartbeats on the `phoenix` topic while connected
//! - Decoding inbound frames and queueing them for the registry
//!
//! # State Machine
//!
//! ```text
//! Disconnected → Connecting → Connected → Reconnecting → Connected → ...
//!                                  └──────── shutdown ──────→ Disconnected
//! ```
//!
//! Connection changes travel on the same bounded queue as envelopes, so the
//! consumer observes `Connected`/`Disconnected` in order with the traffic.
//! When the queue is full the read loop waits, which stops reading from the
//! link until the consumer catches up.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, timeout};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::RefCounter;
use crate::protocol::{Envelope, PHOENIX_TOPIC};

use super::backoff::Backoff;
use super::connector::{Connector, FrameSink, FrameStream, Link};

// ============================================================================
// Constants
// ============================================================================

/// Default heartbeat period.
pub(crate) const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default time allowed for one connect attempt.
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the inbound event queue.
pub(crate) const DEFAULT_INBOUND_CAPACITY: usize = 256;

// ============================================================================
// SocketConfig
// ============================================================================

/// Timing and queueing parameters for a [`Socket`].
#[derive(Debug, Clone, PartialEq)]
pub struct SocketConfig {
    /// Period between heartbeats while connected.
    pub heartbeat_interval: Duration,

    /// Time allowed for one connect attempt before it counts as failed.
    pub connect_timeout: Duration,

    /// Reconnect delay policy.
    pub backoff: Backoff,

    /// Capacity of the inbound event queue.
    pub inbound_capacity: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            backoff: Backoff::default(),
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
        }
    }
}

impl SocketConfig {
    /// Returns a copy the event loop can run with.
    ///
    /// Zero durations fall back to their defaults, a zero capacity becomes
    /// one and the backoff jitter is clamped to `0.0..=1.0`.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let heartbeat_interval = if self.heartbeat_interval.is_zero() {
            warn!("Zero heartbeat interval, using the default");
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            self.heartbeat_interval
        };
        let connect_timeout = if self.connect_timeout.is_zero() {
            warn!("Zero connect timeout, using the default");
            DEFAULT_CONNECT_TIMEOUT
        } else {
            self.connect_timeout
        };

        Self {
            heartbeat_interval,
            connect_timeout,
            backoff: self.backoff.sanitized(),
            inbound_capacity: self.inbound_capacity.max(1),
        }
    }
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No link, and none being attempted.
    Disconnected,
    /// First connect attempt in progress.
    Connecting,
    /// Link is up.
    Connected,
    /// Link dropped; waiting for backoff or retrying.
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

// ============================================================================
// SocketEvent
// ============================================================================

/// Item delivered on the inbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// A link came up.
    Connected,
    /// The link dropped. A reconnect is already scheduled.
    Disconnected,
    /// A decoded inbound envelope.
    Envelope(Envelope),
}

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Write an envelope if a link is up.
    Send(Envelope),
    /// Close the link and stop the actor.
    Shutdown,
}

/// Why a connected session ended.
enum LinkExit {
    Dropped,
    Shutdown,
}

// ============================================================================
// Socket
// ============================================================================

/// Handle to the socket actor.
///
/// Cloning shares the same actor. The actor stops on [`Socket::shutdown`],
/// once every handle is dropped, or once the event receiver is dropped.
#[derive(Clone)]
pub struct Socket {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Current lifecycle state (written by the event loop).
    state: Arc<RwLock<ConnectionState>>,
    /// Ref source shared by everything written to this socket.
    refs: RefCounter,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Socket {
    /// Spawns the socket actor and starts connecting to `url`.
    ///
    /// Returns the handle and the inbound event queue.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        url: Url,
        config: SocketConfig,
    ) -> (Self, mpsc::Receiver<SocketEvent>) {
        let config = config.sanitized();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(config.inbound_capacity);
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let refs = RefCounter::new();

        let actor = SocketActor {
            connector,
            url,
            config,
            command_rx,
            events_tx,
            state: Arc::clone(&state),
            refs: refs.clone(),
        };
        tokio::spawn(actor.run());

        (
            Self {
                command_tx,
                state,
                refs,
            },
            events_rx,
        )
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Returns `true` if a link is up.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the ref source for this socket.
    #[inline]
    #[must_use]
    pub fn refs(&self) -> &RefCounter {
        &self.refs
    }

    /// Queues an envelope for writing.
    ///
    /// Writes are serialized by the event loop. An envelope queued while no
    /// link is up is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the actor has stopped.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Send(envelope))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Closes the link and stops reconnecting.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(SocketCommand::Shutdown);
    }
}

// ============================================================================
// SocketActor
// ============================================================================

/// State owned by the event loop task.
struct SocketActor {
    connector: Arc<dyn Connector>,
    url: Url,
    config: SocketConfig,
    command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    events_tx: mpsc::Sender<SocketEvent>,
    state: Arc<RwLock<ConnectionState>>,
    refs: RefCounter,
}

impl SocketActor {
    /// Connect/reconnect loop.
    async fn run(mut self) {
        let mut attempt: u32 = 0;
        let mut ever_connected = false;

        loop {
            self.set_state(if ever_connected {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Connecting
            });

            let link = match self.connect().await {
                ControlFlow::Break(()) => break,
                ControlFlow::Continue(link) => link,
            };

            match link {
                Ok(link) => {
                    info!(url = %self.url, "Socket connected");
                    attempt = 0;
                    ever_connected = true;
                    self.set_state(ConnectionState::Connected);

                    if self.emit(SocketEvent::Connected).await.is_break() {
                        break;
                    }

                    match self.run_connected(link.sink, link.stream).await {
                        LinkExit::Shutdown => break,
                        LinkExit::Dropped => {
                            self.set_state(ConnectionState::Reconnecting);
                            if self.emit(SocketEvent::Disconnected).await.is_break() {
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, attempt, "Socket connect failed");
                }
            }

            let delay = self.config.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");

            if self.wait(delay).await.is_break() {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!("Socket event loop terminated");
    }

    /// Runs one connect attempt while still answering commands.
    ///
    /// Breaks on shutdown.
    async fn connect(&mut self) -> ControlFlow<(), Result<Link>> {
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let connect_timeout = self.config.connect_timeout;

        let connecting = async {
            match timeout(connect_timeout, connector.connect(&url)).await {
                Ok(result) => result,
                Err(_) => Err(Error::connection(format!(
                    "connect timed out after {}ms",
                    connect_timeout.as_millis()
                ))),
            }
        };
        tokio::pin!(connecting);

        loop {
            tokio::select! {
                result = &mut connecting => return ControlFlow::Continue(result),

                command = self.command_rx.recv() => {
                    if self.handle_offline_command(command).is_break() {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
    }

    /// Sleeps for the backoff delay while still answering commands.
    ///
    /// Breaks on shutdown.
    async fn wait(&mut self, delay: Duration) -> ControlFlow<()> {
        let sleeping = sleep(delay);
        tokio::pin!(sleeping);

        loop {
            tokio::select! {
                () = &mut sleeping => return ControlFlow::Continue(()),

                command = self.command_rx.recv() => {
                    if self.handle_offline_command(command).is_break() {
                        return ControlFlow::Break(());
                    }
                }
            }
        }
    }

    /// Handles a command received while no link is up.
    fn handle_offline_command(&self, command: Option<SocketCommand>) -> ControlFlow<()> {
        match command {
            Some(SocketCommand::Send(envelope)) => {
                debug!(
                    topic = %envelope.topic,
                    event = %envelope.event,
                    "Dropping envelope queued while disconnected"
                );
                ControlFlow::Continue(())
            }
            Some(SocketCommand::Shutdown) => {
                debug!("Shutdown command received");
                ControlFlow::Break(())
            }
            None => {
                debug!("Command channel closed");
                ControlFlow::Break(())
            }
        }
    }

    /// Event loop for one live link.
    async fn run_connected(&mut self, mut sink: FrameSink, mut stream: FrameStream) -> LinkExit {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Incoming frames from the server
                frame = stream.next() => {
                    match frame {
                        Some(Ok(text)) => {
                            if self.handle_incoming_frame(&text).await.is_break() {
                                let _ = sink.close().await;
                                return LinkExit::Shutdown;
                            }
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "Socket read failed");
                            return LinkExit::Dropped;
                        }

                        None => {
                            warn!("Socket closed by remote");
                            return LinkExit::Dropped;
                        }
                    }
                }

                // Commands from the registry
                command = self.command_rx.recv() => {
                    match command {
                        Some(SocketCommand::Send(envelope)) => {
                            if let Err(e) = Self::write(&mut sink, &envelope).await {
                                warn!(error = %e, topic = %envelope.topic, "Socket write failed");
                                return LinkExit::Dropped;
                            }
                        }

                        Some(SocketCommand::Shutdown) | None => {
                            debug!("Closing socket");
                            let _ = sink.close().await;
                            return LinkExit::Shutdown;
                        }
                    }
                }

                _ = heartbeat.tick() => {
                    let envelope = Envelope::heartbeat(self.refs.next());
                    if let Err(e) = Self::write(&mut sink, &envelope).await {
                        warn!(error = %e, "Heartbeat failed, link is down");
                        return LinkExit::Dropped;
                    }
                }
            }
        }
    }

    /// Decodes one inbound frame and forwards it.
    ///
    /// Bad frames are logged and dropped without touching the link.
    async fn handle_incoming_frame(&self, text: &str) -> ControlFlow<()> {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, frame = %text, "Discarding malformed frame");
                return ControlFlow::Continue(());
            }
        };

        if envelope.topic == PHOENIX_TOPIC {
            trace!(message_ref = %envelope.message_ref, "Heartbeat acknowledged");
            return ControlFlow::Continue(());
        }

        self.emit(SocketEvent::Envelope(envelope)).await
    }

    /// Encodes and writes one envelope.
    async fn write(sink: &mut FrameSink, envelope: &Envelope) -> Result<()> {
        let text = envelope.encode()?;
        sink.send(text).await?;
        trace!(topic = %envelope.topic, event = %envelope.event, "Frame sent");
        Ok(())
    }

    /// Queues an event for the consumer. Breaks if the consumer is gone.
    async fn emit(&self, event: SocketEvent) -> ControlFlow<()> {
        match self.events_tx.send(event).await {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => {
                debug!("Socket event receiver dropped");
                ControlFlow::Break(())
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let mut guard = self.state.write();
        if *guard != state {
            trace!(from = %*guard, to = %state, "Socket state changed");
            *guard = state;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::memory;

    fn test_url() -> Url {
        Url::parse("ws://memory/socket/websocket").expect("url")
    }

    fn fast_config() -> SocketConfig {
        SocketConfig {
            heartbeat_interval: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(1),
            backoff: Backoff::new(Duration::from_millis(1), Duration::from_millis(5)),
            inbound_capacity: 16,
        }
    }

    async fn next_event(events: &mut mpsc::Receiver<SocketEvent>) -> SocketEvent {
        timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event in time")
            .expect("socket alive")
    }

    #[test]
    fn test_default_config() {
        let config = SocketConfig::default();
        assert_eq!(config.heartbeat_interval.as_secs(), 30);
        assert_eq!(config.connect_timeout.as_secs(), 10);
        assert_eq!(config.inbound_capacity, 256);
    }

    #[tokio::test]
    async fn test_connects_and_forwards_envelopes() {
        let (connector, mut server) = memory::pair();
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), fast_config());

        let peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);
        assert!(socket.is_connected());

        peer.send_frame(r#"["1",null,"alerts","stream_data",{"alerts":{}}]"#)
            .expect("push");

        match next_event(&mut events).await {
            SocketEvent::Envelope(envelope) => {
                assert_eq!(envelope.topic, "alerts");
                assert_eq!(envelope.payload, json!({"alerts": {}}));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped_without_disconnect() {
        let (connector, mut server) = memory::pair();
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), fast_config());

        let peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        peer.send_frame("[1, 2]").expect("push");
        peer.send_frame("garbage").expect("push");
        peer.send_frame(r#"[null,null,"alerts","stream_data",{}]"#)
            .expect("push");

        match next_event(&mut events).await {
            SocketEvent::Envelope(envelope) => assert_eq!(envelope.topic, "alerts"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(socket.is_connected());

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_writes_are_delivered_in_order() {
        let (connector, mut server) = memory::pair();
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), fast_config());

        let mut peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        socket
            .send(Envelope::join("a", "1", json!({})))
            .expect("send");
        socket
            .send(Envelope::join("b", "2", json!({})))
            .expect("send");

        assert_eq!(peer.next_envelope().await.expect("first").topic, "a");
        assert_eq!(peer.next_envelope().await.expect("second").topic, "b");

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_heartbeat_is_sent_on_interval() {
        let (connector, mut server) = memory::pair();
        let config = SocketConfig {
            heartbeat_interval: Duration::from_millis(20),
            ..fast_config()
        };
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), config);

        let mut peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        let frame = timeout(Duration::from_secs(2), peer.recv_frame())
            .await
            .expect("heartbeat in time")
            .expect("frame");
        let envelope = Envelope::decode(&frame).expect("decode");
        assert_eq!(envelope.topic, PHOENIX_TOPIC);
        assert_eq!(envelope.event, "heartbeat");
        assert!(!envelope.message_ref.is_empty());

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_reconnects_after_drop() {
        let (connector, mut server) = memory::pair();
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), fast_config());

        let peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        drop(peer);
        assert_eq!(next_event(&mut events).await, SocketEvent::Disconnected);

        let _peer = server.accept().await.expect("re-accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);
        assert_eq!(server.connect_attempts(), 2);

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_failed_heartbeat_write_reconnects() {
        let (connector, mut server) = memory::pair();
        let config = SocketConfig {
            heartbeat_interval: Duration::from_millis(20),
            ..fast_config()
        };
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), config);

        let mut peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        // The read side stays open; only the heartbeat write can notice.
        peer.close_inbound();
        assert_eq!(next_event(&mut events).await, SocketEvent::Disconnected);

        let _peer = server.accept().await.expect("re-accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);
        assert_eq!(server.connect_attempts(), 2);
        drop(peer);

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_failed_send_reconnects() {
        let (connector, mut server) = memory::pair();
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), fast_config());

        let mut peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        peer.close_inbound();
        socket
            .send(Envelope::join("alerts", "1", json!({})))
            .expect("queued");
        assert_eq!(next_event(&mut events).await, SocketEvent::Disconnected);

        let mut peer = server.accept().await.expect("re-accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        socket
            .send(Envelope::join("alerts", "2", json!({})))
            .expect("send");
        assert_eq!(peer.next_envelope().await.expect("join").message_ref, "2");

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_unusable_config_is_sanitized() {
        let mut backoff = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        backoff.jitter = f64::NAN;
        let config = SocketConfig {
            heartbeat_interval: Duration::ZERO,
            connect_timeout: Duration::ZERO,
            backoff,
            inbound_capacity: 0,
        }
        .sanitized();
        assert_eq!(config.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.inbound_capacity, 1);
        assert_eq!(config.backoff.jitter, 0.0);

        let (connector, mut server) = memory::pair();
        server.refuse_next(2);
        let mut raw = Backoff::new(Duration::from_millis(1), Duration::from_millis(5));
        raw.jitter = 4.0;
        let unsanitized = SocketConfig {
            heartbeat_interval: Duration::ZERO,
            backoff: raw,
            ..fast_config()
        };
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), unsanitized);

        let _peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);
        assert_eq!(server.connect_attempts(), 3);

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_retries_refused_connects() {
        let (connector, mut server) = memory::pair();
        server.refuse_next(3);
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), fast_config());

        let _peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);
        assert_eq!(server.connect_attempts(), 4);

        socket.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_actor() {
        let (connector, mut server) = memory::pair();
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), fast_config());

        let _peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        socket.shutdown();
        let closed = timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("actor stops in time");
        assert!(closed.is_none());
        assert_eq!(socket.state(), ConnectionState::Disconnected);
        assert!(socket.send(Envelope::heartbeat("1")).is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_replies_are_consumed() {
        let (connector, mut server) = memory::pair();
        let (socket, mut events) = Socket::spawn(Arc::new(connector), test_url(), fast_config());

        let peer = server.accept().await.expect("accept");
        assert_eq!(next_event(&mut events).await, SocketEvent::Connected);

        peer.send_frame(r#"[null,"1","phoenix","phx_reply",{"status":"ok","response":{}}]"#)
            .expect("push");
        peer.send_frame(r#"[null,null,"alerts","stream_data",{}]"#)
            .expect("push");

        match next_event(&mut events).await {
            SocketEvent::Envelope(envelope) => assert_eq!(envelope.topic, "alerts"),
            other => panic!("unexpected event: {other:?}"),
        }

        socket.shutdown();
    }
}
