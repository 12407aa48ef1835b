//! In-process transport.
//!
//! [`MemoryConnector`] hands every link it opens to a paired
//! [`MemoryServer`], which plays the server side in tests: it sees the
//! frames the client writes and can push frames back or drop the link.
//!
//! # Example
//!
//! ```ignore
//! let (connector, mut server) = memory::pair();
//! let client = StreamClient::builder()
//!     .endpoint("ws://test/socket")
//!     .connector(connector)
//!     .build()?;
//!
//! let mut peer = server.accept().await.expect("client connects");
//! let join = peer.next_envelope().await.expect("join frame");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::{sink, stream};
use tokio::sync::mpsc;
use tracing::{trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Envelope, PHOENIX_TOPIC};

use super::connector::{Connector, Link};

// ============================================================================
// Constructor
// ============================================================================

/// Creates a connected connector/server pair.
#[must_use]
pub fn pair() -> (MemoryConnector, MemoryServer) {
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
    let refusals = Arc::new(AtomicUsize::new(0));
    let attempts = Arc::new(AtomicUsize::new(0));

    let connector = MemoryConnector {
        accepted_tx,
        refusals: Arc::clone(&refusals),
        attempts: Arc::clone(&attempts),
    };
    let server = MemoryServer {
        accepted_rx,
        refusals,
        attempts,
    };

    (connector, server)
}

// ============================================================================
// MemoryConnector
// ============================================================================

/// Client half of an in-process transport.
#[derive(Debug)]
pub struct MemoryConnector {
    accepted_tx: mpsc::UnboundedSender<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<Link> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::connection(format!("{url} refused the connection")));
        }

        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel::<String>();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel::<String>();

        self.accepted_tx
            .send(MemoryPeer {
                inbound: to_server_rx,
                outbound: to_client_tx,
            })
            .map_err(|_| Error::connection("memory server is gone"))?;

        let sink = sink::unfold(to_server_tx, |tx, frame: String| async move {
            tx.send(frame).map_err(|_| Error::ConnectionClosed)?;
            Ok::<_, Error>(tx)
        });

        let stream = stream::unfold(to_client_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (Ok::<_, Error>(frame), rx))
        });

        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

// ============================================================================
// MemoryServer
// ============================================================================

/// Server half of an in-process transport.
#[derive(Debug)]
pub struct MemoryServer {
    accepted_rx: mpsc::UnboundedReceiver<MemoryPeer>,
    refusals: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryServer {
    /// Waits for the client to open the next link.
    ///
    /// Returns `None` once the connector has been dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted_rx.recv().await
    }

    /// Makes the next `count` connect attempts fail.
    pub fn refuse_next(&self, count: usize) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Returns how many connect attempts have been made so far.
    #[inline]
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Server view of one open link.
///
/// Dropping the peer drops the link; the client sees its stream end.
#[derive(Debug)]
pub struct MemoryPeer {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl MemoryPeer {
    /// Receives the next raw frame written by the client.
    pub async fn recv_frame(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Receives the next decodable envelope, skipping heartbeats.
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        while let Some(frame) = self.inbound.recv().await {
            match Envelope::decode(&frame) {
                Ok(envelope) if envelope.topic == PHOENIX_TOPIC => {
                    trace!(frame = %frame, "Skipping control frame");
                }
                Ok(envelope) => return Some(envelope),
                Err(e) => warn!(error = %e, frame = %frame, "Client wrote an undecodable frame"),
            }
        }
        None
    }

    /// Returns an already-buffered envelope without waiting, skipping heartbeats.
    pub fn try_next_envelope(&mut self) -> Option<Envelope> {
        while let Ok(frame) = self.inbound.try_recv() {
            if let Ok(envelope) = Envelope::decode(&frame)
                && envelope.topic != PHOENIX_TOPIC
            {
                return Some(envelope);
            }
        }
        None
    }

    /// Makes every later client write fail while pushes still arrive.
    ///
    /// Frames already written stay readable.
    pub fn close_inbound(&mut self) {
        self.inbound.close();
    }

    /// Pushes a raw frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn send_frame(&self, frame: impl Into<String>) -> Result<()> {
        self.outbound
            .send(frame.into())
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Encodes and pushes an envelope to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client dropped the link.
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        self.send_frame(envelope.encode()?)
    }
}

// ============================================================================
// Tests
// ============================================================================
