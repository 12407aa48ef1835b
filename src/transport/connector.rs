//! Socket primitive seam.
//!
//! The socket actor never touches a concrete network type. It asks a
//! [`Connector`] for a [`Link`]: a sink of outbound text frames and a stream
//! of inbound text frames. [`WsConnector`] provides the production
//! WebSocket link; [`super::memory`] provides an in-process one for tests.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures_util::future;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Types
// ============================================================================

/// Outbound half of a link. One item is one text frame.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Inbound half of a link. The stream ends when the peer goes away.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One physical connection, split into its two halves.
pub struct Link {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames.
    pub stream: FrameStream,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").finish_non_exhaustive()
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens physical connections on behalf of the socket actor.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a new link to `url`.
    ///
    /// # Errors
    ///
    /// Returns a connection error if the link cannot be established.
    async fn connect(&self, url: &Url) -> Result<Link>;
}

// ============================================================================
// WsConnector
// ============================================================================

/// WebSocket connector backed by `tokio-tungstenite`.
///
/// Only text frames are surfaced; ping/pong is answered by tungstenite and
/// binary frames are ignored. A close frame ends the link.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Link> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection(format!("WebSocket handshake failed: {e}")))?;

        debug!(%url, "WebSocket handshake completed");

        let (ws_write, ws_read) = ws_stream.split();

        let sink = ws_write
            .sink_map_err(Error::from)
            .with(|text: String| future::ready(Ok::<_, Error>(Message::Text(text.into()))));

        let stream = ws_read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Close(_)) => Some(Err(Error::ConnectionClosed)),
                // Binary, Ping, Pong
                Ok(_) => None,
                Err(e) => Some(Err(Error::from(e))),
            })
        });

        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
