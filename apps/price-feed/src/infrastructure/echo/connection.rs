//! Echo Connection Manager
//!
//! Owns the WebSocket connection to the echo endpoint.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──connect()──► Connecting ──ok──► Open ──disconnect() / transport failure──► Closed
//!                          │                                                        │
//!                          └──────────────err──────────► Closed ◄───────connect()───┘
//! ```
//!
//! The write half stays with the manager. The read half moves into a
//! spawned receive loop that decodes frames and reports price batches and
//! the end of the connection through an event channel. Every connection
//! gets a new session number so events from a connection that has already
//! been replaced or closed can be told apart and ignored.
//!
//! There is no automatic reconnect and no heartbeat: a stalled connection
//! stays open until the transport itself fails.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, JsonCodec};
use super::messages::WireMessage;
use crate::domain::price::{ConnectionState, PriceBatch};
use crate::infrastructure::broadcast::PriceHub;
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur on the echo connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Side channel notified of connection and send failures.
pub type ErrorCallback = Arc<dyn Fn(&ConnectionError) + Send + Sync>;

// =============================================================================
// Connection Events
// =============================================================================

/// Events emitted by the receive loop.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A decoded price batch arrived.
    Prices {
        /// Connection the batch arrived on.
        session: u64,
        /// Records in the batch.
        payload: PriceBatch,
    },
    /// The transport failed or the peer closed the connection.
    Closed {
        /// Connection that ended.
        session: u64,
        /// Human-readable cause.
        reason: String,
    },
}

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Never connected.
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Connection open, receive loop running.
    Open,
    /// Connection closed or failed.
    Closed,
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Manages the duplex connection to the echo endpoint.
pub struct ConnectionManager {
    url: String,
    codec: JsonCodec,
    hub: Arc<PriceHub>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    on_error: Option<ErrorCallback>,
    phase: ConnectionPhase,
    session: u64,
    writer: Option<WsSink>,
    reader_cancel: Option<CancellationToken>,
}

impl ConnectionManager {
    /// Create a manager for the given endpoint.
    ///
    /// Connection state transitions are published on `hub`; receive loop
    /// events are delivered on `event_tx`.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        hub: Arc<PriceHub>,
        event_tx: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            codec: JsonCodec::new(),
            hub,
            event_tx,
            on_error: None,
            phase: ConnectionPhase::Idle,
            session: 0,
            writer: None,
            reader_cancel: None,
        }
    }

    /// Register the error side channel.
    #[must_use]
    pub fn with_error_callback(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Whether the connection is open.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.phase, ConnectionPhase::Open)
    }

    /// Number of the current (or last) connection.
    #[must_use]
    pub const fn session(&self) -> u64 {
        self.session
    }

    /// Whether an event from `session` belongs to the open connection.
    #[must_use]
    pub const fn accepts(&self, session: u64) -> bool {
        self.is_open() && session == self.session
    }

    /// Open the connection and start the receive loop.
    ///
    /// Does nothing if the connection is already open or connecting.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket handshake fails. The state is
    /// then `Disconnected` and the error has been passed to the callback.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        if matches!(
            self.phase,
            ConnectionPhase::Open | ConnectionPhase::Connecting
        ) {
            return Ok(());
        }

        self.phase = ConnectionPhase::Connecting;
        tracing::info!(url = %self.url, "Connecting to echo endpoint");

        let ws_stream = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                let error = ConnectionError::from(e);
                tracing::warn!(url = %self.url, error = %error, "Echo connection failed");

                self.phase = ConnectionPhase::Closed;
                self.publish_state(ConnectionState::Disconnected);
                self.report(&error);
                return Err(error);
            }
        };

        let (write, read) = ws_stream.split();

        self.session += 1;
        let cancel = CancellationToken::new();
        tokio::spawn(receive_loop(
            read,
            self.codec.clone(),
            self.session,
            self.event_tx.clone(),
            cancel.clone(),
        ));

        self.writer = Some(write);
        self.reader_cancel = Some(cancel);
        self.phase = ConnectionPhase::Open;
        self.publish_state(ConnectionState::Connected);

        tracing::info!(session = self.session, "Echo connection open");
        Ok(())
    }

    /// Encode and write one message.
    ///
    /// Returns `true` if the frame was written. Nothing is written while
    /// the connection is not open. Encode and write failures are logged and
    /// passed to the error callback; the message is not retried.
    pub async fn send(&mut self, message: &WireMessage) -> bool {
        let kind = message.kind();

        let Some(writer) = self.writer.as_mut() else {
            tracing::trace!(
                message_type = kind.as_str(),
                "Not connected, dropping outbound message"
            );
            return false;
        };

        let text = match self.codec.encode(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(message_type = kind.as_str(), error = %e, "Failed to encode message");
                metrics::record_send_error("encode");
                return false;
            }
        };

        let result = writer.send(Message::Text(text.into())).await;

        match result {
            Ok(()) => {
                metrics::record_frame_sent(kind);
                tracing::trace!(message_type = kind.as_str(), "Frame sent");
                true
            }
            Err(e) => {
                let error = ConnectionError::from(e);
                tracing::warn!(message_type = kind.as_str(), error = %error, "Failed to send frame");
                metrics::record_send_error("write");
                self.report(&error);
                false
            }
        }
    }

    /// Close the connection with a normal-closure frame.
    ///
    /// Safe to call at any time, including before the first `connect()`.
    pub async fn disconnect(&mut self) {
        if let Some(cancel) = self.reader_cancel.take() {
            cancel.cancel();
        }

        if let Some(mut writer) = self.writer.take() {
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            };

            if let Err(e) = writer.send(Message::Close(Some(frame))).await {
                tracing::debug!(error = %e, "Close frame not delivered");
            }
            let _ = writer.close().await;

            tracing::info!(session = self.session, "Echo connection closed");
        }

        if self.phase != ConnectionPhase::Idle {
            self.phase = ConnectionPhase::Closed;
        }
        self.publish_state(ConnectionState::Disconnected);
    }

    /// Handle the end of a receive loop.
    ///
    /// Returns `true` if the event belonged to the open connection, which
    /// is then released. Events from older sessions are ignored.
    pub fn handle_closed(&mut self, session: u64, reason: &str) -> bool {
        if !self.accepts(session) {
            tracing::trace!(session, "Ignoring close of stale connection");
            return false;
        }

        tracing::warn!(session, reason, "Echo connection lost");

        self.writer = None;
        self.reader_cancel = None;
        self.phase = ConnectionPhase::Closed;
        self.publish_state(ConnectionState::Disconnected);
        true
    }

    fn publish_state(&self, state: ConnectionState) {
        if self.hub.set_connection_state(state) {
            metrics::set_connected(state.is_connected());
            tracing::debug!(state = state.as_str(), "Connection state changed");
        }
    }

    fn report(&self, error: &ConnectionError) {
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }
}

// =============================================================================
// Receive Loop
// =============================================================================

/// Read frames until cancelled or the transport ends.
async fn receive_loop(
    mut read: SplitStream<WsStream>,
    codec: JsonCodec,
    session: u64,
    event_tx: mpsc::Sender<ConnectionEvent>,
    cancel: CancellationToken,
) {
    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(payload) = dispatch_frame(&codec, &text) {
                            let event = ConnectionEvent::Prices { session, payload };
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or_else(
                            || "peer closed the connection".to_string(),
                            |f| format!("peer closed the connection ({})", f.code),
                        );
                    }
                    Some(Ok(_)) => {
                        // Ping/pong are answered by tungstenite; binary frames are not part of the protocol
                    }
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_string(),
                }
            }
        }
    };

    let _ = event_tx.send(ConnectionEvent::Closed { session, reason }).await;
}

/// Decode one text frame, returning its records if it is a price batch.
fn dispatch_frame(codec: &JsonCodec, text: &str) -> Option<PriceBatch> {
    let message = match codec.decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping undecodable frame");
            metrics::record_decode_error();
            return None;
        }
    };

    metrics::record_frame_received(message.kind());

    match message {
        WireMessage::Subscribe { symbols } => {
            tracing::debug!(?symbols, "Subscribe echoed");
            None
        }
        WireMessage::Unsubscribe { symbols } => {
            tracing::debug!(?symbols, "Unsubscribe echoed");
            None
        }
        WireMessage::PriceBatch { payload } => Some(payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PriceRecord;

    fn manager(url: &str) -> (ConnectionManager, mpsc::Receiver<ConnectionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(16);
        let hub = Arc::new(PriceHub::with_defaults());
        (ConnectionManager::new(url, hub, event_tx), event_rx)
    }

    #[test]
    fn dispatch_forwards_price_batches() {
        let codec = JsonCodec::new();
        let text = codec
            .encode(&WireMessage::prices(vec![PriceRecord::new("AAPL", 2.0, 1.0)]))
            .unwrap();

        let payload = dispatch_frame(&codec, &text).unwrap();
        assert_eq!(payload, vec![PriceRecord::new("AAPL", 2.0, 1.0)]);
    }

    #[test]
    fn dispatch_ignores_subscription_echoes() {
        let codec = JsonCodec::new();
        let text = codec
            .encode(&WireMessage::subscribe(vec!["AAPL".to_string()]))
            .unwrap();

        assert!(dispatch_frame(&codec, &text).is_none());
    }

    #[test]
    fn dispatch_drops_malformed_frames() {
        let codec = JsonCodec::new();
        assert!(dispatch_frame(&codec, "not json").is_none());
        assert!(dispatch_frame(&codec, r#"{"type":"bogus"}"#).is_none());
    }

    #[test]
    fn new_manager_is_idle() {
        let (manager, _rx) = manager("ws://127.0.0.1:9");
        assert_eq!(manager.phase(), ConnectionPhase::Idle);
        assert!(!manager.is_open());
        assert_eq!(manager.session(), 0);
        assert!(!manager.accepts(0));
        assert_eq!(manager.url(), "ws://127.0.0.1:9");
    }

    #[tokio::test]
    async fn send_without_connection_is_noop() {
        let (mut manager, _rx) = manager("ws://127.0.0.1:9");
        assert!(!manager.send(&WireMessage::subscribe(vec![])).await);
    }

    #[tokio::test]
    async fn disconnect_before_connect_stays_idle() {
        let (mut manager, _rx) = manager("ws://127.0.0.1:9");

        manager.disconnect().await;
        manager.disconnect().await;

        assert_eq!(manager.phase(), ConnectionPhase::Idle);
    }

    #[tokio::test]
    async fn closed_event_for_unknown_session_is_ignored() {
        let (mut manager, _rx) = manager("ws://127.0.0.1:9");
        assert!(!manager.handle_closed(7, "stale"));
    }
}
