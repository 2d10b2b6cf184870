//! Gateway session
//!
//! Owns one websocket connection and its lifecycle: the hello handshake,
//! identify or resume, the heartbeat loop, sequence tracking and the
//! server-driven control opcodes. A session survives its connections;
//! the resume state (session ID and last sequence) persists across
//! reconnects until the server invalidates it.

use crate::error::GatewayError;
use crate::events::{event_type, EventPayload, EventRouter, GatewayEvent};
use crate::protocol::{
    CloseCode, GatewayFrame, Hello, Identify, OpCode, OutboundFrame, PresenceUpdate, Resume,
    CLOSE_NORMAL, CLOSE_SERVICE_RESTART,
};
use crate::reconnect;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pulse_common::ClientConfig;
use pulse_rest::RestClient;
use serde::Serialize;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// A gateway websocket session
pub struct GatewaySession {
    config: ClientConfig,
    rest: Arc<RestClient>,
    router: Arc<EventRouter>,

    /// Cached gateway URL; fetched from REST once and reused on reconnect
    gateway_url: parking_lot::Mutex<Option<String>>,

    /// Serializes open/close transitions
    state_lock: tokio::sync::Mutex<()>,
    /// Write half of the socket; all outbound frames go through here
    writer: tokio::sync::Mutex<Option<WsSink>>,
    connected: AtomicBool,

    /// Bumped on every successful open; tasks from older connections
    /// compare against it and stand down
    conn_gen: AtomicU64,
    /// Cancels the listen and heartbeat tasks of the current connection
    cancel: parking_lot::Mutex<CancellationToken>,

    /// Resume state
    session_id: parking_lot::Mutex<String>,
    sequence: AtomicU64,

    last_ack: parking_lot::Mutex<Instant>,
}

impl GatewaySession {
    /// Create a session. No connection is made until [`open`](Self::open).
    #[must_use]
    pub fn new(config: ClientConfig, rest: Arc<RestClient>, router: Arc<EventRouter>) -> Arc<Self> {
        Arc::new(Self {
            config,
            rest,
            router,
            gateway_url: parking_lot::Mutex::new(None),
            state_lock: tokio::sync::Mutex::new(()),
            writer: tokio::sync::Mutex::new(None),
            connected: AtomicBool::new(false),
            conn_gen: AtomicU64::new(0),
            cancel: parking_lot::Mutex::new(CancellationToken::new()),
            session_id: parking_lot::Mutex::new(String::new()),
            sequence: AtomicU64::new(0),
            last_ack: parking_lot::Mutex::new(Instant::now()),
        })
    }

    /// The client configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The event router events are delivered through
    #[must_use]
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Whether a connection is currently up
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The session ID, empty until READY arrives
    #[must_use]
    pub fn session_id(&self) -> String {
        self.session_id.lock().clone()
    }

    /// The highest dispatch sequence number seen so far
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Open a websocket connection to the gateway.
    ///
    /// Performs the hello handshake, sends Identify (or Resume when
    /// resume state exists from a previous connection) and starts the
    /// listen and heartbeat tasks. READY, RESUMED and everything after
    /// arrive through the event router.
    pub async fn open(self: &Arc<Self>) -> Result<(), GatewayError> {
        let _state = self.state_lock.lock().await;

        if self.connected.load(Ordering::SeqCst) {
            return Err(GatewayError::AlreadyOpen);
        }
        if let Some([index, count]) = self.config.shard {
            if index >= count {
                return Err(GatewayError::ShardBounds { index, count });
            }
        }

        let url = self.gateway_url().await?;
        tracing::info!(%url, "connecting to gateway");
        let mut request = url.as_str().into_client_request()?;
        request
            .headers_mut()
            .insert("Accept-Encoding", HeaderValue::from_static("zlib"));
        let (stream, _) = match connect_async(request).await {
            Ok(pair) => pair,
            Err(e) => {
                // The cached URL may have gone stale.
                self.gateway_url.lock().take();
                return Err(e.into());
            }
        };
        let (sink, mut source) = stream.split();

        // The server speaks first: the connection opens with hello.
        let hello_frame = read_frame(&mut source).await?;
        if hello_frame.op != OpCode::Hello {
            return Err(GatewayError::Protocol {
                expected: "hello (op 10)",
                got: hello_frame.to_string(),
            });
        }
        let hello: Hello = hello_frame.payload()?;
        let interval = Duration::from_millis(hello.heartbeat_interval);

        *self.writer.lock().await = Some(sink);

        if let Err(e) = self.send_handshake().await {
            self.writer.lock().await.take();
            return Err(e);
        }

        let generation = self.conn_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        *self.last_ack.lock() = Instant::now();
        self.connected.store(true, Ordering::SeqCst);

        // The handshake reply (READY, RESUMED or an invalid-session
        // verdict) is handled inline so open() returns with the session
        // settled.
        match read_frame(&mut source).await {
            Ok(frame) => {
                if frame.op != OpCode::Dispatch {
                    tracing::warn!(%frame, "expected READY or RESUMED after handshake");
                }
                if let Err(e) = self.handle_frame(generation, frame).await {
                    tracing::warn!(error = %e, "error handling handshake reply");
                }
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                self.writer.lock().await.take();
                return Err(e);
            }
        }

        tokio::spawn(Arc::clone(self).listen_loop(generation, source, cancel.clone()));
        tokio::spawn(Arc::clone(self).heartbeat_loop(generation, interval, cancel));

        self.router
            .dispatch(GatewayEvent::synthetic(EventPayload::Connected));
        Ok(())
    }

    /// Close the connection cleanly, keeping resume state so a later
    /// [`open`](Self::open) resumes. A no-op when nothing is open.
    pub async fn close(self: &Arc<Self>) -> Result<(), GatewayError> {
        self.teardown(CLOSE_NORMAL, None).await;
        Ok(())
    }

    /// Disconnect permanently: close the connection and drop resume
    /// state, so the next [`open`](Self::open) starts a fresh session.
    pub async fn shutdown(self: &Arc<Self>) -> Result<(), GatewayError> {
        self.teardown(CLOSE_NORMAL, None).await;
        self.clear_session();
        Ok(())
    }

    /// Send a presence update over the gateway
    pub async fn update_presence(&self, status: &str) -> Result<(), GatewayError> {
        let presence = PresenceUpdate {
            status: status.to_string(),
        };
        if !presence.is_valid_status() {
            return Err(GatewayError::InvalidStatus {
                status: presence.status,
            });
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(GatewayError::NotConnected);
        }
        self.send(OpCode::PresenceUpdate, presence).await
    }

    /// Override the gateway URL, skipping the REST lookup
    pub fn set_gateway_url(&self, url: impl Into<String>) {
        *self.gateway_url.lock() = Some(url.into());
    }

    /// Resolve (and cache) the gateway URL
    async fn gateway_url(&self) -> Result<String, GatewayError> {
        if let Some(url) = self.gateway_url.lock().clone() {
            return Ok(url);
        }
        let url = self.rest.gateway().await?;
        *self.gateway_url.lock() = Some(url.clone());
        Ok(url)
    }

    /// Send Identify for a fresh session, or Resume when resume state exists
    async fn send_handshake(&self) -> Result<(), GatewayError> {
        let session_id = self.session_id.lock().clone();
        let sequence = self.sequence.load(Ordering::SeqCst);

        if session_id.is_empty() && sequence == 0 {
            tracing::info!("identifying new session");
            self.send(OpCode::Identify, Identify::from_config(&self.config))
                .await
        } else {
            tracing::info!(%session_id, sequence, "resuming session");
            self.send(
                OpCode::Resume,
                Resume {
                    token: self.config.token.clone(),
                    session_id,
                    seq: sequence,
                },
            )
            .await
        }
    }

    /// Serialize and send one frame on the socket
    async fn send<T: Serialize>(&self, op: OpCode, payload: T) -> Result<(), GatewayError> {
        debug_assert!(op.is_client_op(), "outbound frame with a server opcode");
        let json = OutboundFrame::new(op, payload).to_json()?;
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) => {
                sink.send(Message::Text(json)).await?;
                Ok(())
            }
            None => Err(GatewayError::NotConnected),
        }
    }

    /// Tear the current connection down.
    ///
    /// When `expected_gen` is given, only acts if that generation is
    /// still the live one; stale tasks pass their own generation so a
    /// connection they no longer own is left alone. Returns whether a
    /// connection was actually closed.
    async fn teardown(self: &Arc<Self>, code: u16, expected_gen: Option<u64>) -> bool {
        let _state = self.state_lock.lock().await;

        if let Some(generation) = expected_gen {
            if self.conn_gen.load(Ordering::SeqCst) != generation {
                return false;
            }
        }
        if !self.connected.swap(false, Ordering::SeqCst) {
            return false;
        }

        self.cancel.lock().cancel();

        if let Some(mut sink) = self.writer.lock().await.take() {
            let frame = CloseFrame {
                code: code.into(),
                reason: Cow::Borrowed(""),
            };
            // The socket may already be gone; teardown errors carry no
            // information worth surfacing.
            sink.send(Message::Close(Some(frame))).await.ok();
            // Grace period for the close frame to flush before the drop.
            tokio::time::sleep(Duration::from_millis(100)).await;
            sink.close().await.ok();
        }

        tracing::info!(code, "gateway connection closed");
        self.router
            .dispatch(GatewayEvent::synthetic(EventPayload::Disconnected));
        true
    }

    /// Drop resume state; the next open will send a fresh Identify
    fn clear_session(&self) {
        self.session_id.lock().clear();
        self.sequence.store(0, Ordering::SeqCst);
    }

    /// Tear down and hand off to the reconnect supervisor
    fn force_reconnect(self: &Arc<Self>, generation: u64, code: u16, immediate: bool) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            if session.teardown(code, Some(generation)).await {
                reconnect::supervise(session, immediate).await;
            }
        });
    }

    /// Read loop for one connection
    async fn listen_loop(
        self: Arc<Self>,
        generation: u64,
        mut source: WsSource,
        cancel: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => return,
                message = source.next() => message,
            };

            let message = match message {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    if self.conn_gen.load(Ordering::SeqCst) == generation {
                        tracing::warn!(error = %e, "gateway socket error");
                        self.force_reconnect(generation, CLOSE_NORMAL, false);
                    }
                    return;
                }
                None => {
                    if self.conn_gen.load(Ordering::SeqCst) == generation {
                        tracing::warn!("gateway socket closed by peer");
                        self.force_reconnect(generation, CLOSE_NORMAL, false);
                    }
                    return;
                }
            };

            let frame = match message {
                Message::Text(text) => GatewayFrame::parse(&text).map_err(GatewayError::from),
                Message::Binary(bytes) => GatewayFrame::parse_compressed(&bytes),
                Message::Close(close) => {
                    self.on_close_frame(generation, close.as_ref().map(|c| u16::from(c.code)));
                    return;
                }
                _ => continue,
            };

            match frame {
                Ok(frame) => {
                    if let Err(e) = self.handle_frame(generation, frame).await {
                        tracing::warn!(error = %e, "error handling gateway frame");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "dropping unparseable gateway frame"),
            }
        }
    }

    /// Server sent a close frame; reconnect unless the code says not to
    fn on_close_frame(self: &Arc<Self>, generation: u64, code: Option<u16>) {
        let recoverable = code
            .and_then(CloseCode::from_u16)
            .is_none_or(CloseCode::is_recoverable);
        tracing::warn!(?code, recoverable, "gateway sent close frame");

        if recoverable {
            self.force_reconnect(generation, CLOSE_NORMAL, false);
        } else {
            let session = Arc::clone(self);
            tokio::spawn(async move {
                session.teardown(CLOSE_NORMAL, Some(generation)).await;
            });
        }
    }

    /// Dispatch one inbound frame by opcode
    async fn handle_frame(
        self: &Arc<Self>,
        generation: u64,
        frame: GatewayFrame,
    ) -> Result<(), GatewayError> {
        tracing::trace!(%frame, "gateway frame");
        match frame.op {
            OpCode::Dispatch => self.handle_dispatch(frame),
            OpCode::Heartbeat => {
                // Server asked for an immediate heartbeat.
                let sequence = self.sequence.load(Ordering::SeqCst);
                self.send(OpCode::Heartbeat, sequence).await?;
            }
            OpCode::HeartbeatAck => {
                *self.last_ack.lock() = Instant::now();
            }
            OpCode::Reconnect => {
                tracing::info!("server requested reconnect");
                self.force_reconnect(generation, CLOSE_SERVICE_RESTART, true);
            }
            OpCode::InvalidSession => {
                let resumable: bool = frame.payload().unwrap_or(false);
                if !resumable {
                    self.clear_session();
                }
                tracing::info!(resumable, "session invalidated, re-identifying");
                self.send(OpCode::Identify, Identify::from_config(&self.config))
                    .await?;
            }
            OpCode::Hello => {
                tracing::debug!("ignoring mid-session hello");
            }
            OpCode::Identify | OpCode::Resume | OpCode::PresenceUpdate => {
                tracing::warn!(op = %frame.op, "server sent a client-only opcode");
            }
        }
        Ok(())
    }

    /// Handle an op 0 dispatch: track the sequence, capture resume
    /// state from READY, decode and deliver
    fn handle_dispatch(self: &Arc<Self>, frame: GatewayFrame) {
        if let Some(sequence) = frame.s {
            // fetch_max keeps the counter monotonic even if frames are
            // handled out of order.
            self.sequence.fetch_max(sequence, Ordering::SeqCst);
        }

        let Some(kind) = frame.t.clone() else {
            tracing::debug!("dispatch frame without event type");
            return;
        };

        let payload = match self.router.decode(&kind, frame.d.as_deref()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(event_type = %kind, error = %e, "dropping undecodable dispatch");
                return;
            }
        };

        if let EventPayload::Ready(ready) = &payload {
            tracing::info!(session_id = %ready.session_id, "session ready");
            *self.session_id.lock() = ready.session_id.clone();
        } else if kind == event_type::RESUMED {
            tracing::info!("session resumed");
        }

        self.router.dispatch(GatewayEvent {
            sequence: frame.s,
            event_type: kind,
            payload,
        });
    }

    /// Heartbeat loop for one connection.
    ///
    /// Sends op 1 every interval and watches for ACKs; going too long
    /// without one means the connection is dead and gets rebuilt.
    async fn heartbeat_loop(
        self: Arc<Self>,
        generation: u64,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let ack_deadline = interval * self.config.missed_ack_threshold;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(interval) => {}
            }
            if self.conn_gen.load(Ordering::SeqCst) != generation {
                return;
            }

            if self.last_ack.lock().elapsed() > ack_deadline {
                tracing::warn!("heartbeat ACKs stopped, forcing reconnect");
                self.force_reconnect(generation, CLOSE_SERVICE_RESTART, false);
                return;
            }

            let sequence = self.sequence.load(Ordering::SeqCst);
            tracing::trace!(sequence, "sending heartbeat");
            if let Err(e) = self.send(OpCode::Heartbeat, sequence).await {
                // The listen loop will observe the broken socket.
                tracing::warn!(error = %e, "heartbeat send failed");
            }
        }
    }
}

/// Read the next JSON frame, skipping control messages
async fn read_frame(source: &mut WsSource) -> Result<GatewayFrame, GatewayError> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Ok(GatewayFrame::parse(&text)?),
            Some(Ok(Message::Binary(bytes))) => return GatewayFrame::parse_compressed(&bytes),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(GatewayError::Protocol {
                    expected: "hello (op 10)",
                    got: "closed stream".to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_common::ClientConfig;

    fn session() -> Arc<GatewaySession> {
        let config = ClientConfig::new("Bot abc");
        let rest = Arc::new(RestClient::new(config.clone()).unwrap());
        GatewaySession::new(config, rest, EventRouter::new())
    }

    #[tokio::test]
    async fn test_shard_bounds_rejected() {
        let config = ClientConfig::new("Bot abc").with_shard(4, 4);
        let rest = Arc::new(RestClient::new(config.clone()).unwrap());
        let session = GatewaySession::new(config, rest, EventRouter::new());

        match session.open().await {
            Err(GatewayError::ShardBounds { index: 4, count: 4 }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_presence_requires_valid_status() {
        let session = session();
        match session.update_presence("busy").await {
            Err(GatewayError::InvalidStatus { status }) => assert_eq!(status, "busy"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_presence_requires_connection() {
        let session = session();
        assert!(matches!(
            session.update_presence("idle").await,
            Err(GatewayError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_close_without_connection_is_benign() {
        let session = session();
        assert!(session.close().await.is_ok());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_sequence_never_regresses() {
        let session = session();
        let make_frame = |s: u64| GatewayFrame {
            op: OpCode::Dispatch,
            s: Some(s),
            t: Some("TYPING_START".to_string()),
            d: serde_json::value::RawValue::from_string(
                r#"{"user_id": "1", "channel_id": "2"}"#.to_string(),
            )
            .ok(),
        };

        session.handle_dispatch(make_frame(5));
        session.handle_dispatch(make_frame(9));
        session.handle_dispatch(make_frame(7));
        assert_eq!(session.sequence(), 9);
    }
}
