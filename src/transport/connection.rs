//! WebSocket connection and its pumps.
//!
//! A [`Connection`] owns one upgraded WebSocket and runs two tokio tasks
//! for its lifetime:
//!
//! - **Inbound pump**: reads frames, runs one message cycle per frame and
//!   enqueues its response, empty if the chain wrote none. A full queue
//!   suspends reading.
//! - **Outbound pump**: writes queued responses, coalescing whatever is
//!   already queued into one frame, and sends a ping every ping period.
//!
//! # Teardown
//!
//! Either pump calls [`Connection::close`] when it stops. Closing drops the
//! queue sender, which lets the outbound pump flush what is left and send a
//! close frame, and signals the inbound pump to stop reading.
//!
//! ```text
//! socket ──► inbound pump ──► Dispatcher ──► queue (bounded) ──► outbound pump ──► socket
//!                 ▲                                                    │
//!                 └──────────────── pong refreshes read deadline ◄─ ping
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout, timeout_at};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

use super::config::ConnectionConfig;
use super::dispatch::Dispatcher;
use super::frame::{self, CloseClass};

// ============================================================================
// Types
// ============================================================================

/// Write half of a split WebSocket.
type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;

/// Read half of a split WebSocket.
type WsStream<S> = SplitStream<WebSocketStream<S>>;

// ============================================================================
// ConnectionId
// ============================================================================

/// Unique identifier of one connection, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0.simple())
    }
}

// ============================================================================
// Connection
// ============================================================================

/// State shared by the handle and both pumps.
struct Shared {
    id: ConnectionId,
    peer_addr: Option<SocketAddr>,
    capacity: usize,
    /// Queue sender; `None` once closed.
    outbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Handle to one WebSocket session.
///
/// Cheap to clone; all clones refer to the same session. Handlers reach it
/// through [`Context::connection`](crate::Context::connection) to push
/// messages outside the request/response cycle.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Shared>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("peer_addr", &self.inner.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Builds the handle and its queue without starting any pump.
    fn open(peer_addr: Option<SocketAddr>, capacity: usize) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (shutdown, _) = watch::channel(false);

        let connection = Self {
            inner: Arc::new(Shared {
                id: ConnectionId::generate(),
                peer_addr,
                capacity,
                outbound: Mutex::new(Some(tx)),
                closed: AtomicBool::new(false),
                shutdown,
            }),
        };
        (connection, rx)
    }

    /// Starts both pumps over an upgraded stream.
    ///
    /// Returns immediately; the pumps run as separate tasks until either
    /// side stops.
    pub fn spawn<S>(
        ws_stream: WebSocketStream<S>,
        peer_addr: Option<SocketAddr>,
        dispatcher: Arc<Dispatcher>,
        config: ConnectionConfig,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (connection, rx) = Self::open(peer_addr, config.queue_capacity);
        let (sink, stream) = ws_stream.split();

        tokio::spawn(
            connection
                .clone()
                .run_inbound(stream, dispatcher, config.clone()),
        );
        tokio::spawn(connection.clone().run_outbound(sink, rx, config));

        debug!(conn = %connection.id(), peer = ?peer_addr, "Connection started");
        connection
    }

    /// Closes the queue and signals both pumps to stop.
    ///
    /// Queued messages are still flushed, followed by a close frame. Safe to
    /// call any number of times from any task.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.outbound.lock().take();
        self.inner.shutdown.send_replace(true);
        debug!(conn = %self.inner.id, "Connection closing");
    }

    /// Waits until the connection has been closed.
    pub async fn closed(&self) {
        let mut shutdown = self.inner.shutdown.subscribe();
        let _ = shutdown.wait_for(|closed| *closed).await;
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the connection identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns the peer address, if known.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.inner.peer_addr
    }

    /// Returns the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

// ============================================================================
// Connection - Push
// ============================================================================

impl Connection {
    /// Enqueues `data`, waiting for a free slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is closed.
    pub async fn push(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let tx = self.sender()?;
        tx.send(data.into())
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Enqueues `data` without waiting.
    ///
    /// # Errors
    ///
    /// - [`Error::QueueFull`] if every slot is taken
    /// - [`Error::ConnectionClosed`] if the connection is closed
    pub fn try_push(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let tx = self.sender()?;
        tx.try_send(data.into()).map_err(|e| match e {
            TrySendError::Full(_) => Error::queue_full(self.inner.capacity),
            TrySendError::Closed(_) => Error::ConnectionClosed,
        })
    }

    /// Clones the queue sender out of the lock.
    fn sender(&self) -> Result<mpsc::Sender<Vec<u8>>> {
        self.inner
            .outbound
            .lock()
            .clone()
            .ok_or(Error::ConnectionClosed)
    }
}

// ============================================================================
// Inbound Pump
// ============================================================================

impl Connection {
    /// Reads frames and dispatches them in arrival order.
    async fn run_inbound<S>(
        self,
        mut stream: WsStream<S>,
        dispatcher: Arc<Dispatcher>,
        config: ConnectionConfig,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = self.id();
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut deadline = Instant::now() + config.pong_wait;

        loop {
            let next = tokio::select! {
                _ = shutdown.wait_for(|closed| *closed) => break,
                next = timeout_at(deadline, stream.next()) => next,
            };

            let message = match next {
                Err(_) => {
                    debug!(conn = %id, "Read deadline elapsed without pong");
                    break;
                }
                Ok(None) => {
                    debug!(conn = %id, "Stream ended");
                    break;
                }
                Ok(Some(Err(e))) => {
                    match frame::classify_error(&e) {
                        CloseClass::Abnormal => warn!(conn = %id, error = %e, "Connection lost"),
                        CloseClass::Normal => debug!(conn = %id, error = %e, "Read stopped"),
                    }
                    break;
                }
                Ok(Some(Ok(message))) => message,
            };

            let payload = match message {
                Message::Text(text) => text.as_bytes().to_vec(),
                Message::Binary(data) => data.to_vec(),
                Message::Pong(_) => {
                    deadline = Instant::now() + config.pong_wait;
                    trace!(conn = %id, "Pong received");
                    continue;
                }
                Message::Close(close) => {
                    match frame::classify_close(close.as_ref()) {
                        CloseClass::Abnormal => warn!(conn = %id, ?close, "Peer went away"),
                        CloseClass::Normal => debug!(conn = %id, ?close, "Closed by peer"),
                    }
                    break;
                }
                Message::Ping(_) | Message::Frame(_) => continue,
            };

            if payload.len() > config.max_message_size {
                debug!(
                    conn = %id,
                    size = payload.len(),
                    limit = config.max_message_size,
                    "Message exceeds read limit"
                );
                break;
            }

            trace!(conn = %id, size = payload.len(), "Message received");
            let response = dispatcher
                .dispatch(frame::normalize(&payload), Some(&self))
                .into_payload();

            let Ok(tx) = self.sender() else {
                break;
            };
            tokio::select! {
                _ = shutdown.wait_for(|closed| *closed) => break,
                sent = tx.send(response) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }

        self.close();
        debug!(conn = %id, "Inbound pump stopped");
    }
}

// ============================================================================
// Outbound Pump
// ============================================================================

impl Connection {
    /// Writes queued responses and keeps the peer alive with pings.
    async fn run_outbound<S>(
        self,
        mut sink: WsSink<S>,
        mut rx: mpsc::Receiver<Vec<u8>>,
        config: ConnectionConfig,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = self.id();
        let period = config.ping_period().max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                next = rx.recv() => {
                    let Some(first) = next else {
                        if let Err(e) = write_frame(&mut sink, Message::Close(None), config.write_wait).await {
                            debug!(conn = %id, error = %e, "Close frame not sent");
                        }
                        break;
                    };

                    let queued = rx.len();
                    let mut batch = Vec::with_capacity(queued + 1);
                    batch.push(first);
                    for _ in 0..queued {
                        match rx.try_recv() {
                            Ok(more) => batch.push(more),
                            Err(_) => break,
                        }
                    }

                    trace!(conn = %id, messages = batch.len(), "Flushing");
                    let message = frame::outbound_message(frame::coalesce(batch));
                    if let Err(e) = write_frame(&mut sink, message, config.write_wait).await {
                        warn!(conn = %id, error = %e, "Write failed");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = write_frame(&mut sink, Message::Ping(Default::default()), config.write_wait).await {
                        warn!(conn = %id, error = %e, "Ping failed");
                        break;
                    }
                    trace!(conn = %id, "Ping sent");
                }
            }
        }

        let _ = timeout(config.write_wait, sink.close()).await;
        self.close();
        debug!(conn = %id, "Outbound pump stopped");
    }
}

/// Sends one frame within `wait`.
async fn write_frame<S>(sink: &mut WsSink<S>, message: Message, wait: Duration) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match timeout(wait, sink.send(message)).await {
        Ok(sent) => sent.map_err(Error::from),
        Err(_) => Err(Error::timeout("write frame", saturating_millis(wait))),
    }
}

/// Converts `wait` to whole milliseconds, saturating at `u64::MAX`.
fn saturating_millis(wait: Duration) -> u64 {
    u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
impl Connection {
    /// Creates a connection with no pumps; the caller drains the queue.
    pub(crate) fn detached(
        peer_addr: Option<SocketAddr>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Vec<u8>>) {
        Self::open(peer_addr, capacity)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::DuplexStream;
    use tokio_test::{assert_pending, assert_ready_ok};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role};

    use crate::handler::{handler_fn, not_found};
    use crate::route::{RouteGetter, RouteKey, Router, constant, route_getter};

    type Client = WebSocketStream<DuplexStream>;

    async fn pair(router: Router, getter: RouteGetter, config: ConnectionConfig) -> (Connection, Client) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server =
            WebSocketStream::from_raw_socket(server_io, Role::Server, Some(config.websocket_config()))
                .await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

        let dispatcher = Arc::new(Dispatcher::new(router, getter));
        let connection = Connection::spawn(server, None, dispatcher, config);
        (connection, client)
    }

    fn echo_router() -> Router {
        let router = Router::new();
        router
            .handle_fn("chat", "chat.echo", |ctx| {
                let body = ctx.request_body().to_vec();
                ctx.send_data(body).unwrap();
            })
            .unwrap();
        router
    }

    /// Keys on the whole request body.
    fn body_key() -> RouteGetter {
        route_getter(|ctx| RouteKey::from(String::from_utf8_lossy(ctx.request_body()).into_owned()))
    }

    async fn next_text(client: &mut Client) -> String {
        loop {
            let message = client.next().await.unwrap().unwrap();
            if message.is_text() {
                return message.to_text().unwrap().to_owned();
            }
        }
    }

    /// Collects `count` responses, splitting coalesced frames.
    async fn next_lines(client: &mut Client, count: usize) -> Vec<String> {
        let mut lines = Vec::new();
        while lines.len() < count {
            let text = next_text(client).await;
            lines.extend(text.split('\n').map(str::to_owned));
        }
        lines
    }

    #[test]
    fn test_saturating_millis() {
        assert_eq!(saturating_millis(Duration::from_secs(10)), 10_000);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::generate();
        assert!(id.to_string().starts_with("conn-"));
        assert_ne!(id, ConnectionId::generate());
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (_connection, mut client) = pair(echo_router(), constant("chat"), ConnectionConfig::new()).await;

        client.send(Message::text("ping")).await.unwrap();
        assert_eq!(next_text(&mut client).await, "ping");
    }

    #[tokio::test]
    async fn test_inbound_payload_is_normalized() {
        let (_connection, mut client) = pair(echo_router(), constant("chat"), ConnectionConfig::new()).await;

        client.send(Message::text("  a\nb \n")).await.unwrap();
        assert_eq!(next_text(&mut client).await, "a b");
    }

    #[tokio::test]
    async fn test_unroutable_message_gets_not_found() {
        let router = Router::new().use_handlers([]);
        router.handle(RouteKey::Wildcard, "not-found", [not_found()]).unwrap();

        let (_connection, mut client) = pair(router, body_key(), ConnectionConfig::new()).await;

        client.send(Message::text("anything")).await.unwrap();
        assert_eq!(next_text(&mut client).await, "route not found");
    }

    #[tokio::test]
    async fn test_responses_keep_request_order() {
        let (_connection, mut client) = pair(echo_router(), constant("chat"), ConnectionConfig::new()).await;

        for body in ["r1", "r2", "r3", "r4"] {
            client.send(Message::text(body)).await.unwrap();
        }

        let mut received = Vec::new();
        while received.len() < 4 {
            let text = next_text(&mut client).await;
            received.extend(text.split('\n').map(str::to_owned));
        }
        assert_eq!(received, ["r1", "r2", "r3", "r4"]);
    }

    #[tokio::test]
    async fn test_handler_panic_keeps_connection_open() {
        let router = Router::new();
        router.handle_fn("boom", "boom", |_| panic!("handler exploded")).unwrap();
        router
            .handle_fn("ok", "ok", |ctx| ctx.send_text("still here").unwrap())
            .unwrap();

        let (connection, mut client) = pair(router, body_key(), ConnectionConfig::new()).await;

        client.send(Message::text("boom")).await.unwrap();
        client.send(Message::text("ok")).await.unwrap();

        assert_eq!(next_lines(&mut client, 2).await, ["", "still here"]);
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn test_silent_chain_still_answers_in_order() {
        let router = Router::new();
        router.handle_fn("quiet", "quiet", |_| {}).unwrap();
        router
            .handle_fn("loud", "loud", |ctx| {
                let body = ctx.request_body().to_vec();
                ctx.send_data(body).unwrap();
            })
            .unwrap();

        let (_connection, mut client) = pair(router, body_key(), ConnectionConfig::new()).await;

        for body in ["loud", "quiet", "loud"] {
            client.send(Message::text(body)).await.unwrap();
        }

        let lines = timeout(Duration::from_secs(5), next_lines(&mut client, 3))
            .await
            .unwrap();
        assert_eq!(lines, ["loud", "", "loud"]);
    }

    #[tokio::test]
    async fn test_silent_chain_sends_empty_frame() {
        let router = Router::new();
        router.handle_fn("chat", "quiet", |_| {}).unwrap();

        let (_connection, mut client) = pair(router, constant("chat"), ConnectionConfig::new()).await;
        client.send(Message::text("hello")).await.unwrap();

        let text = timeout(Duration::from_secs(5), next_text(&mut client))
            .await
            .unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_push_from_handler() {
        let router = Router::new();
        router
            .handle(
                "chat",
                "chat.notify",
                [handler_fn(|ctx| {
                    if let Some(connection) = ctx.connection() {
                        connection.try_push(b"notice".to_vec()).unwrap();
                    }
                    ctx.send_text("reply").unwrap();
                })],
            )
            .unwrap();

        let (_connection, mut client) = pair(router, constant("chat"), ConnectionConfig::new()).await;
        client.send(Message::text("hi")).await.unwrap();

        let mut received = Vec::new();
        while received.len() < 2 {
            let text = next_text(&mut client).await;
            received.extend(text.split('\n').map(str::to_owned));
        }
        assert_eq!(received, ["notice", "reply"]);
    }

    #[tokio::test]
    async fn test_peer_close_closes_connection() {
        let (connection, mut client) = pair(echo_router(), constant("chat"), ConnectionConfig::new()).await;

        client
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            })))
            .await
            .unwrap();

        timeout(Duration::from_secs(5), connection.closed()).await.unwrap();
        assert!(connection.is_closed());
        assert!(matches!(connection.try_push(b"late".to_vec()), Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_oversized_message_closes_connection() {
        let config = ConnectionConfig::new().with_max_message_size(16);
        let (connection, mut client) = pair(echo_router(), constant("chat"), config).await;

        client.send(Message::text("x".repeat(64))).await.unwrap();

        timeout(Duration::from_secs(5), connection.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_local_close_sends_close_frame() {
        let (connection, mut client) = pair(echo_router(), constant("chat"), ConnectionConfig::new()).await;

        connection.close();
        connection.close();

        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(message.is_close());
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (connection, mut rx) = Connection::detached(None, 5);

        for i in 0..5u8 {
            connection.try_push(vec![i]).unwrap();
        }
        assert!(matches!(
            connection.try_push(vec![5]),
            Err(Error::QueueFull { capacity: 5 })
        ));

        let mut blocked = tokio_test::task::spawn(connection.push(vec![5]));
        assert_pending!(blocked.poll());

        assert_eq!(rx.recv().await, Some(vec![0]));
        assert!(blocked.is_woken());
        assert_ready_ok!(blocked.poll());
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let (connection, _rx) = Connection::detached(None, 1);
        connection.close();

        assert!(matches!(connection.push(b"x".to_vec()).await, Err(Error::ConnectionClosed)));
        connection.closed().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_responsive_peer_stays_connected() {
        let (connection, mut client) = pair(echo_router(), constant("chat"), ConnectionConfig::new()).await;

        // Reading answers pings with pongs.
        let reader = tokio::spawn(async move { while let Some(Ok(_)) = client.next().await {} });

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(!connection.is_closed());

        connection.close();
        reader.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_times_out() {
        let config = ConnectionConfig::new();
        let pong_wait = config.pong_wait;
        let (connection, _client) = pair(echo_router(), constant("chat"), config).await;

        timeout(pong_wait * 2, connection.closed()).await.unwrap();
        assert!(connection.is_closed());
    }

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_deadline_logs_ordinary_disconnect() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let config = ConnectionConfig::new();
        let pong_wait = config.pong_wait;
        let (connection, _client) = pair(echo_router(), constant("chat"), config).await;
        timeout(pong_wait * 2, connection.closed()).await.unwrap();

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        let line = output
            .lines()
            .find(|line| line.contains("Read deadline elapsed"))
            .unwrap();
        assert!(line.contains("DEBUG"), "{line}");
        assert!(!line.contains("WARN"), "{line}");
    }
}
