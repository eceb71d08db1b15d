//! Server accept loop and upgrade.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::route::Router;
use crate::transport::{Connection, ConnectionConfig, ConnectionId, Dispatcher};

use super::builder::ServerBuilder;

// ============================================================================
// Constants
// ============================================================================

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Body of the response to an upgrade on an unknown path.
const NOT_FOUND_BODY: &str = "404 page not found";

// ============================================================================
// Types
// ============================================================================

/// Live connections by identifier.
type ConnectionMap = FxHashMap<ConnectionId, Connection>;

// ============================================================================
// Server
// ============================================================================

/// WebSocket server.
///
/// Upgrades requests on its path and starts a [`Connection`] per session,
/// all sharing one [`Dispatcher`]. Cloning is cheap and clones share state.
///
/// # Example
///
/// ```ignore
/// let listener = TcpListener::bind("127.0.0.1:8080").await?;
/// server.serve_with_shutdown(listener, async {
///     let _ = tokio::signal::ctrl_c().await;
/// }).await?;
/// ```
#[derive(Clone)]
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    path: Arc<str>,
    config: ConnectionConfig,
    connections: Arc<RwLock<ConnectionMap>>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Server - Constructors
// ============================================================================

impl Server {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Creates a server from validated parts.
    pub(crate) fn new(dispatcher: Dispatcher, path: String, config: ConnectionConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            path: Arc::from(path),
            config,
            connections: Arc::new(RwLock::new(ConnectionMap::default())),
        }
    }
}

// ============================================================================
// Server - Accessors
// ============================================================================

impl Server {
    /// Returns the upgrade path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the per-connection configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Returns the router.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &Router {
        self.dispatcher.router()
    }

    /// Returns the shared dispatcher.
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns the number of live connections.
    #[inline]
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

// ============================================================================
// Server - Serving
// ============================================================================

impl Server {
    /// Accepts connections from `listener` until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the listener has no local address.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending())
            .await
    }

    /// Accepts connections from `listener` until `shutdown` completes, then
    /// closes every live connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the listener has no local address.
    pub async fn serve_with_shutdown<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        info!(%local_addr, path = %self.path, "Serving WebSocket");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    debug!("Shutdown requested");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.accept(stream, Some(peer)).await {
                                warn!(error = %e, ?peer, "Connection handling failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        self.shutdown();
        info!(%local_addr, "Server stopped");
        Ok(())
    }

    /// Upgrades `stream` and starts a connection on it.
    ///
    /// Only requests for [`Server::path`] are upgraded; others receive 404.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the upgrade fails or is rejected.
    pub async fn accept<S>(&self, stream: S, peer_addr: Option<SocketAddr>) -> Result<Connection>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        debug!(?peer_addr, "New connection");

        let path = Arc::clone(&self.path);
        let check_path = move |request: &Request, response: Response| -> StdResult<Response, ErrorResponse> {
            if request.uri().path() == &*path {
                return Ok(response);
            }
            warn!(path = request.uri().path(), "Upgrade rejected: unknown path");
            let mut rejection = ErrorResponse::new(Some(NOT_FOUND_BODY.to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            Err(rejection)
        };

        let ws_stream = tokio_tungstenite::accept_hdr_async_with_config(
            stream,
            check_path,
            Some(self.config.websocket_config()),
        )
        .await
        .map_err(|e| Error::handshake(format!("WebSocket upgrade failed: {e}")))?;

        Ok(self.attach(ws_stream, peer_addr))
    }

    /// Starts a connection on a stream upgraded elsewhere.
    pub fn attach<S>(&self, ws_stream: WebSocketStream<S>, peer_addr: Option<SocketAddr>) -> Connection
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection = Connection::spawn(
            ws_stream,
            peer_addr,
            Arc::clone(&self.dispatcher),
            self.config.clone(),
        );
        let id = connection.id();
        self.connections.write().insert(id, connection.clone());

        let connections = Arc::clone(&self.connections);
        let watched = connection.clone();
        tokio::spawn(async move {
            watched.closed().await;
            connections.write().remove(&watched.id());
        });

        info!(conn = %id, peer = ?peer_addr, "WebSocket connection established");
        connection
    }

    /// Closes every live connection.
    pub fn shutdown(&self) {
        let connections: Vec<Connection> = self.connections.read().values().cloned().collect();
        let count = connections.len();

        for connection in connections {
            connection.close();
        }

        if count > 0 {
            debug!(count, "Closed connections on shutdown");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
