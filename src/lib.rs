//! wsmux - Per-connection WebSocket message dispatch.
//!
//! Routes each inbound WebSocket message to an ordered chain of handlers,
//! chosen by a key the application extracts from the message, and writes
//! back at most one response per message.
//!
//! # Architecture
//!
//! Every connection runs two tokio tasks:
//!
//! - **Inbound pump**: reads a frame, runs one message cycle, enqueues the
//!   response on a bounded queue (a full queue suspends reading)
//! - **Outbound pump**: writes queued responses, coalescing bursts into one
//!   newline-separated frame, and pings the peer periodically
//!
//! One message cycle:
//!
//! ```text
//! frame ─► normalize ─► Context ─► route getter ─► Router ─► chain ─► response
//!                                                     │
//!                                                     └─ miss ─► "route not found"
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use tokio::net::TcpListener;
//! use wsmux::{RouteKey, Router, Server, json_field, logger, not_found};
//!
//! #[tokio::main]
//! async fn main() -> wsmux::Result<()> {
//!     let router = Router::new();
//!     let api = router.use_handlers([logger()]);
//!
//!     api.handle(RouteKey::Wildcard, "not-found", [not_found()])?;
//!     api.handle_fn("chat", "chat.echo", |ctx| {
//!         let body = ctx.request_body().to_vec();
//!         let _ = ctx.send_data(body);
//!     })?;
//!
//!     let server = Server::builder()
//!         .router(router)
//!         .route_getter(json_field("path"))
//!         .build()?;
//!
//!     server.serve(TcpListener::bind("127.0.0.1:8080").await?).await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Per-message [`Context`] and its reuse pool |
//! | [`debug`] | Route table printing |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`handler`] | [`Handler`] trait, closures, not-found and logger handlers |
//! | [`route`] | [`RouteKey`], [`Router`] and route getters |
//! | [`server`] | [`Server`] accept loop and upgrade |
//! | [`transport`] | [`Connection`] pumps, framing and configuration |

// ============================================================================
// Modules
// ============================================================================

/// Message cycle state.
///
/// - [`Context`] - Request, response, chain cursor and scratch values
/// - [`ContextPool`] - Free list of reset contexts
pub mod context;

/// Route table diagnostics.
pub mod debug;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Handler abstraction and built-in handlers.
pub mod handler;

/// Route keys, registry and key extraction.
pub mod route;

/// WebSocket server entry point.
///
/// Use [`Server::builder()`] to create a configured server.
pub mod server;

/// WebSocket transport layer.
///
/// Connection pumps, outbound queue, keepalive and framing.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Context types
pub use context::{Context, ContextPool, CycleOutcome};

// Error types
pub use error::{Error, Result};

// Handler types
pub use handler::{
    Chain, Handler, HandlerFn, HandlerRef, Logger, NotFound, handler_fn, logger, not_found,
};

// Routing types
pub use route::{
    RouteGetter, RouteInfo, RouteKey, Router, WildcardFallback, constant, json_field, route_getter,
};

// Server types
pub use server::{Server, ServerBuilder};

// Transport types
pub use transport::{Connection, ConnectionConfig, ConnectionId, Dispatcher};
