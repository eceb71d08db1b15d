//! WebSocket server entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Server`] | Accept loop, path-checked upgrade, live connection set |
//! | [`ServerBuilder`] | Fluent configuration builder |
//!
//! # Example
//!
//! ```no_run
//! use tokio::net::TcpListener;
//! use wsmux::{Router, Server, json_field, not_found, RouteKey};
//!
//! # async fn example() -> wsmux::Result<()> {
//! let router = Router::new().use_handlers([]);
//! router.handle(RouteKey::Wildcard, "not-found", [not_found()])?;
//!
//! let server = Server::builder()
//!     .router(router)
//!     .route_getter(json_field("path"))
//!     .build()?;
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! server.serve(listener).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for server configuration.
pub mod builder;

/// Core server implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::{DEFAULT_PATH, ServerBuilder};
pub use self::core::Server;
