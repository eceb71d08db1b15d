//! Builder pattern for server configuration.
//!
//! # Example
//!
//! ```ignore
//! use wsmux::{ConnectionConfig, Router, Server, json_field};
//!
//! let server = Server::builder()
//!     .router(router)
//!     .route_getter(json_field("path"))
//!     .path("/ws")
//!     .config(ConnectionConfig::new().with_queue_capacity(16))
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::context::{ContextPool, DEFAULT_POOL_CAPACITY};
use crate::error::{Error, Result};
use crate::route::{RouteGetter, Router};
use crate::transport::{ConnectionConfig, Dispatcher};

use super::core::Server;

// ============================================================================
// Constants
// ============================================================================

/// Default mount path for the WebSocket upgrade.
pub const DEFAULT_PATH: &str = "/ws";

// ============================================================================
// ServerBuilder
// ============================================================================

/// Builder for configuring a [`Server`].
///
/// Use [`Server::builder()`] to create a new builder.
#[derive(Clone)]
pub struct ServerBuilder {
    /// Route table.
    router: Option<Router>,
    /// Route key extractor.
    route_getter: Option<RouteGetter>,
    /// Upgrade path.
    path: String,
    /// Per-connection settings.
    config: ConnectionConfig,
    /// Idle contexts kept for reuse.
    pool_capacity: usize,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            router: None,
            route_getter: None,
            path: DEFAULT_PATH.to_string(),
            config: ConnectionConfig::default(),
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("router", &self.router)
            .field("route_getter", &self.route_getter.is_some())
            .field("path", &self.path)
            .field("config", &self.config)
            .field("pool_capacity", &self.pool_capacity)
            .finish()
    }
}

// ============================================================================
// ServerBuilder Implementation
// ============================================================================

impl ServerBuilder {
    /// Creates a builder with default path, config and pool capacity.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the router that resolves handler chains.
    #[inline]
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Sets the function that extracts a route key from each message.
    #[inline]
    #[must_use]
    pub fn route_getter(mut self, getter: RouteGetter) -> Self {
        self.route_getter = Some(getter);
        self
    }

    /// Sets the request path accepted for upgrades.
    ///
    /// Requests for any other path are answered with 404.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the per-connection configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how many idle contexts are kept for reuse.
    ///
    /// Zero disables reuse.
    #[inline]
    #[must_use]
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Builds the server with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if router or route getter is not set
    /// - [`Error::Config`] if the path does not start with `/`
    /// - [`Error::Config`] if the connection config is invalid
    pub fn build(self) -> Result<Server> {
        let router = self.validate_router()?;
        let route_getter = self.validate_route_getter()?;
        self.validate_path()?;
        self.config.validate()?;

        let pool = ContextPool::new(self.pool_capacity);
        let dispatcher = Dispatcher::with_pool(router, route_getter, pool);

        Ok(Server::new(dispatcher, self.path, self.config))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ServerBuilder {
    /// Validates the router configuration.
    fn validate_router(&self) -> Result<Router> {
        self.router.clone().ok_or_else(|| {
            Error::config(
                "Router is required. Use .router() to set it.\n\
                 Example: Server::builder().router(Router::new())",
            )
        })
    }

    /// Validates the route getter configuration.
    fn validate_route_getter(&self) -> Result<RouteGetter> {
        self.route_getter.clone().ok_or_else(|| {
            Error::config(
                "Route getter is required. Use .route_getter() to set it.\n\
                 Example: Server::builder().route_getter(json_field(\"path\"))",
            )
        })
    }

    /// Validates the upgrade path.
    fn validate_path(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(Error::config(format!(
                "Upgrade path must start with '/': {:?}",
                self.path
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::route::constant;

    fn complete() -> ServerBuilder {
        ServerBuilder::new().router(Router::new()).route_getter(constant("chat"))
    }

    #[test]
    fn test_new_has_defaults() {
        let builder = ServerBuilder::new();
        assert!(builder.router.is_none());
        assert!(builder.route_getter.is_none());
        assert_eq!(builder.path, DEFAULT_PATH);
        assert_eq!(builder.config, ConnectionConfig::default());
        assert_eq!(builder.pool_capacity, DEFAULT_POOL_CAPACITY);
    }

    #[test]
    fn test_build_requires_router() {
        let err = ServerBuilder::new()
            .route_getter(constant("chat"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains(".router()"));
    }

    #[test]
    fn test_build_requires_route_getter() {
        let err = ServerBuilder::new().router(Router::new()).build().unwrap_err();
        assert!(err.to_string().contains(".route_getter()"));
    }

    #[test]
    fn test_build_rejects_relative_path() {
        let err = complete().path("ws").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = ConnectionConfig::new()
            .with_pong_wait(Duration::from_secs(10))
            .with_ping_period(Duration::from_secs(20));
        assert!(complete().config(config).build().is_err());
    }

    #[test]
    fn test_build_rejects_unbounded_pong_wait() {
        let config = ConnectionConfig::new().with_pong_wait(Duration::MAX);
        let err = complete().config(config).build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_build_applies_settings() {
        let server = complete()
            .path("/chat")
            .pool_capacity(8)
            .config(ConnectionConfig::new().with_queue_capacity(16))
            .build()
            .unwrap();

        assert_eq!(server.path(), "/chat");
        assert_eq!(server.config().queue_capacity, 16);
        assert_eq!(server.dispatcher().pool().capacity(), 8);
    }
}
