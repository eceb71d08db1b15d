//! Handler abstraction.
//!
//! A [`Handler`] processes one [`Context`]. Handlers registered under the same
//! route key form a chain that runs left to right; any handler may stop the
//! chain with [`Context::abort`], by sending a response, or run the rest of
//! the chain early with [`Context::next`].
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Handler`] | Unit of work executed by a chain |
//! | [`HandlerFn`] | Adapter turning a closure into a handler |
//! | [`NotFound`] | Default handler for unroutable messages |
//! | [`Logger`] | Middleware logging request, response and latency |

// ============================================================================
// Submodules
// ============================================================================

/// Request/response logging middleware.
pub mod logger;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::context::Context;

// ============================================================================
// Re-exports
// ============================================================================

pub use logger::{Logger, logger};

// ============================================================================
// Constants
// ============================================================================

/// Body written by [`NotFound`].
pub const NOT_FOUND_BODY: &[u8] = b"route not found";

// ============================================================================
// Types
// ============================================================================

/// Shared handler reference stored in route tables.
pub type HandlerRef = Arc<dyn Handler>;

/// Ordered handler chain resolved for one route key.
pub type Chain = Arc<[HandlerRef]>;

// ============================================================================
// Handler
// ============================================================================

/// Processes a message cycle.
///
/// Handlers run synchronously on the connection's inbound pump and must be
/// internally bounded: a handler that never returns stalls its connection.
pub trait Handler: Send + Sync + 'static {
    /// Handles the current message.
    fn serve(&self, ctx: &mut Context);
}

// ============================================================================
// HandlerFn
// ============================================================================

/// Adapter implementing [`Handler`] for a plain function or closure.
#[derive(Clone)]
pub struct HandlerFn<F>(F);

impl<F> HandlerFn<F>
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    /// Wraps `f`.
    #[inline]
    #[must_use]
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    #[inline]
    fn serve(&self, ctx: &mut Context) {
        (self.0)(ctx);
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandlerFn")
    }
}

/// Wraps a closure into a shareable [`HandlerRef`].
///
/// # Example
///
/// ```ignore
/// let echo = handler_fn(|ctx| {
///     let body = ctx.request_body().to_vec();
///     let _ = ctx.send_data(body);
/// });
/// ```
#[inline]
#[must_use]
pub fn handler_fn<F>(f: F) -> HandlerRef
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(HandlerFn::new(f))
}

// ============================================================================
// NotFound
// ============================================================================

/// Writes [`NOT_FOUND_BODY`] as the response.
///
/// Substituted whenever route resolution yields an empty chain, and usable as
/// an explicit wildcard route.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotFound;

impl Handler for NotFound {
    fn serve(&self, ctx: &mut Context) {
        if let Err(e) = ctx.send_data(NOT_FOUND_BODY) {
            debug!(error = %e, "Not-found response rejected");
        }
    }
}

/// Returns the shared [`NotFound`] handler.
#[inline]
#[must_use]
pub fn not_found() -> HandlerRef {
    Arc::new(NotFound)
}

// ============================================================================
// Tests
// ============================================================================
