//! Request/response logging middleware.
//!
//! [`Logger`] runs the rest of the chain through [`Context::next`], then logs
//! one `info` line with the latency, peer address, request and response.
//!
//! # Example
//!
//! ```ignore
//! let api = router.use_handlers([wsmux::handler::logger()]);
//! api.handle("chat", "chat.echo", [echo])?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::context::Context;

use super::{Handler, HandlerRef};

// ============================================================================
// Constants
// ============================================================================

/// Default number of body bytes rendered per log line.
const DEFAULT_MAX_BODY: usize = 256;

// ============================================================================
// Logger
// ============================================================================

/// Middleware logging each message cycle.
#[derive(Debug, Clone, Copy)]
pub struct Logger {
    /// Bodies longer than this are truncated in the log line.
    max_body: usize,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a logger with the default body limit.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_body: DEFAULT_MAX_BODY,
        }
    }

    /// Sets how many body bytes are rendered.
    #[inline]
    #[must_use]
    pub const fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// Renders a body for the log line.
    fn render(&self, body: &[u8]) -> String {
        if body.len() > self.max_body {
            let head = String::from_utf8_lossy(&body[..self.max_body]);
            format!("{head}... ({} bytes)", body.len())
        } else {
            String::from_utf8_lossy(body).into_owned()
        }
    }
}

impl Handler for Logger {
    fn serve(&self, ctx: &mut Context) {
        let start = Instant::now();
        ctx.next();
        let latency = start.elapsed();

        info!(
            ?latency,
            peer = ?ctx.peer_addr(),
            request = %self.render(ctx.request_body()),
            response = %self.render(ctx.response()),
            written = ctx.is_written(),
            "[WS]"
        );
    }
}

/// Returns a shared [`Logger`] with default settings.
#[inline]
#[must_use]
pub fn logger() -> HandlerRef {
    Arc::new(Logger::new())
}

// ============================================================================
// Tests
// ============================================================================
