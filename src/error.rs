//! Error types for wsmux.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use wsmux::{Context, Result};
//!
//! fn reply(ctx: &mut Context) -> Result<()> {
//!     let body: serde_json::Value = ctx.bind_json()?;
//!     ctx.send_json(&body)
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Programming | [`Error::NonComparableRouteKey`], [`Error::MultipleResponse`], [`Error::HandlerPanic`] |
//! | Connection | [`Error::QueueFull`], [`Error::ConnectionClosed`], [`Error::Timeout`], [`Error::Handshake`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when server or connection configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Programming Errors
    // ========================================================================
    /// Route key cannot be compared by value.
    ///
    /// Returned by route registration when the key holds a value that is not
    /// equal to itself (a NaN float, directly or inside a struct key).
    #[error("Route key is not comparable: {key}")]
    NonComparableRouteKey {
        /// Debug rendering of the rejected key.
        key: String,
    },

    /// A second response was sent within one message cycle.
    ///
    /// The second payload is never written.
    #[error("Multiple response data in one message cycle")]
    MultipleResponse,

    /// A handler panicked while the chain was running.
    #[error("Handler panicked: {message}")]
    HandlerPanic {
        /// Panic payload rendered as text.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The outbound queue has no free slot.
    ///
    /// Returned by non-blocking pushes only.
    #[error("Outbound queue full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Connection is closed.
    ///
    /// Returned when pushing to a connection whose outbound queue is gone.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O deadline elapsed.
    ///
    /// Returned when a frame write does not finish within the write wait.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket upgrade failed.
    #[error("Handshake failed: {message}")]
    Handshake {
        /// Description of the handshake failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a non-comparable route key error.
    #[inline]
    pub fn non_comparable_key(key: impl Into<String>) -> Self {
        Self::NonComparableRouteKey { key: key.into() }
    }

    /// Creates a handler panic error.
    #[inline]
    pub fn handler_panic(message: impl Into<String>) -> Self {
        Self::HandlerPanic {
            message: message.into(),
        }
    }

    /// Creates a queue full error.
    #[inline]
    pub fn queue_full(capacity: usize) -> Self {
        Self::QueueFull { capacity }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error signals misuse of the API.
    ///
    /// These are contained to one message cycle and never close a connection.
    #[inline]
    #[must_use]
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::NonComparableRouteKey { .. } | Self::MultipleResponse | Self::HandlerPanic { .. }
        )
    }

    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed
                | Self::Timeout { .. }
                | Self::Handshake { .. }
                | Self::Io(_)
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if retrying the same operation later may succeed.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::Json(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::config("queue capacity must be non-zero");
        assert_eq!(
            err.to_string(),
            "Configuration error: queue capacity must be non-zero"
        );
    }

    #[test]
    fn test_queue_full_display() {
        let err = Error::queue_full(5);
        assert_eq!(err.to_string(), "Outbound queue full (capacity 5)");
    }

    #[test]
    fn test_is_programming_error() {
        assert!(Error::MultipleResponse.is_programming_error());
        assert!(Error::non_comparable_key("Float(NaN)").is_programming_error());
        assert!(Error::handler_panic("boom").is_programming_error());
        assert!(!Error::ConnectionClosed.is_programming_error());
    }

    #[test]
    fn test_is_transport_error() {
        assert!(Error::ConnectionClosed.is_transport_error());
        assert!(Error::handshake("bad request").is_transport_error());
        assert!(!Error::MultipleResponse.is_transport_error());
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("write frame", 10_000);
        assert_eq!(err.to_string(), "Timeout after 10000ms: write frame");
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::queue_full(5).is_recoverable());
        assert!(!Error::ConnectionClosed.is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
