//! Connection timing and size limits.
//!
//! Provides a type-safe builder for the constants governing a connection's
//! pumps.
//!
//! # Example
//!
//! ```ignore
//! use std::time::{Duration, Instant};
//! use wsmux::ConnectionConfig;
//!
//! let config = ConnectionConfig::new()
//!     .with_pong_wait(Duration::from_secs(30))
//!     .with_max_message_size(4096);
//!
//! assert_eq!(config.ping_period(), Duration::from_secs(27));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default outbound queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

/// Default time allowed to write one frame.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Default time allowed between pongs from the peer.
pub const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);

/// Default maximum inbound message size in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024;

// ============================================================================
// ConnectionConfig
// ============================================================================

/// Per-connection limits and timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Outbound queue capacity; a full queue blocks the inbound pump.
    pub queue_capacity: usize,

    /// Deadline for each frame write.
    pub write_wait: Duration,

    /// Read deadline, refreshed on every pong.
    pub pong_wait: Duration,

    /// Ping interval; `None` means 90% of `pong_wait`.
    pub ping_period: Option<Duration>,

    /// Largest inbound message accepted.
    pub max_message_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionConfig {
    /// Creates a config with the default constants.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            write_wait: DEFAULT_WRITE_WAIT,
            pong_wait: DEFAULT_PONG_WAIT,
            ping_period: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionConfig {
    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the per-write deadline.
    #[inline]
    #[must_use]
    pub fn with_write_wait(mut self, wait: Duration) -> Self {
        self.write_wait = wait;
        self
    }

    /// Sets the read deadline between pongs.
    #[inline]
    #[must_use]
    pub fn with_pong_wait(mut self, wait: Duration) -> Self {
        self.pong_wait = wait;
        self
    }

    /// Sets an explicit ping interval.
    #[inline]
    #[must_use]
    pub fn with_ping_period(mut self, period: Duration) -> Self {
        self.ping_period = Some(period);
        self
    }

    /// Sets the inbound message size limit.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl ConnectionConfig {
    /// Returns the effective ping interval.
    #[inline]
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.ping_period
            .unwrap_or(self.pong_wait - self.pong_wait / 10)
    }

    /// Checks that the pumps can run with these values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero capacity, size or duration, a
    /// duration too large to schedule, or when pings would not arrive before
    /// the read deadline.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be at least 1"));
        }
        if self.max_message_size == 0 {
            return Err(Error::config("max_message_size must be at least 1"));
        }
        if self.write_wait.is_zero() || self.pong_wait.is_zero() {
            return Err(Error::config("write_wait and pong_wait must be non-zero"));
        }
        let now = Instant::now();
        if now.checked_add(self.write_wait).is_none() || now.checked_add(self.pong_wait).is_none() {
            return Err(Error::config("write_wait and pong_wait are too large"));
        }

        let period = self.ping_period();
        if period.is_zero() || period >= self.pong_wait {
            return Err(Error::config(format!(
                "ping_period ({period:?}) must be non-zero and shorter than pong_wait ({:?})",
                self.pong_wait
            )));
        }
        Ok(())
    }

    /// Returns the tungstenite settings enforcing the size limit.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }
}

// ============================================================================
// Tests
// ============================================================================
