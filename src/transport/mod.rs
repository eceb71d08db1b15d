//! WebSocket transport layer.
//!
//! Everything between an upgraded WebSocket and the handler chains.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   frames   ┌──────────────────────────────┐
//! │             │───────────►│ inbound pump                 │
//! │   Peer      │            │   └─► Dispatcher::dispatch   │
//! │             │            │         └─► queue (bounded)  │
//! │             │◄───────────│ outbound pump + ping ticker  │
//! └─────────────┘            └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Queue capacity, deadlines and read limit |
//! | `connection` | Connection handle and its two pumps |
//! | `dispatch` | One message cycle: route, run, collect response |
//! | `frame` | Payload normalization, coalescing, close classification |

// ============================================================================
// Submodules
// ============================================================================

/// Per-connection configuration.
pub mod config;

/// WebSocket connection and pumps.
pub mod connection;

/// Message cycle dispatch.
pub mod dispatch;

/// Wire framing helpers.
pub mod frame;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{
    ConnectionConfig, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PONG_WAIT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_WRITE_WAIT,
};
pub use connection::{Connection, ConnectionId};
pub use dispatch::Dispatcher;
