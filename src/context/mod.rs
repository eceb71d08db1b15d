//! Per-message context.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | [`Context`] and the chain driver |
//! | `pool` | [`ContextPool`] free list |

// ============================================================================
// Submodules
// ============================================================================

/// Context and chain execution.
pub mod core;

/// Context reuse pool.
pub mod pool;

// ============================================================================
// Re-exports
// ============================================================================

pub use self::core::{Context, CycleOutcome};
pub use pool::{ContextPool, DEFAULT_POOL_CAPACITY};
