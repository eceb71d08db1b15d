//! Message routing.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `key` | [`RouteKey`] tagged key type |
//! | `router` | [`Router`] registry and `use_handlers` views |
//! | `getter` | [`RouteGetter`] and built-in getters |

// ============================================================================
// Submodules
// ============================================================================

/// Route key type.
pub mod key;

/// Route registry.
pub mod router;

/// Route key extraction.
pub mod getter;

// ============================================================================
// Re-exports
// ============================================================================

pub use getter::{RouteGetter, constant, json_field, route_getter};
pub use key::RouteKey;
pub use router::{RouteInfo, Router, WildcardFallback};
