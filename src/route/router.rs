//! Route registry.
//!
//! A [`Router`] maps [`RouteKey`]s to handler chains. Views created with
//! [`Router::use_handlers`] share the same table and prepend their shared
//! handlers to every chain registered through them.
//!
//! # Example
//!
//! ```ignore
//! let router = Router::new();
//! let api = router.use_handlers([logger()]);
//!
//! api.handle(RouteKey::Wildcard, "not-found", [not_found()])?;
//! api.handle("chat", "chat.echo", [echo])?;
//!
//! // chain for "chat" is [logger, echo]
//! let chain = api.resolve(&RouteKey::from("chat"));
//! ```
//!
//! The table is built before serving starts. Registration takes a write lock,
//! but nothing orders registrations against messages already in flight.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::{Chain, HandlerRef, handler_fn};

use super::RouteKey;

// ============================================================================
// Types
// ============================================================================

/// Shared route table.
type RouteTable = FxHashMap<RouteKey, RouteEntry>;

/// One registered route.
#[derive(Clone)]
struct RouteEntry {
    /// Label of the latest registration for this key.
    label: String,
    /// Full chain, shared handlers first.
    chain: Chain,
}

// ============================================================================
// WildcardFallback
// ============================================================================

/// Whether a lookup miss falls back to the [`RouteKey::Wildcard`] chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WildcardFallback {
    /// A miss resolves to an empty chain.
    #[default]
    Disabled,
    /// A miss on a non-wildcard key resolves to the wildcard chain.
    Enabled,
}

// ============================================================================
// RouteInfo
// ============================================================================

/// Read-only view of one route, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Route key.
    pub key: RouteKey,
    /// Label of the latest registration.
    pub label: String,
    /// Number of handlers in the chain.
    pub handler_count: usize,
}

// ============================================================================
// Router
// ============================================================================

/// Route registry or a view over one.
///
/// Cloning a router clones the view; the table stays shared.
#[derive(Clone, Default)]
pub struct Router {
    /// Table shared by every view.
    table: Arc<RwLock<RouteTable>>,
    /// Handlers prepended to chains registered through this view.
    shared: Vec<HandlerRef>,
    /// Miss policy of this view.
    fallback: WildcardFallback,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.table.read().len())
            .field("shared", &self.shared.len())
            .field("fallback", &self.fallback)
            .finish()
    }
}

// ============================================================================
// Router - Constructors
// ============================================================================

impl Router {
    /// Creates an empty registry with fallback disabled.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view that prepends `handlers` to every chain registered
    /// through it.
    ///
    /// Shared handlers accumulate across nested calls in call order. The new
    /// view has [`WildcardFallback::Enabled`].
    #[must_use]
    pub fn use_handlers(&self, handlers: impl IntoIterator<Item = HandlerRef>) -> Self {
        let mut shared = self.shared.clone();
        shared.extend(handlers);
        Self {
            table: Arc::clone(&self.table),
            shared,
            fallback: WildcardFallback::Enabled,
        }
    }

    /// Returns this view with an explicit miss policy.
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, fallback: WildcardFallback) -> Self {
        self.fallback = fallback;
        self
    }
}

// ============================================================================
// Router - Registration
// ============================================================================

impl Router {
    /// Appends `handlers` to the chain under `key`, creating it if absent.
    ///
    /// The view's shared handlers go in front of `handlers`. `label` names
    /// the route in diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonComparableRouteKey`] if `key` is not equal to
    /// itself.
    pub fn handle(
        &self,
        key: impl Into<RouteKey>,
        label: impl Into<String>,
        handlers: impl IntoIterator<Item = HandlerRef>,
    ) -> Result<()> {
        let key = key.into();
        if !key.is_comparable() {
            return Err(Error::non_comparable_key(format!("{key:?}")));
        }

        let mut table = self.table.write();
        let mut chain: Vec<HandlerRef> = table
            .get(&key)
            .map(|entry| entry.chain.to_vec())
            .unwrap_or_default();
        chain.extend(self.shared.iter().cloned());
        chain.extend(handlers);

        table.insert(
            key,
            RouteEntry {
                label: label.into(),
                chain: chain.into(),
            },
        );
        Ok(())
    }

    /// Registers a single closure under `key`.
    ///
    /// # Errors
    ///
    /// See [`Router::handle`].
    pub fn handle_fn<F>(&self, key: impl Into<RouteKey>, label: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.handle(key, label, [handler_fn(f)])
    }
}

// ============================================================================
// Router - Lookup
// ============================================================================

impl Router {
    /// Returns the chain registered for `key`.
    ///
    /// On a miss, views with [`WildcardFallback::Enabled`] return the
    /// wildcard chain. A total miss yields an empty chain; callers substitute
    /// their own default.
    #[must_use]
    pub fn resolve(&self, key: &RouteKey) -> Chain {
        let table = self.table.read();

        let hit = table.get(key).filter(|entry| !entry.chain.is_empty());
        let entry = match hit {
            Some(entry) => Some(entry),
            None if self.fallback == WildcardFallback::Enabled && !key.is_wildcard() => {
                table.get(&RouteKey::Wildcard)
            }
            None => None,
        };

        entry.map_or_else(|| Arc::from(Vec::<HandlerRef>::new()), |e| Arc::clone(&e.chain))
    }

    /// Returns the miss policy of this view.
    #[inline]
    #[must_use]
    pub fn fallback(&self) -> WildcardFallback {
        self.fallback
    }

    /// Returns every route, ordered by key rendering.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut routes: Vec<RouteInfo> = self
            .table
            .read()
            .iter()
            .map(|(key, entry)| RouteInfo {
                key: key.clone(),
                label: entry.label.clone(),
                handler_count: entry.chain.len(),
            })
            .collect();
        routes.sort_by_cached_key(|route| route.key.to_string());
        routes
    }

    /// Returns the number of registered keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
