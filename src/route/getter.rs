//! Route getters.
//!
//! A [`RouteGetter`] extracts the [`RouteKey`] of an inbound message. It runs
//! once per message, before chain resolution, and may decode the body.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::context::Context;

use super::RouteKey;

// ============================================================================
// Types
// ============================================================================

/// Extracts a route key from a message.
pub type RouteGetter = Arc<dyn Fn(&Context) -> RouteKey + Send + Sync>;

// ============================================================================
// Constructors
// ============================================================================

/// Wraps a closure into a [`RouteGetter`].
#[inline]
#[must_use]
pub fn route_getter<F>(f: F) -> RouteGetter
where
    F: Fn(&Context) -> RouteKey + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Keys every message on the same `key`.
#[must_use]
pub fn constant(key: impl Into<RouteKey>) -> RouteGetter {
    let key = key.into();
    Arc::new(move |_: &Context| key.clone())
}

/// Keys messages on one field of a JSON object body.
///
/// Bodies that are not JSON objects, lack the field, or hold an array there
/// resolve to [`RouteKey::Wildcard`].
///
/// # Example
///
/// ```ignore
/// // {"path": "chat", "text": "hi"} is routed under "chat"
/// let getter = json_field("path");
/// ```
#[must_use]
pub fn json_field(field: impl Into<String>) -> RouteGetter {
    let field = field.into();
    Arc::new(move |ctx: &Context| {
        let body: Value = match ctx.bind_json() {
            Ok(body) => body,
            Err(e) => {
                trace!(error = %e, "Body is not JSON, using wildcard route");
                return RouteKey::Wildcard;
            }
        };
        body.get(&field)
            .and_then(|value| RouteKey::from_json(value).ok())
            .unwrap_or(RouteKey::Wildcard)
    })
}

// ============================================================================
// Tests
// ============================================================================
