//! Route table diagnostics.
//!
//! Logs one line per route at `debug` level:
//!
//! ```text
//! [WS] chat --> chat.echo (2 handlers)
//! ```

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::route::{RouteInfo, Router};

// ============================================================================
// Formatting
// ============================================================================

/// Renders one route as a log line.
#[must_use]
pub fn format_route(route: &RouteInfo) -> String {
    let noun = if route.handler_count == 1 {
        "handler"
    } else {
        "handlers"
    };
    format!(
        "[WS] {} --> {} ({} {noun})",
        route.key, route.label, route.handler_count
    )
}

/// Renders every route of `router`, ordered by key.
#[must_use]
pub fn format_routes(router: &Router) -> Vec<String> {
    router.routes().iter().map(format_route).collect()
}

/// Logs every route of `router`.
pub fn print_routes(router: &Router) {
    for line in format_routes(router) {
        debug!("{line}");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handler::{logger, not_found};
    use crate::route::RouteKey;

    #[test]
    fn test_format_routes() {
        let router = Router::new();
        let api = router.use_handlers([logger()]);
        api.handle(RouteKey::Wildcard, "not-found", [not_found()]).unwrap();
        api.handle_fn("chat", "chat.echo", |_| {}).unwrap();

        let lines = format_routes(&router);
        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&"[WS] * --> not-found (2 handlers)".to_string()));
        assert!(lines.iter().any(|l| l.ends_with("--> chat.echo (2 handlers)")));
    }

    #[test]
    fn test_format_single_handler() {
        let route = RouteInfo {
            key: RouteKey::from(7),
            label: "seven".to_string(),
            handler_count: 1,
        };
        assert_eq!(format_route(&route), "[WS] 7 --> seven (1 handler)");
    }

    #[test]
    fn test_print_routes_on_empty_router() {
        print_routes(&Router::new());
        assert!(format_routes(&Router::new()).is_empty());
    }
}
