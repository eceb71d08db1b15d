//! One message cycle.
//!
//! The [`Dispatcher`] binds a [`Router`] to a [`RouteGetter`] and runs each
//! inbound message through its chain:
//!
//! 1. Acquire a [`Context`] from the pool
//! 2. Extract the route key with the getter
//! 3. Resolve the chain, substituting [`NotFound`](crate::handler::NotFound) for an empty one
//! 4. Run the chain inside the panic boundary
//! 5. Release the context and hand back the response

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{error, trace};

use crate::context::{Context, ContextPool, CycleOutcome};
use crate::handler::{Chain, not_found};
use crate::route::{RouteGetter, Router};

use super::Connection;

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes messages to handler chains.
///
/// Shared by every connection of a server.
pub struct Dispatcher {
    /// Route table view used for resolution.
    router: Router,
    /// Route key extractor.
    route_getter: RouteGetter,
    /// Context free list.
    pool: ContextPool,
    /// Chain used when resolution finds nothing.
    not_found: Chain,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with the default context pool.
    #[must_use]
    pub fn new(router: Router, route_getter: RouteGetter) -> Self {
        Self::with_pool(router, route_getter, ContextPool::default())
    }

    /// Creates a dispatcher with an explicit context pool.
    #[must_use]
    pub fn with_pool(router: Router, route_getter: RouteGetter, pool: ContextPool) -> Self {
        Self {
            router,
            route_getter,
            pool,
            not_found: Arc::from(vec![not_found()]),
        }
    }

    /// Returns the router.
    #[inline]
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the context pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Runs one message through its chain.
    ///
    /// Failures are logged here and never escape; the connection keeps
    /// serving.
    pub fn dispatch(&self, message: Vec<u8>, connection: Option<&Connection>) -> CycleOutcome {
        let mut ctx = self.pool.acquire();
        ctx.prepare(message, connection.cloned());

        let outcome = ctx.execute(|ctx| self.resolve(ctx));

        if let CycleOutcome::Failed { error, backtrace } = &outcome {
            error!(
                conn = ?connection.map(Connection::id),
                error = %error,
                %backtrace,
                "Message cycle failed"
            );
        }

        self.pool.release(ctx);
        outcome
    }

    /// Resolves the chain for the message in `ctx`.
    fn resolve(&self, ctx: &Context) -> Chain {
        let key = (self.route_getter)(ctx);
        let chain = self.router.resolve(&key);
        if chain.is_empty() {
            trace!(%key, "No route, using not-found handler");
            return Arc::clone(&self.not_found);
        }
        chain
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;
    use crate::handler::handler_fn;
    use crate::route::{RouteKey, constant, json_field};

    fn echo() -> crate::handler::HandlerRef {
        handler_fn(|ctx| {
            let body = ctx.request_body().to_vec();
            ctx.send_data(body).unwrap();
        })
    }

    fn body(outcome: CycleOutcome) -> Vec<u8> {
        match outcome {
            CycleOutcome::Responded(body) => body,
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_routes_to_chain() {
        let router = Router::new();
        router.handle("chat", "chat.echo", [echo()]).unwrap();
        let dispatcher = Dispatcher::new(router, constant("chat"));

        assert_eq!(body(dispatcher.dispatch(b"ping".to_vec(), None)), b"ping");
    }

    #[test]
    fn test_unroutable_message_gets_not_found() {
        let dispatcher = Dispatcher::new(Router::new(), json_field("path"));

        let outcome = dispatcher.dispatch(br#"{"path":"nowhere"}"#.to_vec(), None);
        assert_eq!(body(outcome), b"route not found");
    }

    #[test]
    fn test_wildcard_not_found_route() {
        let router = Router::new().use_handlers([]);
        router.handle(RouteKey::Wildcard, "not-found", [not_found()]).unwrap();
        router.handle("chat", "chat.echo", [echo()]).unwrap();
        let dispatcher = Dispatcher::new(router, json_field("path"));

        let outcome = dispatcher.dispatch(br#"{"path":"other"}"#.to_vec(), None);
        assert_eq!(body(outcome), b"route not found");
    }

    #[test]
    fn test_failed_cycle_is_contained_and_context_released() {
        let router = Router::new();
        router
            .handle_fn("boom", "boom", |_| panic!("handler exploded"))
            .unwrap();
        router.handle("chat", "chat.echo", [echo()]).unwrap();
        let dispatcher = Dispatcher::with_pool(router, json_field("path"), ContextPool::new(4));

        let failed = dispatcher.dispatch(br#"{"path":"boom"}"#.to_vec(), None);
        assert!(matches!(
            failed,
            CycleOutcome::Failed {
                error: Error::HandlerPanic { .. },
                ..
            }
        ));
        assert_eq!(dispatcher.pool().idle(), 1);

        let ok = dispatcher.dispatch(br#"{"path":"chat"}"#.to_vec(), None);
        assert_eq!(body(ok), br#"{"path":"chat"}"#);
    }

    #[test]
    fn test_panicking_route_getter_is_contained() {
        let getter: RouteGetter = Arc::new(|_: &Context| -> RouteKey { panic!("bad getter") });
        let dispatcher = Dispatcher::new(Router::new(), getter);

        let outcome = dispatcher.dispatch(b"x".to_vec(), None);
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
    }

    #[test]
    fn test_silent_chain_has_no_response() {
        let router = Router::new();
        router.handle_fn("quiet", "quiet", |_| {}).unwrap();
        let dispatcher = Dispatcher::new(router, constant("quiet"));

        assert!(matches!(
            dispatcher.dispatch(b"x".to_vec(), None),
            CycleOutcome::NoResponse
        ));
    }
}
