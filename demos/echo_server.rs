//! Echo server routed on a JSON field.
//!
//! Demonstrates:
//! - Routing on the `"path"` field of JSON messages
//! - Shared logger middleware through a `use_handlers` view
//! - A wildcard route answering "route not found"
//! - Typed request binding and JSON responses
//! - Graceful shutdown on Ctrl+C
//!
//! Usage:
//!   cargo run --example echo_server
//!   cargo run --example echo_server -- --debug
//!   cargo run --example echo_server -- --addr 0.0.0.0:9000
//!
//! Then connect to `ws://127.0.0.1:8080/ws` and send
//! `{"path":"chat","text":"hello"}`.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use wsmux::{Context, RouteKey, Router, Server, debug, json_field, logger, not_found};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_ADDR: &str = "127.0.0.1:8080";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    addr: String,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let addr = args
            .iter()
            .position(|a| a == "--addr")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            addr,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatReply<'a> {
    path: &'a str,
    text: String,
}

#[derive(Debug, Serialize)]
struct WhoAmI {
    connection: Option<String>,
    peer: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

fn chat(ctx: &mut Context) {
    let request: ChatRequest = match ctx.bind_json() {
        Ok(request) => request,
        Err(e) => {
            let _ = ctx.send_text(&format!("bad request: {e}"));
            return;
        }
    };

    let reply = ChatReply {
        path: "chat",
        text: request.text,
    };
    if let Err(e) = ctx.send_json(&reply) {
        tracing::warn!(error = %e, "Reply not sent");
    }
}

fn whoami(ctx: &mut Context) {
    let reply = WhoAmI {
        connection: ctx.connection().map(|c| c.id().to_string()),
        peer: ctx.peer_addr().map(|addr| addr.to_string()),
    };
    let _ = ctx.send_json(&reply);
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let router = Router::new();
    let api = router.use_handlers([logger()]);

    api.handle(RouteKey::Wildcard, "not-found", [not_found()])?;
    api.handle_fn("chat", "chat.echo", chat)?;
    api.handle_fn("whoami", "session.whoami", whoami)?;

    debug::print_routes(&router);

    let server = Server::builder()
        .router(router)
        .route_getter(json_field("path"))
        .build()?;

    let listener = TcpListener::bind(&args.addr).await?;
    println!("Listening on ws://{}{}", listener.local_addr()?, server.path());
    println!("Press Ctrl+C to exit...");

    server
        .serve_with_shutdown(listener, async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug { "wsmux=debug" } else { "wsmux=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}
