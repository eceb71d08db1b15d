//! Message dispatch benchmark suite.
//!
//! Benchmarks one message cycle and a full round trip:
//! - Chain lengths: 1, 4, 16 handlers
//! - Pooled vs unpooled contexts
//! - Echo round trip over an in-memory WebSocket
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Runtime;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;
use wsmux::{
    Connection, ConnectionConfig, ContextPool, Dispatcher, HandlerRef, RouteKey, Router,
    handler_fn, json_field, not_found,
};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const CHAIN_LENGTHS: &[usize] = &[1, 4, 16];

const MESSAGE: &[u8] = br#"{"path":"chat","text":"hello"}"#;

// ============================================================================
// Fixtures
// ============================================================================

fn passthrough() -> HandlerRef {
    handler_fn(|ctx| {
        ctx.set("seen", true);
    })
}

fn echo() -> HandlerRef {
    handler_fn(|ctx| {
        let body = ctx.request_body().to_vec();
        let _ = ctx.send_data(body);
    })
}

fn router(chain_len: usize) -> Router {
    let router = Router::new();
    let api = router.use_handlers((1..chain_len).map(|_| passthrough()));
    let _ = api.handle(RouteKey::Wildcard, "not-found", [not_found()]);
    let _ = api.handle("chat", "chat.echo", [echo()]);
    router
}

// ============================================================================
// Benchmark: Message Cycle
// ============================================================================

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for &len in CHAIN_LENGTHS {
        for (name, capacity) in [("pooled", 64), ("unpooled", 0)] {
            let dispatcher =
                Dispatcher::with_pool(router(len), json_field("path"), ContextPool::new(capacity));

            group.bench_with_input(BenchmarkId::new(name, len), &len, |b, _| {
                b.iter(|| black_box(dispatcher.dispatch(MESSAGE.to_vec(), None)));
            });
        }
    }

    let dispatcher = Dispatcher::new(router(1), json_field("path"));
    group.bench_function("not_found", |b| {
        b.iter(|| black_box(dispatcher.dispatch(br#"{"path":"missing"}"#.to_vec(), None)));
    });

    group.finish();
}

// ============================================================================
// Benchmark: Round Trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let (_connection, client) = rt.block_on(async {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let config = ConnectionConfig::new();
        let server =
            WebSocketStream::from_raw_socket(server_io, Role::Server, Some(config.websocket_config()))
                .await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

        let dispatcher = Arc::new(Dispatcher::new(router(4), json_field("path")));
        let connection = Connection::spawn(server, None, dispatcher, config);
        (connection, client)
    });
    let client = tokio::sync::Mutex::new(client);

    c.bench_function("round_trip/echo", |b| {
        b.to_async(&rt).iter(|| async {
            let mut client = client.lock().await;
            client.send(Message::binary(MESSAGE.to_vec())).await.unwrap();
            while let Some(Ok(reply)) = client.next().await {
                if reply.is_text() {
                    black_box(reply);
                    break;
                }
            }
        });
    });
}

criterion_group!(benches, bench_dispatch, bench_round_trip);
criterion_main!(benches);
