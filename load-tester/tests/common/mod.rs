//! Common Test Utilities for Integration Tests
//!
//! Local stand-ins for the live API and hub, bound to ephemeral ports.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use loadtester::runner::ScenarioStats;
use loadtester::{Environment, LoadConfig, ScenarioContext};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Request counter shared with the fake API
#[derive(Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

impl Hits {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

async fn ok(State(hits): State<Hits>) -> impl IntoResponse {
    hits.0.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({ "data": [] }))
}

async fn fail(State(hits): State<Hits>) -> impl IntoResponse {
    hits.0.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn slow(State(hits): State<Hits>) -> impl IntoResponse {
    hits.0.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    "late"
}

/// Fake API serving the five endpoints under `/api` plus `/ok`, `/fail` and `/slow`
pub async fn start_api_server() -> (SocketAddr, Hits, JoinHandle<()>) {
    let hits = Hits::default();

    let app = Router::new()
        .route("/ok", get(ok))
        .route("/fail", get(fail))
        .route("/slow", get(slow))
        .route("/api/League/get-featured-9-leagues", get(ok))
        .route("/api/Match/get-daily-matches", get(ok))
        .route("/api/League/get-league-sponsors", get(ok))
        .route("/api/News/get-all-news-paginated", get(ok))
        .route("/api/Story/get-stories", get(ok))
        .with_state(hits.clone());

    let (addr, handle) = serve(app).await;
    (addr, hits, handle)
}

/// How the fake hub behaves after receiving the handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HubBehavior {
    /// Answer with the empty handshake response
    Reply,
    /// Never answer
    Silent,
}

#[derive(Clone)]
struct HubState {
    behavior: HubBehavior,
    frames: mpsc::UnboundedSender<String>,
}

async fn hub_handler(ws: WebSocketUpgrade, State(state): State<HubState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| hub_session(socket, state))
}

async fn hub_session(mut socket: WebSocket, state: HubState) {
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                let _ = state.frames.send(text.to_string());
                if state.behavior == HubBehavior::Reply {
                    let _ = socket.send(Message::Text("{}\u{1e}".into())).await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

/// Fake hub at `/hub`; every text frame it receives is forwarded to the channel
pub async fn start_hub_server(
    behavior: HubBehavior,
) -> (SocketAddr, mpsc::UnboundedReceiver<String>, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let app = Router::new().route("/hub", get(hub_handler)).with_state(HubState {
        behavior,
        frames: tx,
    });

    let (addr, handle) = serve(app).await;
    (addr, rx, handle)
}

async fn serve(app: Router) -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, handle)
}

/// Plain TCP server that accepts connections and drops them at once
pub async fn start_dropping_tcp_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            drop(socket);
        }
    });

    (addr, handle)
}

/// An address nothing is listening on
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Standalone iteration context backed by fresh stats
pub fn test_context(token: CancellationToken) -> (ScenarioContext, Arc<ScenarioStats>) {
    let stats = Arc::new(ScenarioStats::new("test"));
    let ctx = ScenarioContext::new(Arc::from("test"), 0, 0, token, stats.clone());
    (ctx, stats)
}

/// Resolve a configuration from literal pairs
pub fn test_config(pairs: &[(&str, &str)]) -> LoadConfig {
    let env: Environment = pairs.iter().copied().collect();
    LoadConfig::resolve(&env, chrono::Utc::now()).unwrap()
}
