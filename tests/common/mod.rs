//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::routing::{get, post};
use axum::Router;
use grace::config::{DrainConfig, StartupConfig};
use grace::http::HttpDispatcher;
use grace::lifecycle::{DrainCoordinator, DrainReport, DrainState, Shutdown};
use grace::net::{acquire, Acquisition, CloexecPolicy, ConnectionTracker, Listener};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A coordinator running on its own task.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub state: watch::Receiver<DrainState>,
    pub tracker: ConnectionTracker,
    pub handle: JoinHandle<DrainReport>,
}

impl RunningServer {
    /// Trigger shutdown and wait until the listener has been closed.
    pub async fn begin_drain(&mut self) {
        self.shutdown.trigger();
        self.state
            .wait_for(|s| *s != DrainState::Running)
            .await
            .unwrap();
    }

    /// Wait until at least `count` connections have been accepted and are live.
    pub async fn wait_for_connections(&self, count: u64) {
        while self.tracker.active_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn stop(mut self) -> DrainReport {
        self.begin_drain().await;
        self.handle.await.unwrap()
    }
}

/// Pick a port that is free right now.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Acquire a fresh listener for `addr` with no inherited descriptor.
pub async fn bind(addr: &str) -> Listener {
    match acquire(addr, &StartupConfig::new(), CloexecPolicy::Strict).await.unwrap() {
        Acquisition::Ready(listener) => listener,
        other => panic!("unexpected {other:?}"),
    }
}

/// Serve `router` on `listener` with `drain` timings.
pub fn start(listener: Listener, router: Router, drain: DrainConfig) -> RunningServer {
    let addr = listener.local_addr().unwrap();
    let coordinator = DrainCoordinator::new(listener, HttpDispatcher::new(router, &drain), drain.timeout);
    let state = coordinator.state();
    let tracker = coordinator.tracker();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(coordinator.run(shutdown.subscribe().recv()));

    RunningServer {
        addr,
        shutdown,
        state,
        tracker,
        handle,
    }
}

/// `/foo/bar` answers immediately; `/slow` reports on `entered` once the
/// handler runs, then sleeps for `delay`; `/upload` answers with the length
/// of the request body.
pub fn app(delay: Duration) -> (Router, mpsc::UnboundedReceiver<()>) {
    let (entered_tx, entered_rx) = mpsc::unbounded_channel();

    let router = Router::new()
        .route("/foo/bar", get(|| async { "foobar" }))
        .route(
            "/slow",
            get(move || {
                let entered_tx = entered_tx.clone();
                async move {
                    let _ = entered_tx.send(());
                    tokio::time::sleep(delay).await;
                    "slow"
                }
            }),
        )
        .route("/upload", post(|body: Bytes| async move { body.len().to_string() }));

    (router, entered_rx)
}

/// Client that opens a fresh connection per request.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub async fn get_text(client: &reqwest::Client, addr: SocketAddr, path: &str) -> (u16, String) {
    let response = client
        .get(format!("http://{addr}{path}"))
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.text().await.unwrap())
}
