//! HTTP server facade.
//!
//! # Responsibilities
//! - Acquire the listener (inherited descriptor, override port, config test)
//! - Run the drain coordinator with an HTTP dispatcher
//! - Drain on SIGINT/SIGTERM within the configured grace period
//!
//! # Entry Points
//! - [`serve`]: documented default timeouts (10s grace, 5s read, 10s write)
//! - [`serve_with_config`]: explicit [`DrainConfig`]
//! - [`run`] / [`run_with_err`]: plain bind of the given address with a grace
//!   period, for callers that do not use descriptor handoff
//! - [`HttpServer`]: caller-supplied listener and shutdown future

use std::future::Future;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{DrainConfig, StartupConfig};
use crate::http::dispatcher::HttpDispatcher;
use crate::lifecycle::drain::{DrainCoordinator, DrainReport};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals;
use crate::lifecycle::startup::{exit_config_test, exit_fatal};
use crate::net::inherit::CloexecPolicy;
use crate::net::listener::{acquire, Acquisition, BindSpec, BindSpecError, Listener};

/// Errors from the pass-through [`run_with_err`] entry point.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid address: {0}")]
    Address(#[from] BindSpecError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// HTTP server bound to a single listener.
pub struct HttpServer {
    router: Router,
    drain: DrainConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given timings.
    pub fn new(drain: DrainConfig, router: Router) -> Self {
        Self { router, drain }
    }

    pub fn drain_config(&self) -> &DrainConfig {
        &self.drain
    }

    /// Serve on `listener` until `shutdown` resolves, then drain.
    pub async fn run<F>(self, listener: Listener, shutdown: F) -> DrainReport
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            target_addr = %listener.target(),
            read_timeout = ?self.drain.read_timeout,
            write_timeout = ?self.drain.write_timeout,
            "Starting serve"
        );

        let dispatcher = HttpDispatcher::new(self.router, &self.drain);
        let report = DrainCoordinator::new(listener, dispatcher, self.drain.timeout)
            .run(shutdown)
            .await;

        tracing::info!(outcome = ?report.outcome, accepted = report.accepted, "HTTP server stopped");
        report
    }
}

/// Serve `router` on `addr` with the default timeouts.
///
/// If started by a socket manager (`EINHORN_FDS`) the address is ignored, and
/// a listen port override in `startup` takes precedence over its port.
pub async fn serve(addr: &str, startup: &StartupConfig, router: Router) -> DrainReport {
    serve_with_config(addr, startup, DrainConfig::default(), router).await
}

/// Serve `router` on `addr` with explicit timeouts.
///
/// Exits the process with status 0 in config test mode, and with status 1
/// if no listener can be acquired.
pub async fn serve_with_config(
    addr: &str,
    startup: &StartupConfig,
    drain: DrainConfig,
    router: Router,
) -> DrainReport {
    let listener = match acquire(addr, startup, CloexecPolicy::Strict).await {
        Ok(Acquisition::Ready(listener)) => listener,
        Ok(Acquisition::ConfigTestOnly { target }) => exit_config_test(&target),
        Err(e) => exit_fatal(&e),
    };

    let shutdown = Shutdown::new();
    let signal_task = signals::install(shutdown.clone());

    let report = HttpServer::new(drain, router)
        .run(listener, shutdown.subscribe().recv())
        .await;

    signal_task.abort();
    report
}

/// Serve `router` on `addr` and drain within `timeout` on SIGINT/SIGTERM.
///
/// Logs and exits with status 1 if `addr` cannot be bound.
pub async fn run(addr: &str, timeout: Duration, router: Router) -> DrainReport {
    match run_with_err(addr, timeout, router).await {
        Ok(report) => report,
        Err(e) => exit_fatal(&e),
    }
}

/// Like [`run`], but returns bind errors to the caller.
///
/// The address is bound as given: no descriptor inheritance, no port
/// override, no config test.
pub async fn run_with_err(addr: &str, timeout: Duration, router: Router) -> Result<DrainReport, ServeError> {
    let spec = BindSpec::parse(addr)?;
    let inner = TcpListener::bind((spec.bind_host(), spec.port()))
        .await
        .map_err(|source| ServeError::Bind {
            addr: spec.to_string(),
            source,
        })?;
    let listener = Listener::from_tokio(inner, spec.clone()).map_err(|source| ServeError::Bind {
        addr: spec.to_string(),
        source,
    })?;

    let shutdown = Shutdown::new();
    let signal_task = signals::install(shutdown.clone());

    let report = HttpServer::new(DrainConfig::with_timeout(timeout), router)
        .run(listener, shutdown.subscribe().recv())
        .await;

    signal_task.abort();
    Ok(report)
}
