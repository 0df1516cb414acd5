//! Drain coordinator: accept loop plus bounded graceful shutdown.
//!
//! # States
//! ```text
//! Running ──(shutdown future resolves)──▶ Draining ──(all done | grace elapsed)──▶ Stopped
//! ```
//!
//! - Running: accept connections, hand each one to the dispatcher on its own task
//! - Draining: the listener is already closed, so a successor can bind the
//!   port; in-flight connections are told to wind down and may keep running
//! - Stopped: terminal; anything still running when the grace period ends is
//!   aborted

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};

use crate::net::connection::{Connection, ConnectionId, ConnectionTracker};
use crate::net::listener::Listener;
use crate::observability::metrics;

/// Pause after a failed `accept` so a persistent error (EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Error produced while dispatching a single connection.
///
/// Only ever logged; it never affects other connections or the drain.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection error: {0}")]
    Connection(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Something that can serve one accepted connection to completion.
///
/// The coordinator only needs to start a unit of work and learn when it
/// finishes; it knows nothing about the protocol spoken on the socket.
pub trait Dispatcher: Clone + Send + Sync + 'static {
    fn dispatch(self, conn: Connection) -> impl Future<Output = Result<(), DispatchError>> + Send;
}

/// Dispatcher built from a closure, see [`dispatch_fn`].
#[derive(Debug, Clone)]
pub struct DispatchFn<F> {
    f: F,
}

/// Use a closure as a [`Dispatcher`], for raw-socket servers.
pub fn dispatch_fn<F, Fut>(f: F) -> DispatchFn<F>
where
    F: Fn(Connection) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    DispatchFn { f }
}

impl<F, Fut> Dispatcher for DispatchFn<F>
where
    F: Fn(Connection) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    fn dispatch(self, conn: Connection) -> impl Future<Output = Result<(), DispatchError>> + Send {
        (self.f)(conn)
    }
}

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Running,
    Draining,
    Stopped,
}

/// How the drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight connection finished within the grace period.
    Graceful,
    /// The grace period elapsed; this many connections were aborted.
    Forced { abandoned: usize },
}

/// Summary returned once the coordinator reaches `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub outcome: DrainOutcome,
    /// Connections accepted while running.
    pub accepted: u64,
}

/// Owns the listener for the lifetime of a server instance.
pub struct DrainCoordinator<D> {
    listener: Listener,
    dispatcher: D,
    grace_period: Duration,
    tracker: ConnectionTracker,
    state_tx: watch::Sender<DrainState>,
}

impl<D: Dispatcher> DrainCoordinator<D> {
    pub fn new(listener: Listener, dispatcher: D, grace_period: Duration) -> Self {
        let (state_tx, _) = watch::channel(DrainState::Running);
        Self {
            listener,
            dispatcher,
            grace_period,
            tracker: ConnectionTracker::new(),
            state_tx,
        }
    }

    /// Watch state transitions. Subscribe before calling [`run`](Self::run).
    pub fn state(&self) -> watch::Receiver<DrainState> {
        self.state_tx.subscribe()
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Accept and dispatch until `shutdown` resolves, then drain.
    pub async fn run<F>(self, shutdown: F) -> DrainReport
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            dispatcher,
            grace_period,
            tracker,
            state_tx,
        } = self;

        let mut tasks = JoinSet::new();
        let mut accepted = 0u64;
        let mut shutdown = std::pin::pin!(shutdown);

        tracing::info!(
            target_addr = %listener.target(),
            grace_period = ?grace_period,
            "Accepting connections"
        );

        loop {
            tokio::select! {
                // Shutdown is checked before accept so nothing new is
                // dispatched once the signal has been seen.
                biased;

                _ = shutdown.as_mut() => {
                    tracing::info!("Shutdown requested, no longer accepting connections");
                    break;
                }

                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_result(result);
                }

                result = listener.accept() => match result {
                    Ok((stream, peer_addr)) => {
                        accepted += 1;
                        metrics::connection_accepted();
                        let conn = Connection::new(stream, peer_addr, tracker.track());
                        let dispatcher = dispatcher.clone();
                        tasks.spawn(async move {
                            let id = conn.id();
                            dispatcher.dispatch(conn).await.map_err(|e| (id, e))
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        drop(listener);
        state_tx.send_replace(DrainState::Draining);
        tracker.start_draining();

        tracing::info!(
            in_flight = tasks.len(),
            grace_period = ?grace_period,
            "Listener closed, draining"
        );

        let drained = tokio::time::timeout(grace_period, async {
            while let Some(result) = tasks.join_next().await {
                log_task_result(result);
            }
        })
        .await;

        let outcome = match drained {
            Ok(()) => {
                tracing::info!("All connections drained");
                DrainOutcome::Graceful
            }
            Err(_) => {
                let abandoned = tasks.len();
                tracing::warn!(
                    abandoned,
                    grace_period = ?grace_period,
                    "Grace period elapsed, aborting remaining connections"
                );
                tasks.shutdown().await;
                metrics::drain_forced();
                DrainOutcome::Forced { abandoned }
            }
        };

        state_tx.send_replace(DrainState::Stopped);
        DrainReport { outcome, accepted }
    }
}

fn log_task_result(result: Result<Result<(), (ConnectionId, DispatchError)>, JoinError>) {
    match result {
        Ok(Ok(())) => {}
        Ok(Err((id, e))) => {
            metrics::dispatch_error();
            tracing::debug!(connection_id = %id, error = %e, "Dispatch failed");
        }
        Err(e) if e.is_panic() => {
            metrics::dispatch_error();
            tracing::error!(error = %e, "Dispatch task panicked");
        }
        Err(_) => {}
    }
}
