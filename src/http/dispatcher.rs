//! HTTP dispatch for one accepted connection.
//!
//! # Responsibilities
//! - Serve HTTP/1.1 and HTTP/2 on the connection with an axum `Router`
//! - Bound request reads by the read timeout and handlers by the write timeout
//! - Stop keep-alive once the server starts draining, finishing the request
//!   in progress first
//! - Serve the first request of a connection accepted before the drain
//!   began, even if it arrives after
//! - Report connection errors for this connection only

use std::io;
use std::time::Duration;

use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use tokio::sync::watch;
use tower::ServiceExt;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use crate::config::DrainConfig;
use crate::lifecycle::drain::{DispatchError, Dispatcher};
use crate::net::connection::Connection;

/// Serves HTTP connections with an axum router.
#[derive(Clone)]
pub struct HttpDispatcher {
    router: Router,
    read_timeout: Duration,
}

impl HttpDispatcher {
    /// Wrap `router`, applying the read and write timeouts to every request.
    ///
    /// A handler that overruns the write timeout gets a 408 response. A
    /// request body that stalls for longer than the read timeout fails to
    /// read.
    #[allow(deprecated)]
    pub fn new(router: Router, drain: &DrainConfig) -> Self {
        let router = router
            .layer(TimeoutLayer::new(drain.write_timeout))
            .layer(RequestBodyTimeoutLayer::new(drain.read_timeout))
            .layer(TraceLayer::new_for_http());

        Self {
            router,
            read_timeout: drain.read_timeout,
        }
    }

    fn builder(&self) -> Builder<TokioExecutor> {
        let mut builder = Builder::new(TokioExecutor::new());
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(self.read_timeout);
        builder
            .http2()
            .timer(TokioTimer::new())
            .keep_alive_interval(self.read_timeout)
            .keep_alive_timeout(self.read_timeout);
        builder
    }
}

impl Dispatcher for HttpDispatcher {
    async fn dispatch(self, conn: Connection) -> Result<(), DispatchError> {
        let (stream, peer_addr, guard) = conn.into_parts();
        let mut drain = guard.drain_watch();
        let builder = self.builder();
        let router = self.router;
        let read_timeout = self.read_timeout;

        let (seen_tx, mut seen_rx) = watch::channel(false);

        let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
            seen_tx.send_replace(true);
            request.extensions_mut().insert(ConnectInfo(peer_addr));
            router.clone().oneshot(request)
        });

        let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
        tokio::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            _ = drain.draining() => {
                // Until its first request arrives hyper sees the connection
                // as idle and would close it unanswered.
                tokio::select! {
                    result = conn.as_mut() => result,
                    _ = async { let _ = seen_rx.wait_for(|seen| *seen).await; } => {
                        tracing::debug!(connection_id = %guard.id(), "Draining, closing after current request");
                        conn.as_mut().graceful_shutdown();
                        conn.await
                    }
                }
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
                    if hyper_err.is_timeout() {
                        tracing::debug!(connection_id = %guard.id(), peer_addr = %peer_addr, "Read timeout");
                        return Err(DispatchError::Timeout(read_timeout));
                    }
                    if hyper_err.is_incomplete_message() {
                        tracing::debug!(connection_id = %guard.id(), error = %hyper_err, "Interrupted request");
                        return Err(DispatchError::Connection(err));
                    }
                }
                match err.downcast_ref::<io::Error>().map(io::Error::kind) {
                    Some(io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset) => {
                        tracing::debug!(connection_id = %guard.id(), error = %err, "Connection reset by peer");
                    }
                    _ => {
                        tracing::warn!(connection_id = %guard.id(), peer_addr = %peer_addr, error = %err, "Error serving connection");
                    }
                }
                Err(DispatchError::Connection(err))
            }
        }
    }
}
