//! Graceful restart for single-listener servers.
//!
//! A new process either adopts a listening socket handed over by a process
//! manager (`EINHORN_FDS`) or binds its own with address reuse enabled. On
//! SIGINT/SIGTERM it closes the listener at once, so a successor can take the
//! port, and gives in-flight connections a bounded grace period to finish.
//!
//! ```text
//! serve / serve_with_config          listen (any TCP protocol)
//!          │                                  │
//!          ▼                                  ▼
//!   net::listener::acquire  ◀──── StartupConfig (-p, -t, EINHORN_FDS)
//!          │ Listener (moved)
//!          ▼
//!   lifecycle::drain::DrainCoordinator ──▶ Dispatcher (HTTP or dispatch_fn)
//! ```

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{DrainConfig, GraceConfig, StartupConfig};
pub use http::{run, run_with_err, serve, serve_with_config, HttpServer, ServeError};
pub use lifecycle::{dispatch_fn, DispatchError, Dispatcher, DrainCoordinator, DrainOutcome, DrainReport, Shutdown};
pub use net::{listen, BindSpec, Listener, ListenerError, EINHORN_FDS};
