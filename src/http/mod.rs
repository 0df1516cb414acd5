//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! serve / serve_with_config / run
//!     → net::listener (acquire one listener)
//!     → server.rs (HttpServer: drain coordinator + signals)
//!     → dispatcher.rs (hyper-util connection, axum Router, timeouts)
//! ```

pub mod dispatcher;
pub mod server;

pub use dispatcher::HttpDispatcher;
pub use server::{run, run_with_err, serve, serve_with_config, HttpServer, ServeError};
