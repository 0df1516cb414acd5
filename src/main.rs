//! Demo server for graceful restarts.
//!
//! ```text
//! grace [-p PORT] [-t] [-c CONFIG] [ADDR]
//! ```
//!
//! Serves `GET /foo/bar` on ADDR (default `:9000`). Run it under a socket
//! manager that sets `EINHORN_FDS` to hand over a pre-bound listener, or on
//! its own to bind the address directly. SIGINT/SIGTERM drains and exits.

use std::path::PathBuf;
use std::process::ExitCode;

use axum::{routing::get, Router};
use clap::Parser;

use grace::config::loader::load_config;
use grace::config::{GraceConfig, StartupConfig};
use grace::observability::logging::init_logging;

#[derive(Parser)]
#[command(name = "grace")]
#[command(about = "HTTP server with listener handoff and graceful drain", long_about = None)]
struct Cli {
    /// Listener port; overrides the port of ADDR
    #[arg(short = 'p', long = "port")]
    port: Option<String>,

    /// Config test: validate configuration and exit without binding
    #[arg(short = 't', long = "config-test")]
    config_test: bool,

    /// TOML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Address to serve on (host:port or :port)
    addr: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => GraceConfig::default(),
    };

    init_logging(&config.observability.log_level);
    tracing::info!("grace v{} starting", env!("CARGO_PKG_VERSION"));

    let startup = StartupConfig::from_env(cli.port, cli.config_test)
        .with_reuse_port(config.listener.reuse_port);
    let addr = cli.addr.unwrap_or(config.listener.bind_address);

    tracing::info!(
        bind_address = %addr,
        listen_port = %startup.get_listen_port(),
        grace_period = ?config.drain.timeout,
        "Configuration loaded"
    );

    let app = Router::new().route("/foo/bar", get(|| async { "foobar" }));
    grace::serve_with_config(&addr, &startup, config.drain, app).await;

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
