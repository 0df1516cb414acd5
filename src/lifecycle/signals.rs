//! OS signal handling.
//!
//! SIGINT (Ctrl+C) and SIGTERM both start a graceful drain. Installing a
//! handler can only fail at startup; in that case we log and never fire,
//! leaving the process to be stopped the hard way.

use crate::lifecycle::shutdown::Shutdown;

#[cfg(unix)]
type Terminate = Option<tokio::signal::unix::Signal>;
#[cfg(not(unix))]
type Terminate = ();

#[cfg(unix)]
fn register_terminate() -> Terminate {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install SIGTERM handler");
            None
        }
    }
}

#[cfg(not(unix))]
fn register_terminate() -> Terminate {}

/// Wait for SIGINT or SIGTERM.
async fn wait(terminate: Terminate) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async move {
        match terminate {
            Some(mut sigterm) => {
                sigterm.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = {
        let () = terminate;
        std::future::pending::<()>()
    };

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

/// Trigger `shutdown` when the process receives SIGINT or SIGTERM.
///
/// The SIGTERM handler is registered before this returns. Must be called
/// from within a tokio runtime.
pub fn install(shutdown: Shutdown) -> tokio::task::JoinHandle<()> {
    let terminate = register_terminate();
    tokio::spawn(async move {
        wait(terminate).await;
        tracing::info!("Shutdown signal received");
        shutdown.trigger();
    })
}
