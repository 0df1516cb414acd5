//! Startup exits.
//!
//! Startup errors are not retried here: restarting a failed process is the
//! process manager's job. Both helpers end the process.

/// Exit successfully after a configuration test. Nothing has been bound.
pub fn exit_config_test(target: &str) -> ! {
    tracing::info!(target_addr = %target, "Config test mode, exiting");
    std::process::exit(0)
}

/// Log a fatal startup error and exit with status 1.
pub fn exit_fatal(error: &dyn std::error::Error) -> ! {
    tracing::error!(error = %error, "Fatal startup error");
    std::process::exit(1)
}
