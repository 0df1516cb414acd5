//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config test → exit 0 before any socket exists
//!     Fatal startup error → log → exit 1
//!
//! Drain (drain.rs):
//!     Running → shutdown signal → close listener → Draining → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Listener is closed as soon as draining starts, not when it ends
//! - Draining has a deadline: forced abort after the grace period
//! - Startup failures are never retried in-process

pub mod drain;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use drain::{
    dispatch_fn, DispatchError, DispatchFn, Dispatcher, DrainCoordinator, DrainOutcome, DrainReport,
    DrainState,
};
pub use shutdown::{Shutdown, ShutdownSignal};
