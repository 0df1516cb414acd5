//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! EINHORN_FDS / bind address
//!     → inherit.rs (adopt pre-opened descriptor, close-on-exec)
//!     → listener.rs (override port, config test, fresh reusable bind)
//!     → Listener (moved into the drain coordinator)
//!
//! Accepted TCP connection
//!     → connection.rs (id, live count, drain watch)
//!     → Hand off to a dispatcher
//! ```
//!
//! # Design Decisions
//! - One listener per server instance
//! - Malformed or unusable inherited descriptors fall back to a fresh bind
//! - Fresh sockets always set SO_REUSEADDR so a successor can rebind at once

pub mod connection;
pub mod inherit;
pub mod listener;

pub use connection::{Connection, ConnectionGuard, ConnectionId, ConnectionTracker, DrainWatch};
pub use inherit::{CloexecPolicy, InheritedFd, EINHORN_FDS};
pub use listener::{acquire, listen, Acquisition, BindSpec, Listener, ListenerError, ListenerSource};
