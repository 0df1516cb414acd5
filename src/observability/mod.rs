//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (connection and drain counters)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → whatever metrics recorder the embedding application installs
//! ```

pub mod logging;
pub mod metrics;
