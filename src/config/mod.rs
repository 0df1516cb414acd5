//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line (-p, -t, -c) + EINHORN_FDS
//!     → startup.rs (StartupConfig, built once before serving)
//!
//! optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GraceConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - No process-wide globals: StartupConfig is passed into every acquisition call
//! - All file fields have defaults so an absent file behaves like an empty one
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod startup;
pub mod validation;

pub use schema::DrainConfig;
pub use schema::GraceConfig;
pub use schema::ListenerConfig;
pub use startup::StartupConfig;
