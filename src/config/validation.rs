//! Configuration validation.
//!
//! Returns every problem found, not just the first. Pure function of the
//! parsed config; runs before the config is accepted.

use std::time::Duration;

use thiserror::Error;

use crate::config::schema::GraceConfig;
use crate::net::listener::BindSpec;

/// A single semantic problem in a configuration file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("listener.bind_address {address:?}: {reason}")]
    BindAddress { address: String, reason: String },

    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("observability.log_level {0:?} is not a valid filter")]
    LogLevel(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GraceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = BindSpec::parse(&config.listener.bind_address) {
        errors.push(ValidationError::BindAddress {
            address: config.listener.bind_address.clone(),
            reason: e.to_string(),
        });
    }

    let durations = [
        ("drain.timeout", config.drain.timeout),
        ("drain.read_timeout", config.drain.read_timeout),
        ("drain.write_timeout", config.drain.write_timeout),
    ];
    for (field, value) in durations {
        if value == Duration::ZERO {
            errors.push(ValidationError::ZeroDuration { field });
        }
    }

    if tracing_subscriber::EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
