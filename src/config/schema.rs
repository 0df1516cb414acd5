//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Durations are written in seconds and may be fractional (`timeout = 0.5`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::logging::DEFAULT_FILTER;

/// Root configuration file layout.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GraceConfig {
    /// Listener settings (bind address, socket options).
    pub listener: ListenerConfig,

    /// Drain timings.
    pub drain: DrainConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., ":9000" or "127.0.0.1:9000").
    pub bind_address: String,

    /// Also set SO_REUSEPORT on freshly bound sockets, letting an old and a
    /// new process hold the port at the same time.
    pub reuse_port: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: ":9000".to_string(),
            reuse_port: false,
        }
    }
}

/// Timings applied while serving and draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DrainConfig {
    /// Shutdown grace period: how long in-flight work may run after the
    /// stop signal before it is forcibly ended.
    #[serde(with = "secs")]
    pub timeout: Duration,

    /// Time allowed to read a request's headers.
    #[serde(with = "secs")]
    pub read_timeout: Duration,

    /// Time allowed to produce a response once the request has been read.
    #[serde(with = "secs")]
    pub write_timeout: Duration,
}

impl DrainConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

    /// Build a config with an explicit grace period and the default
    /// read/write timeouts.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            read_timeout: Self::DEFAULT_READ_TIMEOUT,
            write_timeout: Self::DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_FILTER.to_string(),
        }
    }
}

/// Serde adapter for durations expressed as (fractional) seconds.
mod secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
