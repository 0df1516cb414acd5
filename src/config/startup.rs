//! Process-level startup configuration.
//!
//! Holds the values that are decided once, before any serving begins:
//! the listener port override, the config-test switch, and the inherited
//! descriptor named by `EINHORN_FDS`. It is built explicitly by the entry
//! point and passed by reference into every acquisition call.

use crate::net::inherit::{InheritedFd, EINHORN_FDS};

/// Startup values shared by every listener acquisition path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupConfig {
    listen_port: Option<String>,
    config_test: bool,
    inherited_fd: Option<InheritedFd>,
    reuse_port: bool,
}

impl StartupConfig {
    /// Configuration with no override, no config test and no inherited
    /// descriptor. Does not look at the environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from command-line values and the process environment.
    ///
    /// `EINHORN_FDS` is read here and nowhere else.
    pub fn from_env(listen_port: Option<String>, config_test: bool) -> Self {
        let inherited_fd = InheritedFd::parse(std::env::var(EINHORN_FDS).ok().as_deref());
        Self {
            listen_port: listen_port.filter(|p| !p.is_empty()),
            config_test,
            inherited_fd,
            reuse_port: false,
        }
    }

    /// Override the port of every bind address.
    pub fn with_listen_port(mut self, port: impl Into<String>) -> Self {
        let port = port.into();
        self.listen_port = (!port.is_empty()).then_some(port);
        self
    }

    /// Exit successfully instead of creating any listener.
    pub fn with_config_test(mut self, enabled: bool) -> Self {
        self.config_test = enabled;
        self
    }

    /// Adopt this descriptor instead of binding a fresh socket.
    pub fn with_inherited_fd(mut self, fd: InheritedFd) -> Self {
        self.inherited_fd = Some(fd);
        self
    }

    /// Set SO_REUSEPORT on freshly bound sockets.
    pub fn with_reuse_port(mut self, enabled: bool) -> Self {
        self.reuse_port = enabled;
        self
    }

    /// The port override, if one was given.
    pub fn listen_port(&self) -> Option<&str> {
        self.listen_port.as_deref()
    }

    /// The port override as a string, empty when none was given.
    ///
    /// Applications use this to learn the port they were told to serve on.
    pub fn get_listen_port(&self) -> &str {
        self.listen_port.as_deref().unwrap_or("")
    }

    pub fn config_test(&self) -> bool {
        self.config_test
    }

    pub fn inherited_fd(&self) -> Option<InheritedFd> {
        self.inherited_fd
    }

    pub fn reuse_port(&self) -> bool {
        self.reuse_port
    }
}
