//! Listener acquisition.
//!
//! # Responsibilities
//! - Resolve the requested bind address, applying the startup port override
//! - Adopt an inherited descriptor when the process manager provided one
//! - Otherwise bind a fresh IPv4 socket with address reuse enabled
//! - Short-circuit before any socket work when running a config test
//!
//! # Order
//! ```text
//! detect inherited fd → apply override port → config test? → adopt | bind
//! ```
//! A config test succeeds even when the address or override port is
//! malformed; the problem is logged instead.
//! Every entry point goes through [`acquire`], so the order is the same for
//! the bare listener and for the request-serving facade.

use std::fmt;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::config::StartupConfig;
use crate::lifecycle::startup::exit_config_test;
use crate::net::inherit::{self, AdoptError, CloexecPolicy, InheritedFd};

/// Backlog passed to `listen(2)` for freshly bound sockets.
pub const DEFAULT_BACKLOG: i32 = 1024;

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The bind address could not be parsed.
    InvalidAddress(BindSpecError),
    /// Host name resolution failed.
    Resolve { spec: String, source: std::io::Error },
    /// The address resolved, but not to any IPv4 address.
    NoIpv4Address(String),
    /// Failed to bind to address.
    Bind { addr: SocketAddr, source: std::io::Error },
    /// Failed to take over the inherited descriptor.
    Adopt(AdoptError),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerError::InvalidAddress(e) => write!(f, "Invalid bind address: {}", e),
            ListenerError::Resolve { spec, source } => {
                write!(f, "Failed to resolve {}: {}", spec, source)
            }
            ListenerError::NoIpv4Address(spec) => write!(f, "No IPv4 address for {}", spec),
            ListenerError::Bind { addr, source } => write!(f, "Failed to bind {}: {}", addr, source),
            ListenerError::Adopt(e) => write!(f, "Failed to adopt inherited listener: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::InvalidAddress(e) => Some(e),
            ListenerError::Resolve { source, .. } => Some(source),
            ListenerError::NoIpv4Address(_) => None,
            ListenerError::Bind { source, .. } => Some(source),
            ListenerError::Adopt(e) => Some(e),
            ListenerError::Accept(e) => Some(e),
        }
    }
}

/// Problems with the textual form of a bind address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindSpecError {
    #[error("{0:?} is missing a port (expected host:port or :port)")]
    MissingPort(String),

    #[error("{0:?} is not a valid port")]
    InvalidPort(String),
}

/// A requested bind address: `host:port`, or `:port` for all interfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindSpec {
    host: String,
    port: u16,
}

impl BindSpec {
    /// Parse `host:port`, `:port` or `[v6-host]:port`.
    pub fn parse(addr: &str) -> Result<Self, BindSpecError> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| BindSpecError::MissingPort(addr.to_string()))?;
        let port = parse_port(port)?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Host part; empty means every local interface.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host to hand to the resolver, with the empty host meaning 0.0.0.0.
    pub fn bind_host(&self) -> &str {
        if self.host.is_empty() {
            "0.0.0.0"
        } else {
            &self.host
        }
    }

    /// Port part, exactly as requested.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Apply the startup override: when a listen port was given it replaces
    /// this address's port, whatever it was.
    pub fn resolve(&self, startup: &StartupConfig) -> Result<Self, BindSpecError> {
        match startup.listen_port() {
            Some(port) => Ok(Self {
                host: self.host.clone(),
                port: parse_port(port)?,
            }),
            None => Ok(self.clone()),
        }
    }

    /// Resolve to the first IPv4 socket address for this spec.
    pub async fn to_ipv4_addr(&self) -> Result<SocketAddr, ListenerError> {
        let mut addrs = tokio::net::lookup_host((self.bind_host(), self.port))
            .await
            .map_err(|source| ListenerError::Resolve {
                spec: self.to_string(),
                source,
            })?;

        addrs
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| ListenerError::NoIpv4Address(self.to_string()))
    }
}

impl fmt::Display for BindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(port: &str) -> Result<u16, BindSpecError> {
    port.parse::<u16>()
        .map_err(|_| BindSpecError::InvalidPort(port.to_string()))
}

/// Where a listener's socket came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerSource {
    /// Adopted from the process manager.
    Inherited { fd: InheritedFd },
    /// Freshly bound by this process.
    Bound { addr: SocketAddr },
}

/// Result of running the acquisition sequence.
#[derive(Debug)]
pub enum Acquisition {
    /// A listener ready to accept.
    Ready(Listener),
    /// Config test mode: nothing was adopted or bound.
    ConfigTestOnly { target: String },
}

/// The single listening socket of a server instance.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    source: ListenerSource,
    requested: BindSpec,
    target: String,
}

impl Listener {
    /// Wrap an already-bound tokio listener.
    pub fn from_tokio(inner: TcpListener, requested: BindSpec) -> Result<Self, std::io::Error> {
        let addr = inner.local_addr()?;
        Ok(Self {
            inner,
            source: ListenerSource::Bound { addr },
            requested,
            target: addr.to_string(),
        })
    }

    /// Accept a new connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer_addr = %addr, "Connection accepted");
        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    pub fn source(&self) -> ListenerSource {
        self.source
    }

    pub fn is_inherited(&self) -> bool {
        matches!(self.source, ListenerSource::Inherited { .. })
    }

    /// The bind spec the caller asked for, before any override. For an
    /// inherited listener this is not where the socket is actually bound.
    pub fn requested(&self) -> &BindSpec {
        &self.requested
    }

    /// Human-readable description of what we listen on (`socketmaster:<fd>`
    /// for an inherited descriptor).
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Run the acquisition sequence for `addr`.
///
/// Never exits the process: config test mode is reported as
/// [`Acquisition::ConfigTestOnly`].
pub async fn acquire(
    addr: &str,
    startup: &StartupConfig,
    policy: CloexecPolicy,
) -> Result<Acquisition, ListenerError> {
    let inherited = startup.inherited_fd();
    if let Some(fd) = inherited {
        tracing::info!(fd = %fd, "Detected socketmaster, listening on inherited descriptor");
    }

    let resolved = BindSpec::parse(addr).and_then(|requested| {
        let effective = requested.resolve(startup)?;
        Ok((requested, effective))
    });

    if startup.config_test() {
        let target = match (inherited, &resolved) {
            (Some(fd), _) => format!("socketmaster:{}", fd),
            (None, Ok((_, effective))) => effective.to_string(),
            (None, Err(e)) => {
                tracing::warn!(address = %addr, error = %e, "Bind address would be rejected");
                addr.to_string()
            }
        };
        return Ok(Acquisition::ConfigTestOnly { target });
    }

    let (requested, effective) = resolved.map_err(ListenerError::InvalidAddress)?;
    if effective != requested {
        tracing::debug!(requested = %requested, effective = %effective, "Listen port overridden");
    }

    if let Some(fd) = inherited {
        if let Some(std_listener) = inherit::adopt(fd, policy).map_err(ListenerError::Adopt)? {
            let inner = TcpListener::from_std(std_listener).map_err(|e| {
                ListenerError::Adopt(AdoptError::Setup { fd, source: e })
            })?;
            return Ok(Acquisition::Ready(Listener {
                inner,
                source: ListenerSource::Inherited { fd },
                requested,
                target: format!("socketmaster:{}", fd),
            }));
        }
        tracing::warn!(fd = %fd, address = %effective, "Falling back to a fresh bind");
    }

    let socket_addr = effective.to_ipv4_addr().await?;
    let std_listener = bind_reusable(socket_addr, startup.reuse_port())
        .map_err(|source| ListenerError::Bind { addr: socket_addr, source })?;
    let inner = TcpListener::from_std(std_listener)
        .map_err(|source| ListenerError::Bind { addr: socket_addr, source })?;
    let local_addr = inner
        .local_addr()
        .map_err(|source| ListenerError::Bind { addr: socket_addr, source })?;

    tracing::info!(
        address = %local_addr,
        reuse_port = startup.reuse_port(),
        "Listener bound"
    );

    Ok(Acquisition::Ready(Listener {
        inner,
        source: ListenerSource::Bound { addr: local_addr },
        requested,
        target: local_addr.to_string(),
    }))
}

/// Acquire a listener for any TCP protocol, not only HTTP.
///
/// In config test mode the process exits with status 0 before any socket is
/// adopted or bound. Failing to mark an inherited descriptor close-on-exec is
/// logged, not fatal.
pub async fn listen(addr: &str, startup: &StartupConfig) -> Result<Listener, ListenerError> {
    match acquire(addr, startup, CloexecPolicy::BestEffort).await? {
        Acquisition::Ready(listener) => Ok(listener),
        Acquisition::ConfigTestOnly { target } => exit_config_test(&target),
    }
}

/// Bind a non-blocking IPv4 listener with SO_REUSEADDR (and optionally
/// SO_REUSEPORT) set before `bind(2)`.
pub fn bind_reusable(addr: SocketAddr, reuse_port: bool) -> std::io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    if reuse_port {
        socket.set_reuse_port(true)?;
    }
    #[cfg(not(all(unix, not(target_os = "solaris"), not(target_os = "illumos"))))]
    if reuse_port {
        tracing::warn!("SO_REUSEPORT is not supported on this platform, ignoring");
    }

    socket.bind(&addr.into())?;
    socket.listen(DEFAULT_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_port_only_shorthand() {
        let spec = BindSpec::parse(":9000").unwrap();
        assert_eq!(spec.host(), "");
        assert_eq!(spec.port(), 9000);
        assert_eq!(spec.to_string(), ":9000");
    }

    #[test]
    fn parse_host_and_port() {
        let spec = BindSpec::parse("127.0.0.1:8080").unwrap();
        assert_eq!(spec.host(), "127.0.0.1");
        assert_eq!(spec.port(), 8080);

        let v6 = BindSpec::parse("[::1]:8080").unwrap();
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.to_string(), "[::1]:8080");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!(BindSpec::parse("9000"), Err(BindSpecError::MissingPort(_))));
        assert!(matches!(BindSpec::parse("host:"), Err(BindSpecError::InvalidPort(_))));
        assert!(matches!(BindSpec::parse("host:http"), Err(BindSpecError::InvalidPort(_))));
        assert!(matches!(BindSpec::parse(":70000"), Err(BindSpecError::InvalidPort(_))));
    }

    #[test]
    fn override_port_always_wins() {
        let startup = StartupConfig::new().with_listen_port("9100");
        for addr in [":9000", "127.0.0.1:1", "localhost:65535", ":0"] {
            let resolved = BindSpec::parse(addr).unwrap().resolve(&startup).unwrap();
            assert_eq!(resolved.port(), 9100, "override ignored for {addr}");
        }
    }

    #[test]
    fn override_keeps_host() {
        let startup = StartupConfig::new().with_listen_port("9100");
        let resolved = BindSpec::parse("127.0.0.1:9000").unwrap().resolve(&startup).unwrap();
        assert_eq!(resolved.host(), "127.0.0.1");
    }

    #[test]
    fn no_override_is_identity() {
        let spec = BindSpec::parse("127.0.0.1:9000").unwrap();
        assert_eq!(spec.resolve(&StartupConfig::new()).unwrap(), spec);
    }

    #[test]
    fn invalid_override_rejected() {
        let startup = StartupConfig::new().with_listen_port("abc");
        let spec = BindSpec::parse(":9000").unwrap();
        assert!(matches!(spec.resolve(&startup), Err(BindSpecError::InvalidPort(_))));
    }

    #[tokio::test]
    async fn config_test_short_circuits_for_every_address() {
        // Ports that would fail to bind prove nothing was bound.
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let busy = holder.local_addr().unwrap().port();
        let startup = StartupConfig::new().with_config_test(true);

        for addr in [":9000".to_string(), format!("127.0.0.1:{busy}"), "203.0.113.1:80".to_string()] {
            let acquisition = acquire(&addr, &startup, CloexecPolicy::Strict).await.unwrap();
            assert!(matches!(acquisition, Acquisition::ConfigTestOnly { .. }), "{addr}");
        }
    }

    #[tokio::test]
    async fn config_test_tolerates_malformed_input() {
        let startup = StartupConfig::new().with_config_test(true);
        match acquire("no-port", &startup, CloexecPolicy::Strict).await.unwrap() {
            Acquisition::ConfigTestOnly { target } => assert_eq!(target, "no-port"),
            other => panic!("unexpected {other:?}"),
        }

        let startup = startup.with_listen_port("abc");
        let acquisition = acquire(":9000", &startup, CloexecPolicy::Strict).await.unwrap();
        assert!(matches!(acquisition, Acquisition::ConfigTestOnly { .. }));
    }

    #[tokio::test]
    async fn config_test_reports_inherited_target() {
        let startup = StartupConfig::new()
            .with_config_test(true)
            .with_inherited_fd(InheritedFd::new(1000).unwrap());

        match acquire(":9000", &startup, CloexecPolicy::Strict).await.unwrap() {
            Acquisition::ConfigTestOnly { target } => assert_eq!(target, "socketmaster:1000"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn fresh_bind_uses_ipv4() {
        let startup = StartupConfig::new();
        let listener = match acquire("127.0.0.1:0", &startup, CloexecPolicy::Strict).await.unwrap() {
            Acquisition::Ready(l) => l,
            other => panic!("unexpected {other:?}"),
        };

        let addr = listener.local_addr().unwrap();
        assert!(addr.is_ipv4());
        assert_ne!(addr.port(), 0);
        assert!(!listener.is_inherited());
        assert_eq!(listener.requested().port(), 0);
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        // Without SO_REUSEPORT a second listener on an active port fails.
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();

        let err = acquire(&format!("127.0.0.1:{port}"), &StartupConfig::new(), CloexecPolicy::Strict)
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[test]
    fn reusable_sockets_share_port_with_reuse_port() {
        let first = bind_reusable("127.0.0.1:0".parse().unwrap(), true).unwrap();
        let addr = first.local_addr().unwrap();

        let second = bind_reusable(addr, true).unwrap();
        assert_eq!(second.local_addr().unwrap(), addr);
    }
}
