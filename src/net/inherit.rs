//! Inherited listening descriptors.
//!
//! # Responsibilities
//! - Parse the `EINHORN_FDS` value handed over by the process manager
//! - Check that the descriptor is a listening stream socket before adopting it
//! - Mark the adopted descriptor close-on-exec so it does not leak into
//!   processes we spawn later

use std::fmt;

use thiserror::Error;

/// Environment variable naming a pre-opened listening descriptor.
pub const EINHORN_FDS: &str = "EINHORN_FDS";

/// Descriptor number of a socket opened by a parent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InheritedFd(i32);

impl InheritedFd {
    /// Wrap a raw descriptor number. Negative numbers are never valid.
    pub fn new(fd: i32) -> Option<Self> {
        (fd >= 0).then_some(Self(fd))
    }

    /// Parse the value of `EINHORN_FDS`.
    ///
    /// An absent, non-integer or negative value yields `None`, exactly as if
    /// the variable were unset.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        let value = value?;
        match value.parse::<i32>() {
            Ok(fd) => {
                let parsed = Self::new(fd);
                if parsed.is_none() {
                    tracing::debug!(value = %value, "Ignoring negative {}", EINHORN_FDS);
                }
                parsed
            }
            Err(e) => {
                tracing::debug!(value = %value, error = %e, "Ignoring malformed {}", EINHORN_FDS);
                None
            }
        }
    }

    pub fn as_raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for InheritedFd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How strictly to treat a failure to mark the descriptor close-on-exec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloexecPolicy {
    /// Failure aborts adoption with an error.
    Strict,
    /// Failure is logged and adoption continues.
    BestEffort,
}

/// Errors raised while adopting an inherited descriptor.
#[derive(Debug, Error)]
pub enum AdoptError {
    #[error("failed to mark descriptor {fd} close-on-exec: {source}")]
    Cloexec {
        fd: InheritedFd,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to prepare descriptor {fd} for async use: {source}")]
    Setup {
        fd: InheritedFd,
        #[source]
        source: std::io::Error,
    },
}

/// Take ownership of an inherited listening socket.
///
/// Returns `Ok(None)` when the descriptor is not a usable stream socket; the
/// caller then falls back to a fresh bind. The descriptor is only taken over
/// (and later closed) when adoption succeeds.
#[cfg(unix)]
pub fn adopt(
    fd: InheritedFd,
    policy: CloexecPolicy,
) -> Result<Option<std::net::TcpListener>, AdoptError> {
    use socket2::{SockRef, Type};
    use std::os::fd::{BorrowedFd, FromRawFd};

    // SAFETY: the process manager hands us an open descriptor and nothing
    // else in this process closes it while it is borrowed here.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd.as_raw()) };
    let socket = SockRef::from(&borrowed);

    match socket.r#type() {
        Ok(ty) if ty == Type::STREAM => {}
        Ok(_) => {
            tracing::warn!(fd = %fd, "Inherited descriptor is not a stream socket, ignoring");
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!(fd = %fd, error = %e, "Inherited descriptor is not a socket, ignoring");
            return Ok(None);
        }
    }

    let local_addr = match socket.local_addr().map(|a| a.as_socket()) {
        Ok(Some(addr)) => addr,
        Ok(None) => {
            tracing::warn!(fd = %fd, "Inherited socket is not an IP socket, ignoring");
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!(fd = %fd, error = %e, "Inherited socket has no local address, ignoring");
            return Ok(None);
        }
    };

    #[cfg(any(target_os = "android", target_os = "freebsd", target_os = "fuchsia", target_os = "linux"))]
    match socket.is_listener() {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(fd = %fd, address = %local_addr, "Inherited socket is not listening, ignoring");
            return Ok(None);
        }
        Err(e) => {
            tracing::warn!(fd = %fd, error = %e, "Could not query SO_ACCEPTCONN on inherited socket, ignoring");
            return Ok(None);
        }
    }

    if let Err(source) = socket.set_cloexec(true) {
        match policy {
            CloexecPolicy::Strict => return Err(AdoptError::Cloexec { fd, source }),
            CloexecPolicy::BestEffort => {
                tracing::warn!(fd = %fd, error = %source, "Could not mark inherited socket close-on-exec");
            }
        }
    }

    // SAFETY: validated above as an IP stream socket; ownership moves to the
    // returned listener and nothing else refers to the descriptor.
    let listener = unsafe { std::net::TcpListener::from_raw_fd(fd.as_raw()) };
    listener
        .set_nonblocking(true)
        .map_err(|source| AdoptError::Setup { fd, source })?;

    tracing::info!(fd = %fd, address = %local_addr, "Adopted inherited listener");
    Ok(Some(listener))
}

#[cfg(not(unix))]
pub fn adopt(
    fd: InheritedFd,
    _policy: CloexecPolicy,
) -> Result<Option<std::net::TcpListener>, AdoptError> {
    tracing::warn!(fd = %fd, "Descriptor inheritance is only supported on unix, ignoring");
    Ok(None)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::fd::{AsRawFd, IntoRawFd};

    #[test]
    fn parse_valid_descriptor() {
        assert_eq!(InheritedFd::parse(Some("3")), InheritedFd::new(3));
    }

    #[test]
    fn parse_malformed_is_absent() {
        assert_eq!(InheritedFd::parse(None), None);
        assert_eq!(InheritedFd::parse(Some("")), None);
        assert_eq!(InheritedFd::parse(Some("three")), None);
        assert_eq!(InheritedFd::parse(Some("3 4")), None);
        assert_eq!(InheritedFd::parse(Some("-1")), None);
    }

    #[test]
    fn adopt_listening_socket() {
        let original = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = original.local_addr().unwrap();
        let fd = InheritedFd::new(original.into_raw_fd()).unwrap();

        let adopted = adopt(fd, CloexecPolicy::Strict).unwrap().expect("listener adopted");
        assert_eq!(adopted.local_addr().unwrap(), addr);
        assert_eq!(adopted.as_raw_fd(), fd.as_raw());
    }

    #[test]
    fn adopt_regular_file_falls_through() {
        let file = std::fs::File::open("/dev/null").unwrap();
        let fd = InheritedFd::new(file.as_raw_fd()).unwrap();

        assert!(adopt(fd, CloexecPolicy::BestEffort).unwrap().is_none());
        // Still owned by `file`; dropping it must not double-close.
        drop(file);
    }

    #[cfg(target_os = "linux")]
    fn is_cloexec(fd: i32) -> bool {
        // fdinfo reports open(2) flags in octal; O_CLOEXEC is 02000000.
        let info = std::fs::read_to_string(format!("/proc/self/fdinfo/{fd}")).unwrap();
        let flags = info
            .lines()
            .find_map(|line| line.strip_prefix("flags:"))
            .unwrap();
        u32::from_str_radix(flags.trim(), 8).unwrap() & 0o2000000 != 0
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn adopt_restores_close_on_exec() {
        let original = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        socket2::SockRef::from(&original).set_cloexec(false).unwrap();
        let fd = InheritedFd::new(original.into_raw_fd()).unwrap();
        assert!(!is_cloexec(fd.as_raw()));

        let adopted = adopt(fd, CloexecPolicy::Strict).unwrap().expect("listener adopted");
        assert!(is_cloexec(adopted.as_raw_fd()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn adopt_connected_stream_falls_through() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let fd = InheritedFd::new(stream.as_raw_fd()).unwrap();

        assert!(adopt(fd, CloexecPolicy::Strict).unwrap().is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn adopt_unbound_stream_socket_falls_through() {
        let socket = socket2::Socket::new(socket2::Domain::IPV4, socket2::Type::STREAM, None).unwrap();
        let fd = InheritedFd::new(socket.as_raw_fd()).unwrap();

        assert!(adopt(fd, CloexecPolicy::Strict).unwrap().is_none());
    }

    #[test]
    fn adopt_datagram_socket_falls_through() {
        let udp = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let fd = InheritedFd::new(udp.as_raw_fd()).unwrap();

        assert!(adopt(fd, CloexecPolicy::Strict).unwrap().is_none());
    }
}
