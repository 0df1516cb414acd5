//! Listener acquisition through the public entry points.

#![cfg(unix)]

use std::os::fd::{AsRawFd, IntoRawFd};
use std::time::Duration;

use grace::config::{DrainConfig, StartupConfig};
use grace::net::{listen, InheritedFd, ListenerSource};

mod common;

#[tokio::test]
async fn test_inherited_listener_is_served() {
    let handed_over = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = handed_over.local_addr().unwrap();
    let fd = InheritedFd::new(handed_over.into_raw_fd()).unwrap();

    let startup = StartupConfig::new().with_inherited_fd(fd);
    let listener = listen("127.0.0.1:1", &startup).await.unwrap();

    assert!(listener.is_inherited());
    assert_eq!(listener.source(), ListenerSource::Inherited { fd });
    assert_eq!(listener.local_addr().unwrap(), addr);
    assert_eq!(listener.target(), format!("socketmaster:{}", fd));
    // The requested port is kept as given, distinct from the real one.
    assert_eq!(listener.requested().port(), 1);

    let (router, _entered) = common::app(Duration::ZERO);
    let server = common::start(listener, router, DrainConfig::default());
    let (status, body) = common::get_text(&common::client(), addr, "/foo/bar").await;
    assert_eq!((status, body.as_str()), (200, "foobar"));

    server.stop().await;
}

#[tokio::test]
async fn test_unusable_inherited_fd_falls_back_to_bind() {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let fd = InheritedFd::new(socket.as_raw_fd()).unwrap();
    let port = common::free_port();

    let startup = StartupConfig::new().with_inherited_fd(fd);
    let listener = listen(&format!("127.0.0.1:{port}"), &startup).await.unwrap();

    assert!(!listener.is_inherited());
    assert_eq!(listener.local_addr().unwrap().port(), port);
}

#[tokio::test]
async fn test_listen_port_override_replaces_address_port() {
    let port = common::free_port();
    let startup = StartupConfig::new().with_listen_port(port.to_string());

    let listener = listen("127.0.0.1:1", &startup).await.unwrap();

    assert_eq!(listener.local_addr().unwrap().port(), port);
    assert_eq!(listener.requested().port(), 1);
    assert!(matches!(listener.source(), ListenerSource::Bound { .. }));
}

#[tokio::test]
async fn test_listen_reports_bind_errors() {
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = holder.local_addr().unwrap();

    assert!(listen(&addr.to_string(), &StartupConfig::new()).await.is_err());
    assert!(listen("missing-port", &StartupConfig::new()).await.is_err());
}

#[tokio::test]
async fn test_empty_host_binds_all_ipv4_interfaces() {
    let port = common::free_port();
    let listener = listen(&format!(":{port}"), &StartupConfig::new()).await.unwrap();

    let local = listener.local_addr().unwrap();
    assert!(local.is_ipv4());
    assert!(local.ip().is_unspecified());
    assert_eq!(local.port(), port);
}
