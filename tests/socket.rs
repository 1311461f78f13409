//! Role-typed socket contract over real loopback and UNIX sockets.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use common::*;
use jaycore::{Disconnect, ErrorKind, Role, Socket, SocketConfig, set_linger};

/// Listener plus an accepted, promoted server-side socket and the std client.
fn connected_pair() -> (Socket<jaycore::Tcp>, Socket<jaycore::Tcp>, TcpStream) {
    init_test_logging();
    let (mut listener, port) = tcp_listener();
    let client = TcpStream::connect(("127.0.0.1", port)).expect("connect");
    assert!(listener.poll(Duration::from_secs(2)).expect("poll listener"));
    let mut accepted = listener.accept().expect("accept");
    assert_eq!(accepted.role(), Role::Unset);
    assert!(accepted.is_connected());
    accepted.promote().expect("promote");
    assert_eq!(accepted.role(), Role::Client);
    (listener, accepted, client)
}

#[test]
fn bind_reports_bound_port() {
    init_test_logging();
    let (listener, port) = tcp_listener();
    assert_eq!(listener.role(), Role::Server);
    assert_ne!(port, 0);
    assert_eq!(listener.reference(), format!("TCP:127.0.0.1:{port}"));
}

#[test]
fn accepted_reference_names_the_peer() {
    let (_listener, accepted, client) = connected_pair();
    let local = client.local_addr().expect("local addr");
    assert_eq!(accepted.reference(), format!("TCP:127.0.0.1:{}", local.port()));
}

#[test]
fn recv_and_send_round_trip() {
    let (_listener, mut server, mut client) = connected_pair();

    client.write_all(b"hello").expect("client write");
    assert!(server.poll(Duration::from_secs(2)).expect("poll"));
    let mut buf = [0u8; 16];
    assert_eq!(server.recv(&mut buf).expect("recv"), 5);
    assert_eq!(&buf[..5], b"hello");

    assert_eq!(server.send_all(b"world").expect("send"), 5);
    let mut reply = [0u8; 5];
    client.read_exact(&mut reply).expect("client read");
    assert_eq!(&reply, b"world");
}

#[test]
fn small_buffer_leaves_remainder_in_kernel() {
    let (_listener, mut server, mut client) = connected_pair();
    client.write_all(b"abcdefgh").expect("write");
    assert!(server.poll(Duration::from_secs(2)).expect("poll"));

    let mut head = [0u8; 3];
    assert_eq!(server.recv(&mut head).expect("recv"), 3);
    assert_eq!(&head, b"abc");

    assert!(server.poll(Duration::ZERO).expect("poll"));
    let mut rest = [0u8; 16];
    assert_eq!(server.recv(&mut rest).expect("recv"), 5);
    assert_eq!(&rest[..5], b"defgh");
}

#[test]
fn discard_advances_read_pointer() {
    let (_listener, mut server, mut client) = connected_pair();
    client.write_all(b"skipkeep").expect("write");
    assert!(server.poll(Duration::from_secs(2)).expect("poll"));

    assert_eq!(server.discard(4).expect("discard"), 4);
    let mut buf = [0u8; 8];
    assert_eq!(server.recv(&mut buf).expect("recv"), 4);
    assert_eq!(&buf[..4], b"keep");
}

#[test]
fn zero_timeout_poll_returns_immediately() {
    let (_listener, mut server, _client) = connected_pair();
    let started = Instant::now();
    assert!(!server.poll(Duration::ZERO).expect("poll"));
    assert!(started.elapsed() < Duration::from_millis(50));
}

#[test]
fn peer_close_is_detected_once() {
    let (_listener, mut server, client) = connected_pair();
    drop(client);

    assert!(server.poll(Duration::from_secs(2)).expect("poll"));
    let mut buf = [0u8; 8];
    assert_eq!(server.recv(&mut buf).expect("recv"), 0);
    assert!(!server.is_connected());
    assert_eq!(server.role(), Role::Unset);
    assert_eq!(server.disconnect(), Some(Disconnect::Remote));

    // Closed sockets read and write nothing; the first cause sticks.
    assert_eq!(server.recv(&mut buf).expect("recv"), 0);
    assert_eq!(server.send(b"late").expect("send"), 0);
    assert!(!server.poll(Duration::ZERO).expect("poll"));
    server.close();
    assert_eq!(server.disconnect(), Some(Disconnect::Remote));
}

#[test]
fn probe_sees_eof_without_consuming() {
    let (_listener, mut server, mut client) = connected_pair();
    client.write_all(b"x").expect("write");
    assert!(server.poll(Duration::from_secs(2)).expect("poll"));
    assert!(server.probe().expect("probe"));
    let mut buf = [0u8; 1];
    assert_eq!(server.recv(&mut buf).expect("recv"), 1);

    drop(client);
    assert!(server.poll(Duration::from_secs(2)).expect("poll"));
    assert!(!server.probe().expect("probe"));
    assert_eq!(server.disconnect(), Some(Disconnect::Remote));
}

#[test]
fn hangup_counts_as_input_and_probe_closes() {
    let (_listener, mut server, client) = connected_pair();
    client.shutdown(std::net::Shutdown::Both).expect("shutdown");

    assert!(server.poll(Duration::from_secs(2)).expect("poll"));
    assert!(!server.probe().expect("probe"));
    assert!(!server.is_connected());
    assert_eq!(server.disconnect(), Some(Disconnect::Remote));
    drop(client);
}

#[test]
fn reset_peer_closes_socket() {
    let (_listener, mut server, client) = connected_pair();
    set_linger(&client, Some(0)).expect("linger");
    drop(client);

    // The reset surfaces either as POLLERR (poll closes) or on the next recv.
    server.poll(Duration::from_secs(2)).expect("poll");
    let mut buf = [0u8; 8];
    assert_eq!(server.recv(&mut buf).expect("recv"), 0);
    assert!(!server.is_connected());
    assert_eq!(server.disconnect(), Some(Disconnect::Reset));
}

#[test]
fn send_to_departed_peer_closes_socket() {
    let (_listener, mut server, client) = connected_pair();
    drop(client);

    let chunk = [0u8; 1024];
    let deadline = Instant::now() + Duration::from_secs(2);
    while server.is_connected() && Instant::now() < deadline {
        server.send(&chunk).expect("send never raises on a dead peer");
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!server.is_connected());
    assert!(matches!(
        server.disconnect(),
        Some(Disconnect::BrokenPipe | Disconnect::Reset)
    ));
}

#[test]
fn close_is_idempotent() {
    let (_listener, mut server, _client) = connected_pair();
    server.close();
    assert!(!server.is_connected());
    assert_eq!(server.raw_fd(), None);
    assert_eq!(server.disconnect(), Some(Disconnect::Local));
    server.close();
    server.shutdown_and_close();
    assert_eq!(server.disconnect(), Some(Disconnect::Local));
}

#[test]
fn role_violations() {
    let (mut listener, mut server, _client) = connected_pair();

    let mut buf = [0u8; 4];
    assert_eq!(listener.recv(&mut buf).unwrap_err().kind(), ErrorKind::WrongRole);
    assert_eq!(listener.send(b"x").unwrap_err().kind(), ErrorKind::WrongRole);
    assert_eq!(server.accept().unwrap_err().kind(), ErrorKind::WrongRole);
    assert_eq!(listener.connect().unwrap_err().kind(), ErrorKind::AlreadyBound);
    assert_eq!(server.bind().unwrap_err().kind(), ErrorKind::AlreadyBound);
    assert_eq!(listener.promote().unwrap_err().kind(), ErrorKind::WrongRole);

    listener.close();
    assert_eq!(listener.accept().unwrap_err().kind(), ErrorKind::NotConnected);
}

#[test]
fn address_in_use() {
    init_test_logging();
    let (_listener, port) = tcp_listener();
    let mut second = Socket::tcp("127.0.0.1", port);
    let err = second.bind().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AddressInUse);
    assert_eq!(err.errno(), Some(libc::EADDRINUSE));
    assert_eq!(second.role(), Role::Unset);
}

#[test]
fn connection_refused() {
    init_test_logging();
    let port = {
        let (listener, port) = tcp_listener();
        drop(listener);
        port
    };
    let mut client = Socket::tcp("127.0.0.1", port);
    assert_eq!(client.connect().unwrap_err().kind(), ErrorKind::ConnectionRefused);
    assert!(!client.is_connected());
}

#[test]
fn client_connect_and_exchange() {
    init_test_logging();
    let (mut listener, port) = tcp_listener();
    let mut client = Socket::tcp("localhost", port).with_config(SocketConfig::new());
    client.connect().expect("connect");
    assert_eq!(client.role(), Role::Client);
    assert_eq!(client.reference(), format!("TCP:127.0.0.1:{port}"));

    assert!(listener.poll(Duration::from_secs(2)).expect("poll"));
    let mut server = listener.accept().expect("accept");
    server.promote().expect("promote");

    assert_eq!(client.send_all(b"ping").expect("send"), 4);
    assert!(server.poll(Duration::from_secs(2)).expect("poll"));
    let mut buf = [0u8; 4];
    assert_eq!(server.recv(&mut buf).expect("recv"), 4);
    assert_eq!(&buf, b"ping");
}

#[test]
fn unix_listener_and_client() {
    init_test_logging();
    let (_dir, path) = temp_socket_path();

    let mut listener = Socket::unix(&path);
    listener.bind().expect("bind unix");
    assert_eq!(listener.reference(), format!("UNIX:{}", path.display()));

    let mut client = UnixStream::connect(&path).expect("connect");
    assert!(listener.poll(Duration::from_secs(2)).expect("poll"));
    let mut server = listener.accept().expect("accept");
    server.promote().expect("promote");
    assert_eq!(server.reference(), listener.reference());

    client.write_all(b"ping").expect("write");
    assert!(server.poll(Duration::from_secs(2)).expect("poll"));
    let mut buf = [0u8; 8];
    assert_eq!(server.recv(&mut buf).expect("recv"), 4);
    server.send_all(b"pong").expect("send");
    let mut reply = [0u8; 4];
    client.read_exact(&mut reply).expect("read");
    assert_eq!(&reply, b"pong");
}

#[test]
fn unix_path_too_long() {
    init_test_logging();
    let mut socket = Socket::unix("/tmp/".to_string() + &"x".repeat(200));
    assert_eq!(socket.bind().unwrap_err().kind(), ErrorKind::InvalidAddress);
}
