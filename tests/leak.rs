//! No core-owned thread or descriptor survives `System::destroy`.
//!
//! Kept alone in its own binary: other tests running in parallel would move
//! the process-wide counts.

mod common;

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use jaycore::System;

fn open_fds() -> usize {
    std::fs::read_dir("/proc/self/fd").map(|dir| dir.count()).unwrap_or(0)
}

fn live_threads() -> usize {
    std::fs::read_dir("/proc/self/task").map(|dir| dir.count()).unwrap_or(0)
}

#[test]
fn destroy_releases_threads_and_descriptors() {
    init_test_logging();
    let (listener, port) = tcp_listener();
    let fds_before = open_fds();
    let threads_before = live_threads();

    let recorder = Arc::new(Recorder::new(Reply::Echo));
    let mut system = System::with_handler(listener, Arc::clone(&recorder), fast_config()).expect("system");
    system.start().expect("start");

    // Some connections finish on their own, some are still open at destroy.
    for round in 0..3 {
        let mut client = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        client.set_read_timeout(Some(Duration::from_secs(2))).expect("timeout");
        client.write_all(&[round]).expect("write");
        let mut reply = [0u8; 1];
        client.read_exact(&mut reply).expect("read");
    }
    let idle: Vec<_> = (0..4)
        .map(|_| TcpStream::connect(("127.0.0.1", port)).expect("connect"))
        .collect();
    assert!(wait_until(Duration::from_secs(2), || recorder.creates() == 7));
    assert!(live_threads() > threads_before);

    system.stop();
    let listener = system.destroy().expect("listener");
    assert_eq!(recorder.closes(), 7);

    // Client-side streams and the listener are not core-owned.
    drop(idle);
    drop(listener);
    assert!(wait_until(Duration::from_secs(2), || live_threads() <= threads_before));
    assert!(wait_until(Duration::from_secs(2), || open_fds() <= fds_before - 1));
}
