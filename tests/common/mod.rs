#![allow(dead_code)]
//! Shared integration test utilities.

use std::path::PathBuf;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use jaycore::{CloseReason, Handler, Origin, Socket, SocketConfig, SystemConfig, Transport};
use parking_lot::Mutex;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Installs a test-writer subscriber once per binary; `RUST_LOG` filters it.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with_test_writer()
            .try_init();
    });
}

/// A unique socket path inside a fresh temp directory.
pub fn temp_socket_path() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("jaycore-test.sock");
    (dir, path)
}

/// Polls `done` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

/// Short timeouts so tests shut down quickly.
pub fn fast_config() -> SystemConfig {
    SystemConfig::new()
        .name("test")
        .poll_timeout(Duration::from_millis(20))
        .tick_sleep(Duration::from_micros(200))
        .worker_sleep(Duration::from_micros(200))
}

/// A bound loopback TCP listener on a kernel-chosen port.
///
/// The backlog is raised so bursts of test clients are not dropped.
pub fn tcp_listener() -> (Socket<jaycore::Tcp>, u16) {
    let mut listener = Socket::tcp("127.0.0.1", 0).with_config(SocketConfig::new().backlog(128));
    listener.bind().expect("bind loopback");
    let port = listener
        .reference()
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .expect("port in reference");
    (listener, port)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Create(String, Origin),
    Data(String, Vec<u8>),
    Close(String, CloseReason),
}

/// What a [`Recorder`] does with the bytes it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Echo,
    Md5,
    Silent,
    Panic,
}

/// Handler that records every callback and answers per [`Reply`].
pub struct Recorder {
    reply: Reply,
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn creates(&self) -> usize {
        self.count(|e| matches!(e, Event::Create(..)))
    }

    pub fn datas(&self) -> usize {
        self.count(|e| matches!(e, Event::Data(..)))
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, Event::Close(..)))
    }

    pub fn close_reasons(&self) -> Vec<CloseReason> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Event::Close(_, reason) => Some(*reason),
                _ => None,
            })
            .collect()
    }

    fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| f(e)).count()
    }
}

impl<T: Transport> Handler<T> for Recorder {
    fn on_create(&self, reference: &str, origin: Origin) {
        self.events.lock().push(Event::Create(reference.to_string(), origin));
    }

    fn on_data(&self, socket: &mut Socket<T>) {
        let mut buf = [0u8; 4096];
        let n = socket.recv(&mut buf).expect("recv");
        if n == 0 {
            return;
        }
        let payload = buf[..n].to_vec();
        self.events
            .lock()
            .push(Event::Data(socket.reference().to_string(), payload.clone()));

        match self.reply {
            Reply::Echo => {
                socket.send_all(&payload).expect("echo");
            }
            Reply::Md5 => {
                use md5::{Digest, Md5};
                let hex = format!("{:x}", Md5::digest(&payload));
                socket.send_all(hex.as_bytes()).expect("reply");
            }
            Reply::Silent => {}
            Reply::Panic => panic!("handler failure"),
        }
    }

    fn on_close(&self, reference: &str, reason: CloseReason) {
        self.events.lock().push(Event::Close(reference.to_string(), reason));
    }
}
