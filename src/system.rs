//! Supervisor: accept loop plus worker registry for one listener.
//!
//! ```text
//!            ┌──────────── supervisor tick ────────────┐
//!  listener ─┤ poll ─▶ accept ─▶ promote ─▶ spawn ─▶ push_front
//!            │ reap: take finished workers ─▶ join     │
//!            └─────────────────────────────────────────┘
//! ```
//!
//! Lock order: the registry lock may be held while a worker's lock is
//! taken, never the other way round.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionConfig};
use crate::env::{env_get_opt, env_get_str, env_micros, env_millis};
use crate::error::{Error, ErrorCategory, IoError, Result, SocketError, ThreadError};
use crate::handler::{Handler, Origin};
use crate::socket::{Disconnect, Role, Socket, Transport};
use crate::thread::{Tick, TickLock, TickThread, panic_message};

/// Runtime settings of a [`System`].
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Prefix for thread names.
    pub name: String,
    /// Upper bound of one `poll` on the listener and on each connection.
    pub poll_timeout: Duration,
    /// Pause between supervisor ticks.
    pub tick_sleep: Duration,
    /// Pause between connection worker ticks.
    pub worker_sleep: Duration,
    /// Live connections allowed at once. `None` means unbounded.
    pub max_connections: Option<usize>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "jaycore".to_string(),
            poll_timeout: Duration::from_millis(100),
            tick_sleep: Duration::from_millis(1),
            worker_sleep: Duration::from_millis(1),
            max_connections: None,
        }
    }
}

impl SystemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `JAYCORE_*` environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `JAYCORE_NAME` | `name` |
    /// | `JAYCORE_POLL_TIMEOUT_MS` | `poll_timeout` |
    /// | `JAYCORE_TICK_SLEEP_US` | `tick_sleep` |
    /// | `JAYCORE_WORKER_SLEEP_US` | `worker_sleep` |
    /// | `JAYCORE_MAX_CONNECTIONS` | `max_connections` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            name: env_get_str("JAYCORE_NAME", &defaults.name),
            poll_timeout: env_millis("JAYCORE_POLL_TIMEOUT_MS", defaults.poll_timeout),
            tick_sleep: env_micros("JAYCORE_TICK_SLEEP_US", defaults.tick_sleep),
            worker_sleep: env_micros("JAYCORE_WORKER_SLEEP_US", defaults.worker_sleep),
            max_connections: env_get_opt("JAYCORE_MAX_CONNECTIONS").or(defaults.max_connections),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn tick_sleep(mut self, sleep: Duration) -> Self {
        self.tick_sleep = sleep;
        self
    }

    pub fn worker_sleep(mut self, sleep: Duration) -> Self {
        self.worker_sleep = sleep;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    /// Settings handed to each connection worker.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            name: format!("{}-conn", self.name),
            poll_timeout: self.poll_timeout,
            sleep: self.worker_sleep,
        }
    }
}

/// Counters of a [`System`] since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemStats {
    /// Connections taken from the listener and given a worker.
    pub accepted: u64,
    /// Connections handed in through [`System::adopt`].
    pub adopted: u64,
    /// Connections closed on arrival because the cap was reached.
    pub rejected: u64,
    /// Finished workers removed from the registry.
    pub reaped: u64,
    /// Workers currently registered.
    pub live: usize,
}

/// State shared between the supervisor thread and the [`System`] handle.
struct Registry<T: Transport, H: Handler<T>> {
    workers: Mutex<VecDeque<Connection<T, H>>>,
    listening: AtomicBool,
    accepted: AtomicU64,
    adopted: AtomicU64,
    rejected: AtomicU64,
    reaped: AtomicU64,
}

impl<T: Transport, H: Handler<T>> Registry<T, H> {
    fn new() -> Self {
        Self {
            workers: Mutex::new(VecDeque::new()),
            listening: AtomicBool::new(true),
            accepted: AtomicU64::new(0),
            adopted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            reaped: AtomicU64::new(0),
        }
    }

    /// Starts a worker over `socket` and registers it.
    ///
    /// Over the cap the socket is closed and counted as rejected.
    fn admit(
        &self,
        mut socket: Socket<T>,
        handler: &Arc<H>,
        origin: Origin,
        config: &SystemConfig,
    ) -> Result<()> {
        let mut workers = self.workers.lock();
        if let Some(limit) = config.max_connections
            && workers.len() >= limit
        {
            drop(workers);
            self.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(reference = %socket.reference(), limit, "connection rejected");
            socket.close();
            return Err(ThreadError::LimitReached { limit }.into());
        }

        let connection = Connection::spawn(socket, Arc::clone(handler), origin, &config.connection())?;
        workers.push_front(connection);

        let counter = match origin {
            Origin::AcceptedByServer => &self.accepted,
            Origin::CreatedFromOutside => &self.adopted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Joins every finished worker. The lock is released before joining.
    fn reap(&self) {
        let finished: Vec<Connection<T, H>> = {
            let mut workers = self.workers.lock();
            if !workers.iter().any(Connection::is_finished) {
                return;
            }
            let mut live = VecDeque::with_capacity(workers.len());
            let mut finished = Vec::new();
            for connection in workers.drain(..) {
                if connection.is_finished() {
                    finished.push(connection);
                } else {
                    live.push_back(connection);
                }
            }
            *workers = live;
            finished
        };

        for mut connection in finished {
            connection.join();
            self.reaped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(reference = %connection.reference(), "worker reaped");
        }
    }

    /// Cancels every worker and joins them in list order.
    fn shutdown_all(&self) -> usize {
        let workers = std::mem::take(&mut *self.workers.lock());
        for connection in &workers {
            connection.request_shutdown();
        }
        let count = workers.len();
        for mut connection in workers {
            connection.join();
        }
        count
    }

    fn len(&self) -> usize {
        self.workers.lock().len()
    }
}

/// Tick context of the supervisor thread.
struct Supervisor<T: Transport, H: Handler<T>> {
    listener: Socket<T>,
    handler: Arc<H>,
    registry: Arc<Registry<T, H>>,
    config: SystemConfig,
    span: tracing::Span,
}

impl<T: Transport, H: Handler<T>> Supervisor<T, H> {
    fn accept_once(&mut self) {
        match self.listener.poll(self.config.poll_timeout) {
            Ok(true) => {}
            Ok(false) => {
                if !self.listener.is_connected() {
                    let errno = match self.listener.disconnect() {
                        Some(Disconnect::Error(code)) => code,
                        _ => libc::EBADF,
                    };
                    self.listener_lost(IoError::Poll { errno }.into());
                }
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "listener poll failed");
                return;
            }
        }

        let socket = match self.listener.accept() {
            Ok(socket) => socket,
            Err(err) if is_listener_gone(&err) => {
                self.listener_lost(err);
                return;
            }
            Err(err) => {
                match err.category() {
                    ErrorCategory::Transient => tracing::debug!(error = %err, "accept skipped"),
                    _ => tracing::warn!(error = %err, "accept failed"),
                }
                return;
            }
        };

        let reference = socket.reference().to_string();
        match self.registry.admit(socket, &self.handler, Origin::AcceptedByServer, &self.config) {
            Ok(()) => tracing::info!(reference = %reference, "connection accepted"),
            Err(Error::Thread(ThreadError::LimitReached { .. })) => {}
            Err(err) => tracing::error!(reference = %reference, error = %err, "worker not started"),
        }
    }

    fn listener_lost(&mut self, err: Error) {
        if !self.registry.listening.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::error!(error = %err, "listener lost, no longer accepting");
        let handler = &self.handler;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler.on_fatal(&err))) {
            tracing::error!(panic = %panic_message(payload.as_ref()), "fatal callback panicked");
        }
    }
}

fn is_listener_gone(err: &Error) -> bool {
    matches!(err.errno(), Some(libc::EBADF | libc::EINVAL | libc::ENOTSOCK))
        || matches!(err, Error::Socket(SocketError::NotConnected))
}

impl<T: Transport, H: Handler<T>> Tick for Supervisor<T, H> {
    fn on_start(&mut self, _lock: &TickLock) {
        let span = self.span.clone();
        let _enter = span.enter();
        tracing::info!(reference = %self.listener.reference(), "supervisor running");
    }

    fn tick(&mut self, lock: &TickLock) -> bool {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.registry.listening.load(Ordering::Acquire) {
            self.accept_once();
        } else {
            // Nothing to poll; keep reaping at the poll cadence.
            lock.pause(self.config.poll_timeout);
        }
        self.registry.reap();
        true
    }
}

/// Accept loop and connection workers for one listener.
///
/// The listener is moved in and handed back by [`destroy`](Self::destroy)
/// still open: closing it is the embedder's call.
///
/// ```ignore
/// let mut listener = Socket::tcp("127.0.0.1", 8080);
/// listener.bind()?;
/// let mut system = System::new(listener, Echo, SystemConfig::default())?;
/// system.start()?;
/// // ... wait for a signal ...
/// system.stop();
/// let listener = system.destroy();
/// ```
pub struct System<T: Transport, H: Handler<T>> {
    supervisor: TickThread<Supervisor<T, H>>,
    registry: Arc<Registry<T, H>>,
    handler: Arc<H>,
    reference: String,
    config: SystemConfig,
}

impl<T: Transport, H: Handler<T>> System<T, H> {
    /// Builds a stopped system over a bound listener.
    pub fn new(listener: Socket<T>, handler: H, config: SystemConfig) -> Result<Self> {
        Self::with_handler(listener, Arc::new(handler), config)
    }

    /// Like [`new`](Self::new) with a handler the caller keeps a handle to.
    pub fn with_handler(listener: Socket<T>, handler: Arc<H>, config: SystemConfig) -> Result<Self> {
        if listener.role() != Role::Server {
            return Err(SocketError::WrongRole {
                expected: Role::Server,
                actual: listener.role(),
            }.into());
        }

        let reference = listener.reference().to_string();
        let registry = Arc::new(Registry::new());
        let supervisor = Supervisor {
            listener,
            handler: Arc::clone(&handler),
            registry: Arc::clone(&registry),
            config: config.clone(),
            span: tracing::info_span!("system", reference = %reference),
        };

        Ok(Self {
            supervisor: TickThread::new(format!("{}-sup", config.name), supervisor, config.tick_sleep),
            registry,
            handler,
            reference,
            config,
        })
    }

    /// Starts the supervisor thread.
    pub fn start(&mut self) -> Result<()> {
        self.supervisor.start()?;
        tracing::info!(reference = %self.reference, "system started");
        Ok(())
    }

    /// Stops accepting and reaping. Live connections keep running.
    pub fn stop(&mut self) {
        if self.supervisor.is_running() {
            tracing::info!(reference = %self.reference, "system stopping");
        }
        self.supervisor.stop();
    }

    /// Stops the supervisor, shuts every connection down and hands the
    /// listener back unclosed.
    ///
    /// Every `on_close` has been delivered when this returns.
    pub fn destroy(mut self) -> Option<Socket<T>> {
        self.shutdown();
        self.supervisor.take_task().map(|supervisor| supervisor.listener)
    }

    /// Registers a connected client socket created elsewhere.
    ///
    /// Its worker reports [`Origin::CreatedFromOutside`].
    pub fn adopt(&self, socket: Socket<T>) -> Result<()> {
        let reference = socket.reference().to_string();
        self.registry.admit(socket, &self.handler, Origin::CreatedFromOutside, &self.config)?;
        tracing::info!(reference = %reference, "connection adopted");
        Ok(())
    }

    /// Workers registered right now, finished-but-unreaped included.
    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    /// False once the listener has failed.
    pub fn is_listening(&self) -> bool {
        self.registry.listening.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running()
    }

    /// The listener's reference string.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn stats(&self) -> SystemStats {
        SystemStats {
            accepted: self.registry.accepted.load(Ordering::Relaxed),
            adopted: self.registry.adopted.load(Ordering::Relaxed),
            rejected: self.registry.rejected.load(Ordering::Relaxed),
            reaped: self.registry.reaped.load(Ordering::Relaxed),
            live: self.registry.len(),
        }
    }

    fn shutdown(&mut self) {
        self.supervisor.stop();
        let closed = self.registry.shutdown_all();
        if closed > 0 {
            tracing::info!(reference = %self.reference, connections = closed, "connections shut down");
        }
    }
}

impl<T: Transport, H: Handler<T>> Drop for System<T, H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Transport, H: Handler<T>> std::fmt::Debug for System<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("reference", &self.reference)
            .field("running", &self.is_running())
            .field("listening", &self.is_listening())
            .field("connections", &self.connection_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct Quiet;

    impl<T: Transport> Handler<T> for Quiet {
        fn on_data(&self, _socket: &mut Socket<T>) {}
    }

    #[test]
    fn config_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.poll_timeout, Duration::from_millis(100));
        assert_eq!(config.max_connections, None);

        let conn = config.name("edge").worker_sleep(Duration::from_micros(500)).connection();
        assert_eq!(conn.name, "edge-conn");
        assert_eq!(conn.sleep, Duration::from_micros(500));
    }

    #[test]
    fn config_from_env() {
        unsafe {
            std::env::set_var("JAYCORE_POLL_TIMEOUT_MS", "25");
            std::env::set_var("JAYCORE_MAX_CONNECTIONS", "8");
        }
        let config = SystemConfig::from_env();
        unsafe {
            std::env::remove_var("JAYCORE_POLL_TIMEOUT_MS");
            std::env::remove_var("JAYCORE_MAX_CONNECTIONS");
        }
        assert_eq!(config.poll_timeout, Duration::from_millis(25));
        assert_eq!(config.max_connections, Some(8));
        assert_eq!(config.tick_sleep, Duration::from_millis(1));
    }

    #[test]
    fn reap_joins_finished_and_keeps_live_order() {
        let mut listener = Socket::tcp("127.0.0.1", 0);
        listener.bind().expect("bind");
        let port: u16 = listener
            .reference()
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .expect("port");
        let registry: Registry<crate::socket::Tcp, Quiet> = Registry::new();
        let handler = Arc::new(Quiet);
        let config = SystemConfig::new().poll_timeout(Duration::from_millis(20));

        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(std::net::TcpStream::connect(("127.0.0.1", port)).expect("connect"));
            assert!(listener.poll(Duration::from_secs(2)).expect("poll"));
            let socket = listener.accept().expect("accept");
            registry
                .admit(socket, &handler, Origin::AcceptedByServer, &config)
                .expect("admit");
        }
        let order: Vec<String> = registry
            .workers
            .lock()
            .iter()
            .map(|c| c.reference().to_string())
            .collect();

        // Newest first: the second client sits in the middle.
        drop(clients.remove(1));
        let deadline = Instant::now() + Duration::from_secs(2);
        while !registry.workers.lock()[1].is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }

        registry.reap();
        assert_eq!(registry.reaped.load(Ordering::Relaxed), 1);
        let live: Vec<String> = registry
            .workers
            .lock()
            .iter()
            .map(|c| c.reference().to_string())
            .collect();
        assert_eq!(live, vec![order[0].clone(), order[2].clone()]);

        assert_eq!(registry.shutdown_all(), 2);
        drop(clients);
    }

    #[test]
    fn stop_is_prompt_once_listener_is_lost() {
        let mut listener = Socket::tcp("127.0.0.1", 0);
        listener.bind().expect("bind");
        let config = SystemConfig::new().poll_timeout(Duration::from_secs(5));
        let mut system = System::new(listener, Quiet, config).expect("system");
        system.registry.listening.store(false, Ordering::Release);
        system.start().expect("start");
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        system.stop();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!system.is_running());
    }
}
