//! Per-connection worker.
//!
//! A [`Connection`] owns one client socket and one [`TickThread`]. Each tick
//! polls the socket and hands it to [`Handler::on_data`] when input is
//! pending. The worker finishes once the socket is closed, by the peer, by
//! the handler or by a shutdown request.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SocketError};
use crate::handler::{CloseReason, Handler, Origin};
use crate::socket::{Role, Socket, Transport};
use crate::thread::{Exit, Tick, TickLock, TickThread, panic_message};

/// Settings shared by every worker of a system.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Thread name for the workers.
    pub name: String,
    /// Upper bound of one `poll`; also bounds shutdown latency.
    pub poll_timeout: Duration,
    /// Pause between ticks.
    pub sleep: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            name: "jaycore-conn".to_string(),
            poll_timeout: Duration::from_millis(100),
            sleep: Duration::from_millis(1),
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }
}

/// Tick context of a connection worker.
struct Session<T: Transport, H: Handler<T>> {
    socket: Socket<T>,
    handler: Arc<H>,
    reference: String,
    origin: Origin,
    poll_timeout: Duration,
    span: tracing::Span,
}

impl<T: Transport, H: Handler<T>> Session<T, H> {
    fn dispatch(&mut self) {
        let handler = &self.handler;
        let socket = &mut self.socket;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler.on_data(socket))) {
            tracing::error!(
                reference = %self.reference,
                panic = %panic_message(payload.as_ref()),
                "data callback panicked"
            );
        }
    }
}

impl<T: Transport, H: Handler<T>> Tick for Session<T, H> {
    fn on_start(&mut self, _lock: &TickLock) {
        let span = self.span.clone();
        let _enter = span.enter();
        tracing::info!(reference = %self.reference, origin = ?self.origin, "connection created");
        // A panic here aborts the worker; on_close still follows.
        self.handler.on_create(&self.reference, self.origin);
    }

    fn tick(&mut self, _lock: &TickLock) -> bool {
        let span = self.span.clone();
        let _enter = span.enter();
        if !self.socket.is_connected() {
            return false;
        }

        // A hangup also reports true here; probe then records the EOF.
        match self.socket.poll(self.poll_timeout) {
            Ok(true) => match self.socket.probe() {
                Ok(true) => self.dispatch(),
                Ok(false) => {}
                Err(err) => tracing::warn!(reference = %self.reference, error = %err, "probe failed"),
            },
            Ok(false) => {}
            Err(err) => tracing::warn!(reference = %self.reference, error = %err, "poll failed"),
        }

        self.socket.is_connected()
    }

    fn on_exit(&mut self, exit: Exit) {
        let span = self.span.clone();
        let _enter = span.enter();
        let reason = if self.socket.is_connected() {
            self.socket.close();
            match exit {
                Exit::Panicked => CloseReason::Aborted,
                Exit::Stopped | Exit::Completed => CloseReason::ExternalShutdown,
            }
        } else {
            self.socket
                .disconnect()
                .map_or(CloseReason::ClosedLocally, CloseReason::from)
        };

        tracing::info!(reference = %self.reference, reason = %reason, "connection closed");
        let handler = &self.handler;
        let reference = &self.reference;
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler.on_close(reference, reason))) {
            tracing::error!(
                reference = %self.reference,
                panic = %panic_message(payload.as_ref()),
                "close callback panicked"
            );
        }
    }
}

/// A running connection worker.
pub struct Connection<T: Transport, H: Handler<T>> {
    reference: String,
    origin: Origin,
    worker: TickThread<Session<T, H>>,
}

impl<T: Transport, H: Handler<T>> Connection<T, H> {
    /// Promotes `socket` to a client and starts a worker over it.
    ///
    /// The socket must be connected: either freshly accepted or a connected
    /// client. `on_create` runs on the new thread before the first poll.
    pub fn spawn(
        mut socket: Socket<T>,
        handler: Arc<H>,
        origin: Origin,
        config: &ConnectionConfig,
    ) -> Result<Self> {
        if !socket.is_connected() {
            return Err(SocketError::NotConnected.into());
        }
        socket.promote()?;
        debug_assert_eq!(socket.role(), Role::Client);

        let reference = socket.reference().to_string();
        let span = tracing::info_span!("connection", reference = %reference);
        let session = Session {
            socket,
            handler,
            reference: reference.clone(),
            origin,
            poll_timeout: config.poll_timeout,
            span,
        };

        let mut worker = TickThread::new(config.name.clone(), session, config.sleep);
        worker.start()?;

        Ok(Self {
            reference,
            origin,
            worker,
        })
    }

    #[inline]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    #[inline]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// True once `on_close` has been delivered and the thread awaits a join.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// The worker's mutex, for state shared with a handler.
    pub fn lock(&self) -> &TickLock {
        self.worker.lock()
    }

    /// Asks the worker to close its socket and exit, without waiting.
    ///
    /// The worker notices within one poll timeout.
    pub fn request_shutdown(&self) {
        self.worker.request_stop();
    }

    /// Requests shutdown and waits for the worker to exit.
    pub fn shutdown(&mut self) {
        self.worker.stop();
    }

    /// Joins a finished worker. Returns false if it was already joined.
    pub fn join(&mut self) -> bool {
        self.worker.join()
    }
}

impl<T: Transport, H: Handler<T>> std::fmt::Debug for Connection<T, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("reference", &self.reference)
            .field("origin", &self.origin)
            .field("state", &self.worker.state())
            .finish()
    }
}
