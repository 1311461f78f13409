//! Role-typed byte-stream sockets.
//!
//! A [`Socket`] starts unset, becomes a client through [`Socket::connect`]
//! or a server through [`Socket::bind`], and goes back to unset when it is
//! closed. The family-specific parts live behind the [`Transport`] trait.

mod bound;
mod config;
mod listener;
mod options;
mod poll;
mod raw;
mod stream;
mod transport;

pub use self::bound::BoundSocket;
pub use self::config::{
	BufferConfig, CloseMode, DEFAULT_BACKLOG, KeepaliveConfig, ReuseConfig, SocketConfig, TcpConfig,
};
pub use self::listener::Listener;
pub use self::options::{
	set_keepalive, set_keepalive_count, set_keepalive_idle, set_keepalive_interval, set_linger,
	set_recv_buffer_size, set_reuse_addr, set_reuse_port, set_send_buffer_size, set_tcp_nodelay,
	take_error,
};
pub use self::raw::RawSocket;
pub use self::stream::{ConnectedStream, Shutdown};
pub use self::transport::{Addr, Tcp, Transport, Unix};

use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::time::Duration;

use crate::error::{IoError, Result, SocketError};

/// Largest chunk `discard` pulls out of the kernel in one call.
const DISCARD_CHUNK: usize = 64 * 1024;

/// Role a socket currently plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
	Unset,
	Client,
	Server,
}

impl std::fmt::Display for Role {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(match self {
			Role::Unset => "unset",
			Role::Client => "client",
			Role::Server => "server",
		})
	}
}

/// Why a socket stopped being connected. Recorded once per socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disconnect {
	/// Peer closed its side (0-byte read).
	Remote,
	/// Peer reset the connection.
	Reset,
	/// Write to a connection the peer already tore down.
	BrokenPipe,
	/// `poll()` reported an error condition; carries `SO_ERROR`.
	Error(i32),
	/// Closed on this side.
	Local,
}

/*
 ┌──────────────┬────────┬────────────────────────────────┐
 │    State     │  Role  │            fd                  │
 ├──────────────┼────────┼────────────────────────────────┤
 │ Closed       │ unset  │ none                           │
 │ Accepted     │ unset  │ accepted stream, not promoted  │
 │ Client       │ client │ connected stream               │
 │ Server       │ server │ listening socket               │
 └──────────────┴────────┴────────────────────────────────┘
*/
enum State<D: crate::addr::Domain> {
	Closed,
	Accepted(ConnectedStream<D>),
	Client(ConnectedStream<D>),
	Server(Listener<D>),
}

/// A byte-stream endpoint whose behaviour depends on its current [`Role`].
///
/// Sockets are not shared between threads: exactly one owner drives a
/// socket at a time. Dropping a socket closes its descriptor.
pub struct Socket<T: Transport> {
	state: State<T::Domain>,
	transport: T,
	config: SocketConfig,
	reference: String,
	disconnect: Option<Disconnect>,
}

impl Socket<Tcp> {
	/// An unconnected TCP socket for `host:port`.
	pub fn tcp(host: impl Into<String>, port: u16) -> Self {
		Self::new(Tcp::new(host, port))
	}
}

impl Socket<Unix> {
	/// An unconnected Unix domain socket for `path`.
	pub fn unix(path: impl AsRef<Path>) -> Self {
		Self::new(Unix::new(path))
	}
}

impl<T: Transport> Socket<T> {
	pub fn new(transport: T) -> Self {
		let reference = transport.target();
		Self {
			state: State::Closed,
			transport,
			config: SocketConfig::default(),
			reference,
			disconnect: None,
		}
	}

	/// Replaces the options applied on the next connect or bind.
	pub fn with_config(mut self, config: SocketConfig) -> Self {
		self.config = config;
		self
	}

	// ------------------------------------------------------------------------
	// Transitions
	// ------------------------------------------------------------------------

	/// Connects to the transport's target. Unset → client.
	pub fn connect(&mut self) -> Result<()> {
		self.require_unset()?;
		let (stream, reference) = self.transport.connect(&self.config)?;
		tracing::debug!(reference = %reference, "connected");
		self.reference = reference;
		self.disconnect = None;
		self.state = State::Client(stream);
		Ok(())
	}

	/// Binds and listens on the transport's target. Unset → server.
	pub fn bind(&mut self) -> Result<()> {
		self.require_unset()?;
		let (listener, reference) = self.transport.bind(&self.config)?;
		tracing::debug!(reference = %reference, backlog = self.config.backlog, "listening");
		self.reference = reference;
		self.disconnect = None;
		self.state = State::Server(listener);
		Ok(())
	}

	/// Accepts a pending connection.
	///
	/// The returned socket holds the accepted descriptor but is still unset;
	/// [`promote`](Self::promote) turns it into a client.
	pub fn accept(&mut self) -> Result<Socket<T>> {
		let listener = match &self.state {
			State::Server(listener) => listener,
			State::Closed => return Err(SocketError::NotConnected.into()),
			_ => {
				return Err(SocketError::WrongRole {
					expected: Role::Server,
					actual: self.role(),
				}.into());
			}
		};

		let accepted = match self.transport.accept(listener, &self.config) {
			Err(err) if err.kind() == crate::ErrorKind::Interrupted => {
				self.transport.accept(listener, &self.config)
			}
			other => other,
		};
		let (stream, transport, reference) = accepted?;
		tracing::debug!(listener = %self.reference, reference = %reference, "accepted");

		Ok(Socket {
			state: State::Accepted(stream),
			transport,
			config: self.config,
			reference,
			disconnect: None,
		})
	}

	/// Turns an accepted socket into a client. No-op on a client.
	pub fn promote(&mut self) -> Result<()> {
		match std::mem::replace(&mut self.state, State::Closed) {
			State::Accepted(stream) | State::Client(stream) => {
				self.state = State::Client(stream);
				Ok(())
			}
			other => {
				self.state = other;
				Err(SocketError::WrongRole {
					expected: Role::Client,
					actual: self.role(),
				}.into())
			}
		}
	}

	/// Closes the descriptor. Idempotent.
	pub fn close(&mut self) {
		self.close_with(Disconnect::Local);
	}

	/// Shuts both directions down before closing, regardless of [`CloseMode`].
	pub fn shutdown_and_close(&mut self) {
		if let State::Client(stream) | State::Accepted(stream) = &self.state {
			let _ = stream.shutdown(Shutdown::ReadWrite);
		}
		self.close_with(Disconnect::Local);
	}

	fn close_with(&mut self, cause: Disconnect) {
		let state = std::mem::replace(&mut self.state, State::Closed);
		match state {
			State::Closed => return,
			State::Client(stream) | State::Accepted(stream) => {
				self.transport.close(stream, self.config.close_mode);
			}
			State::Server(listener) => drop(listener),
		}
		// Only the first cause sticks.
		if self.disconnect.is_none() {
			self.disconnect = Some(cause);
		}
		tracing::debug!(reference = %self.reference, cause = ?cause, "closed");
	}

	// ------------------------------------------------------------------------
	// Readiness and I/O
	// ------------------------------------------------------------------------

	/// Waits up to `timeout` for input.
	///
	/// For a client, `true` means bytes (or EOF) are pending; for a server,
	/// a connection is waiting in the accept queue. An error condition closes
	/// the socket and yields `false`. A timeout of zero returns immediately.
	pub fn poll(&mut self, timeout: Duration) -> Result<bool> {
		let Some(fd) = self.raw_fd() else {
			return Ok(false);
		};
		let Some(ready) = poll::poll_input(fd, timeout)? else {
			return Ok(false);
		};

		if ready.invalid() {
			tracing::warn!(reference = %self.reference, "poll: descriptor not open");
			return Ok(false);
		}
		if ready.error() {
			let code = self.pending_error();
			let cause = match code {
				libc::ECONNRESET => Disconnect::Reset,
				libc::EPIPE => Disconnect::BrokenPipe,
				code => Disconnect::Error(code),
			};
			tracing::debug!(reference = %self.reference, errno = code, "poll: error condition");
			self.close_with(cause);
			return Ok(false);
		}
		// POLLHUP without POLLIN still reports input so the next read sees EOF.
		if ready.hangup() && !ready.readable() {
			tracing::trace!(reference = %self.reference, "poll: hangup");
		}
		Ok(ready.pending())
	}

	/// Checks without blocking whether a client has bytes to read.
	///
	/// EOF and reset are detected here and close the socket; no data is consumed.
	pub fn probe(&mut self) -> Result<bool> {
		let stream = self.client_stream()?;
		let Some(stream) = stream else {
			return Ok(false);
		};
		let mut byte = [0u8; 1];
		match stream.recv_with_flags(&mut byte, libc::MSG_PEEK | libc::MSG_DONTWAIT) {
			Ok(0) => {
				self.close_with(Disconnect::Remote);
				Ok(false)
			}
			Ok(_) => Ok(true),
			Err(IoError::Read { errno: libc::EAGAIN | libc::EINTR }) => Ok(false),
			Err(err) => self.read_failed(err).map(|_| false),
		}
	}

	/// Reads up to `buf.len()` bytes.
	///
	/// Returns 0 and closes the socket when the peer has closed or reset the
	/// connection. Reading from a closed socket returns 0.
	pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
		let Some(stream) = self.client_stream()? else {
			return Ok(0);
		};
		if buf.is_empty() {
			return Ok(0);
		}

		let mut result = stream.recv_with_flags(buf, 0);
		if matches!(result, Err(IoError::Read { errno: libc::EINTR })) {
			result = stream.recv_with_flags(buf, 0);
		}

		match result {
			Ok(0) => {
				self.close_with(Disconnect::Remote);
				Ok(0)
			}
			// A stream socket never returns more than asked; kept as a guard.
			Ok(n) => {
				let n = n.min(buf.len());
				tracing::trace!(reference = %self.reference, bytes = n, "recv");
				Ok(n)
			}
			Err(err) => self.read_failed(err),
		}
	}

	/// Consumes and drops up to `max` pending bytes (at most 64 KiB per call).
	pub fn discard(&mut self, max: usize) -> Result<usize> {
		if max == 0 {
			return Ok(0);
		}
		let mut scratch = vec![0u8; max.min(DISCARD_CHUNK)];
		self.recv(&mut scratch)
	}

	/// Writes from `buf`, never raising `SIGPIPE`.
	///
	/// Returns 0 and closes the socket when the peer is gone. Writing to a
	/// closed socket returns 0.
	pub fn send(&mut self, buf: &[u8]) -> Result<usize> {
		let Some(stream) = self.client_stream()? else {
			return Ok(0);
		};
		if buf.is_empty() {
			return Ok(0);
		}

		let mut result = stream.send_with_flags(buf, libc::MSG_NOSIGNAL);
		if matches!(result, Err(IoError::Write { errno: libc::EINTR })) {
			result = stream.send_with_flags(buf, libc::MSG_NOSIGNAL);
		}

		match result {
			Ok(n) => {
				tracing::trace!(reference = %self.reference, bytes = n, "send");
				Ok(n)
			}
			Err(IoError::Write { errno: libc::EPIPE }) => {
				self.close_with(Disconnect::BrokenPipe);
				Ok(0)
			}
			Err(IoError::Write { errno: libc::ECONNRESET }) => {
				self.close_with(Disconnect::Reset);
				Ok(0)
			}
			Err(IoError::Write { errno: libc::EAGAIN }) => Err(IoError::WouldBlock.into()),
			Err(IoError::Write { errno: libc::EINTR }) => Err(IoError::Interrupted.into()),
			Err(err) => Err(err.into()),
		}
	}

	/// Writes all of `buf` unless the connection goes away first.
	///
	/// Returns the number of bytes written.
	pub fn send_all(&mut self, buf: &[u8]) -> Result<usize> {
		let mut written = 0;
		while written < buf.len() {
			match self.send(&buf[written..])? {
				0 => break,
				n => written += n,
			}
		}
		Ok(written)
	}

	fn read_failed(&mut self, err: IoError) -> Result<usize> {
		match err {
			IoError::Read { errno: libc::ECONNRESET } => {
				self.close_with(Disconnect::Reset);
				Ok(0)
			}
			IoError::Read { errno: libc::EAGAIN } => Err(IoError::WouldBlock.into()),
			IoError::Read { errno: libc::EINTR } => Err(IoError::Interrupted.into()),
			err => Err(err.into()),
		}
	}

	/// The connected stream of a client, `None` once closed.
	fn client_stream(&self) -> Result<Option<&ConnectedStream<T::Domain>>> {
		match &self.state {
			State::Client(stream) => Ok(Some(stream)),
			State::Closed => Ok(None),
			_ => Err(SocketError::WrongRole {
				expected: Role::Client,
				actual: self.role(),
			}.into()),
		}
	}

	fn pending_error(&self) -> i32 {
		let result = match &self.state {
			State::Client(stream) | State::Accepted(stream) => take_error(stream),
			State::Server(listener) => take_error(listener),
			State::Closed => Ok(0),
		};
		result.unwrap_or_else(|err| err.errno().unwrap_or(0))
	}

	fn require_unset(&self) -> Result<()> {
		match &self.state {
			State::Closed => Ok(()),
			_ => Err(SocketError::AlreadyBound { role: self.role() }.into()),
		}
	}

	// ------------------------------------------------------------------------
	// Accessors
	// ------------------------------------------------------------------------

	/// True while the socket holds an open descriptor.
	#[inline]
	pub fn is_connected(&self) -> bool {
		!matches!(self.state, State::Closed)
	}

	pub fn role(&self) -> Role {
		match self.state {
			State::Closed | State::Accepted(_) => Role::Unset,
			State::Client(_) => Role::Client,
			State::Server(_) => Role::Server,
		}
	}

	/// Stable identifier: `"TCP:10.0.0.1:443"`, `"UNIX:/tmp/x.sock"`.
	#[inline]
	pub fn reference(&self) -> &str {
		&self.reference
	}

	/// How the socket was disconnected, once it has been.
	pub fn disconnect(&self) -> Option<Disconnect> {
		self.disconnect
	}

	pub fn raw_fd(&self) -> Option<RawFd> {
		match &self.state {
			State::Closed => None,
			State::Client(stream) | State::Accepted(stream) => Some(stream.as_raw_fd()),
			State::Server(listener) => Some(listener.as_raw_fd()),
		}
	}

	pub fn transport(&self) -> &T {
		&self.transport
	}

	pub fn config(&self) -> &SocketConfig {
		&self.config
	}
}

impl<T: Transport> std::fmt::Debug for Socket<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Socket")
			.field("reference", &self.reference)
			.field("role", &self.role())
			.field("fd", &self.raw_fd())
			.field("disconnect", &self.disconnect)
			.finish()
	}
}
