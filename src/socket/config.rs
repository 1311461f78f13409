use std::os::fd::AsRawFd;

use crate::error::Result;
use super::{
	set_keepalive, set_keepalive_count, set_keepalive_idle, set_keepalive_interval, set_linger,
	set_recv_buffer_size, set_reuse_addr, set_reuse_port, set_send_buffer_size, set_tcp_nodelay,
};

/// Listen backlog used when none is configured.
pub const DEFAULT_BACKLOG: i32 = 5;

// ============================================================================
// Shared Configuration Structs
// ============================================================================

/// Buffer size configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferConfig {
	pub recv: Option<usize>,
	pub send: Option<usize>,
}

impl BufferConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn recv(mut self, size: usize) -> Self {
		self.recv = Some(size);
		self
	}

	pub fn send(mut self, size: usize) -> Self {
		self.send = Some(size);
		self
	}

	pub fn both(mut self, size: usize) -> Self {
		self.recv = Some(size);
		self.send = Some(size);
		self
	}

	fn apply<S: AsRawFd>(&self, socket: &S) -> Result<()> {
		if let Some(size) = self.recv {
			set_recv_buffer_size(socket, size)?;
		}
		if let Some(size) = self.send {
			set_send_buffer_size(socket, size)?;
		}
		Ok(())
	}
}

/// Address reuse configuration.
///
/// Both flags are off unless the caller asks for a rebind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReuseConfig {
	pub addr: bool,
	pub port: bool,
}

impl ReuseConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn addr(mut self, enable: bool) -> Self {
		self.addr = enable;
		self
	}

	pub fn port(mut self, enable: bool) -> Self {
		self.port = enable;
		self
	}

	fn apply<S: AsRawFd>(&self, socket: &S) -> Result<()> {
		if self.addr {
			set_reuse_addr(socket, true)?;
		}
		if self.port {
			set_reuse_port(socket, true)?;
		}
		Ok(())
	}
}

/// TCP-specific configuration. Ignored on Unix sockets, except linger.
#[derive(Debug, Clone, Copy)]
pub struct TcpConfig {
	pub nodelay: bool,
	pub keepalive: Option<KeepaliveConfig>,
	pub linger: Option<Option<u32>>,
}

impl Default for TcpConfig {
	fn default() -> Self {
		Self {
			nodelay: true,
			keepalive: None,
			linger: None,
		}
	}
}

impl TcpConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn nodelay(mut self, enable: bool) -> Self {
		self.nodelay = enable;
		self
	}

	pub fn keepalive(mut self, config: KeepaliveConfig) -> Self {
		self.keepalive = Some(config);
		self
	}

	pub fn linger(mut self, seconds: Option<u32>) -> Self {
		self.linger = Some(seconds);
		self
	}

	fn apply<S: AsRawFd>(&self, socket: &S, is_unix: bool) -> Result<()> {
		if !is_unix {
			if self.nodelay {
				set_tcp_nodelay(socket, true)?;
			}
			if let Some(config) = self.keepalive {
				set_keepalive(socket, true)?;
				set_keepalive_idle(socket, config.idle_secs)?;
				set_keepalive_interval(socket, config.interval_secs)?;
				set_keepalive_count(socket, config.count)?;
			}
		}
		if let Some(linger) = self.linger {
			set_linger(socket, linger)?;
		}
		Ok(())
	}
}

/// Keep-alive timing configuration.
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveConfig {
	pub idle_secs: u32,
	pub interval_secs: u32,
	pub count: u32,
}

impl Default for KeepaliveConfig {
	fn default() -> Self {
		Self {
			idle_secs: 60,
			interval_secs: 10,
			count: 5,
		}
	}
}

impl KeepaliveConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn idle(mut self, secs: u32) -> Self {
		self.idle_secs = secs;
		self
	}

	pub fn interval(mut self, secs: u32) -> Self {
		self.interval_secs = secs;
		self
	}

	pub fn count(mut self, count: u32) -> Self {
		self.count = count;
		self
	}
}

/// What `Socket::close` does to a connected stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CloseMode {
	/// Plain `close()`.
	#[default]
	Close,
	/// `shutdown(SHUT_RDWR)` first, then `close()`.
	ShutdownThenClose,
}

// ============================================================================
// Socket Configuration
// ============================================================================

/// Everything a `Socket` applies to its descriptors.
///
/// # Example
/// ```ignore
/// use jaycore::{Socket, SocketConfig, ReuseConfig, TcpConfig};
///
/// let config = SocketConfig::new()
///     .reuse(ReuseConfig::new().addr(true))
///     .tcp(TcpConfig::new().nodelay(true))
///     .backlog(64);
/// let mut listener = Socket::tcp("0.0.0.0", 8080).with_config(config);
/// listener.bind()?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SocketConfig {
	pub reuse: ReuseConfig,
	pub tcp: TcpConfig,
	pub buffers: BufferConfig,
	pub backlog: i32,
	pub close_mode: CloseMode,
}

impl Default for SocketConfig {
	fn default() -> Self {
		Self {
			reuse: ReuseConfig::default(),
			tcp: TcpConfig::default(),
			buffers: BufferConfig::default(),
			backlog: DEFAULT_BACKLOG,
			close_mode: CloseMode::default(),
		}
	}
}

impl SocketConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set address reuse options.
	pub fn reuse(mut self, config: ReuseConfig) -> Self {
		self.reuse = config;
		self
	}

	/// Set TCP options (ignored for Unix sockets).
	pub fn tcp(mut self, config: TcpConfig) -> Self {
		self.tcp = config;
		self
	}

	/// Set buffer sizes.
	pub fn buffers(mut self, config: BufferConfig) -> Self {
		self.buffers = config;
		self
	}

	/// Set listen backlog. Default: 5.
	pub fn backlog(mut self, backlog: i32) -> Self {
		self.backlog = backlog;
		self
	}

	pub fn close_mode(mut self, mode: CloseMode) -> Self {
		self.close_mode = mode;
		self
	}

	/// Options for a socket about to be bound.
	pub(crate) fn apply_listener<S: AsRawFd>(&self, socket: &S, is_unix: bool) -> Result<()> {
		self.reuse.apply(socket)?;
		self.tcp.apply(socket, is_unix)?;
		self.buffers.apply(socket)
	}

	/// Options for a connecting or freshly accepted stream.
	pub(crate) fn apply_stream<S: AsRawFd>(&self, socket: &S, is_unix: bool) -> Result<()> {
		self.tcp.apply(socket, is_unix)?;
		self.buffers.apply(socket)
	}
}
