//! Transport capability: how a socket family resolves, binds, connects and accepts.
//!
//! `Tcp` and `Unix` differ only in address resolution, the `sockaddr` they
//! hand to the kernel, and the tag at the front of reference strings.

use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::addr::{self, Domain, Ipv4, SocketAddrV4, UnixAddr};
use crate::error::{Result, SocketError};
use super::config::{CloseMode, SocketConfig};
use super::listener::Listener;
use super::raw::RawSocket;
use super::stream::{ConnectedStream, Shutdown};
use super::Role;

/// Address type of a transport's family.
pub type Addr<T> = <<T as Transport>::Domain as Domain>::Addr;

/// Family-specific behaviour injected into a [`Socket`](super::Socket).
pub trait Transport: Send + Sync + Sized + 'static {
	/// Address family used for `socket()`.
	type Domain: Domain;

	/// Prefix of every reference string, e.g. `"TCP"`.
	const TAG: &'static str;

	/// Resolves the configured target into a kernel address.
	///
	/// `role` is `Role::Server` when resolving for `bind()`.
	fn resolve(&self, role: Role) -> Result<Addr<Self>>;

	/// Builds the transport and reference string of an accepted peer.
	fn peer(&self, peer: &Addr<Self>) -> (Self, String);

	/// Human-readable target, used before the socket is connected or bound.
	fn target(&self) -> String;

	#[inline]
	fn is_unix() -> bool {
		Self::Domain::raw() == libc::AF_UNIX
	}

	/// Reference string for a resolved address: `"<TAG>:<address>"`.
	fn reference(addr: &Addr<Self>) -> String {
		format!("{}:{}", Self::TAG, addr)
	}

	fn connect(&self, config: &SocketConfig) -> Result<(ConnectedStream<Self::Domain>, String)> {
		let addr = self.resolve(Role::Client)?;
		let raw = RawSocket::<Self::Domain>::new()?;
		config.apply_stream(&raw, Self::is_unix())?;
		let stream = raw.connect(&addr)?;
		Ok((stream, Self::reference(&addr)))
	}

	fn bind(&self, config: &SocketConfig) -> Result<(Listener<Self::Domain>, String)> {
		let addr = self.resolve(Role::Server)?;
		let raw = RawSocket::<Self::Domain>::new()?;
		config.apply_listener(&raw, Self::is_unix())?;
		let listener = raw.bind(&addr)?.listen(config.backlog)?;
		let bound = listener.local_addr().unwrap_or(addr);
		Ok((listener, Self::reference(&bound)))
	}

	fn accept(
		&self,
		listener: &Listener<Self::Domain>,
		config: &SocketConfig,
	) -> Result<(ConnectedStream<Self::Domain>, Self, String)> {
		let (stream, peer) = listener.accept()?;
		let (transport, reference) = self.peer(&peer);
		if let Err(err) = config.apply_stream(&stream, Self::is_unix()) {
			tracing::debug!(reference = %reference, error = %err, "socket options not applied");
		}
		Ok((stream, transport, reference))
	}

	fn close(&self, stream: ConnectedStream<Self::Domain>, mode: CloseMode) {
		if mode == CloseMode::ShutdownThenClose {
			let _ = stream.shutdown(Shutdown::ReadWrite);
		}
		drop(stream);
	}
}

// ============================================================================
// TCP
// ============================================================================

/// TCP over IPv4: a host (dotted quad or DNS name) and a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tcp {
	host: String,
	port: u16,
}

impl Tcp {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self { host: host.into(), port }
	}

	pub fn host(&self) -> &str {
		&self.host
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	fn lookup(&self) -> Result<SocketAddrV4> {
		if let Ok(ip) = self.host.parse::<std::net::Ipv4Addr>() {
			return Ok(SocketAddrV4::new(ip.octets(), self.port));
		}
		(self.host.as_str(), self.port)
			.to_socket_addrs()
			.ok()
			.and_then(|mut addrs| {
				addrs.find_map(|addr| match addr {
					SocketAddr::V4(v4) => Some(SocketAddrV4::from(v4)),
					SocketAddr::V6(_) => None,
				})
			})
			.ok_or_else(|| SocketError::DnsResolution { host: self.host.clone() }.into())
	}
}

impl Transport for Tcp {
	type Domain = Ipv4;
	const TAG: &'static str = "TCP";

	fn resolve(&self, role: Role) -> Result<SocketAddrV4> {
		// Port 0 only makes sense for bind(), where the kernel picks one.
		if self.port == 0 && role != Role::Server {
			return Err(SocketError::InvalidAddress { reason: "port 0" }.into());
		}
		self.lookup()
	}

	fn peer(&self, peer: &SocketAddrV4) -> (Self, String) {
		let [a, b, c, d] = peer.ip();
		let transport = Tcp::new(format!("{}.{}.{}.{}", a, b, c, d), peer.port());
		(transport, Self::reference(peer))
	}

	fn target(&self) -> String {
		format!("{}:{}:{}", Self::TAG, self.host, self.port)
	}
}

// ============================================================================
// UNIX
// ============================================================================

/// Unix domain stream socket at a filesystem path.
///
/// The path is never unlinked here; whoever created the file removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unix {
	path: PathBuf,
}

impl Unix {
	pub fn new(path: impl AsRef<Path>) -> Self {
		Self { path: path.as_ref().to_path_buf() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Transport for Unix {
	type Domain = addr::Unix;
	const TAG: &'static str = "UNIX";

	fn resolve(&self, _role: Role) -> Result<UnixAddr> {
		let addr = UnixAddr::new(self.path.as_os_str().as_bytes());
		if addr.path().is_empty() {
			return Err(SocketError::InvalidAddress { reason: "empty unix socket path" }.into());
		}
		if !addr.fits() {
			return Err(SocketError::InvalidAddress { reason: "unix socket path too long" }.into());
		}
		Ok(addr)
	}

	fn peer(&self, peer: &UnixAddr) -> (Self, String) {
		if peer.is_unnamed() || peer.is_abstract() {
			return (self.clone(), self.target());
		}
		let path = PathBuf::from(std::ffi::OsStr::from_bytes(peer.path()));
		(Unix { path }, Self::reference(peer))
	}

	fn target(&self) -> String {
		format!("{}:{}", Self::TAG, self.path.display())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::ErrorKind;

	#[test]
	fn tcp_resolves_dotted_quad() {
		let addr = Tcp::new("10.0.0.1", 443).resolve(Role::Client).unwrap();
		assert_eq!(addr, SocketAddrV4::new([10, 0, 0, 1], 443));
		assert_eq!(Tcp::reference(&addr), "TCP:10.0.0.1:443");
	}

	#[test]
	fn tcp_resolves_localhost() {
		let addr = Tcp::new("localhost", 8080).resolve(Role::Client).unwrap();
		assert_eq!(addr.port(), 8080);
		assert_eq!(addr.ip()[0], 127);
	}

	#[test]
	fn tcp_unresolvable_host() {
		let err = Tcp::new("no-such-host.invalid", 80).resolve(Role::Client).unwrap_err();
		assert_eq!(err.kind(), ErrorKind::DnsResolution);
	}

	#[test]
	fn tcp_port_zero_only_for_bind() {
		let tcp = Tcp::new("127.0.0.1", 0);
		assert_eq!(tcp.resolve(Role::Client).unwrap_err().kind(), ErrorKind::InvalidAddress);
		assert!(tcp.resolve(Role::Server).is_ok());
	}

	#[test]
	fn tcp_peer_reference() {
		let (peer, reference) = Tcp::new("0.0.0.0", 80).peer(&SocketAddrV4::new([192, 168, 1, 7], 50123));
		assert_eq!(reference, "TCP:192.168.1.7:50123");
		assert_eq!(peer.host(), "192.168.1.7");
		assert_eq!(peer.port(), 50123);
	}

	#[test]
	fn unix_reference_and_validation() {
		let unix = Unix::new("/tmp/x.sock");
		assert_eq!(unix.target(), "UNIX:/tmp/x.sock");
		let addr = unix.resolve(Role::Server).unwrap();
		assert_eq!(Unix::reference(&addr), "UNIX:/tmp/x.sock");

		let long = Unix::new(format!("/tmp/{}", "x".repeat(120)));
		assert_eq!(long.resolve(Role::Client).unwrap_err().kind(), ErrorKind::InvalidAddress);
	}

	#[test]
	fn unnamed_unix_peer_keeps_listener_path() {
		let unix = Unix::new("/tmp/jaycore-test.sock");
		let (peer, reference) = unix.peer(&UnixAddr::unnamed());
		assert_eq!(peer, unix);
		assert_eq!(reference, "UNIX:/tmp/jaycore-test.sock");
	}
}
