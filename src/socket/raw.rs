use std::marker::PhantomData;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::addr::{Domain, ToSockAddr};
use crate::error::{Result, SocketError, errno};
use super::bound::BoundSocket;
use super::stream::ConnectedStream;

/// A stream socket that has been created but not yet bound or connected.
///
/// Use `.bind()` to move towards a listener.
/// Use `.connect()` to become a connected stream.
pub struct RawSocket<D: Domain> {
	fd: OwnedFd,
	_marker: PhantomData<D>,
}

impl<D: Domain> RawSocket<D> {
	/// Creates a new stream socket.
	///
	/// The socket is created with `SOCK_CLOEXEC` (close on exec).
	pub fn new() -> Result<Self> {
		let fd = unsafe {
			libc::socket(D::raw(), libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0)
		};
		if fd == -1 {
			return Err(SocketError::Create { errno: errno() }.into());
		}
		let fd = unsafe { OwnedFd::from_raw_fd(fd) };

		Ok(Self {
			fd,
			_marker: PhantomData,
		})
	}

	/// Binds the socket to an address.
	///
	/// Consumes self, returns BoundSocket.
	pub fn bind(self, addr: &D::Addr) -> Result<BoundSocket<D>> {
		let result = addr.with_raw(|ptr, len| unsafe {
			libc::bind(self.fd.as_raw_fd(), ptr, len)
		});

		match result {
			Some(-1) => Err(SocketError::Bind {
				errno: errno(),
				addr: addr.to_string(),
			}.into()),
			Some(_) => Ok(BoundSocket::from_fd(self.fd)),
			None => Err(SocketError::InvalidAddress {
				reason: "address too long",
			}.into()),
		}
	}

	/// Connects to a remote address, blocking until the handshake completes.
	///
	/// Consumes self, returns a connected stream.
	pub fn connect(self, addr: &D::Addr) -> Result<ConnectedStream<D>> {
		let result = addr.with_raw(|ptr, len| unsafe {
			libc::connect(self.fd.as_raw_fd(), ptr, len)
		});

		match result {
			Some(-1) => Err(SocketError::Connect {
				errno: errno(),
				addr: addr.to_string(),
			}.into()),
			Some(_) => Ok(ConnectedStream::from_fd(self.fd)),
			None => Err(SocketError::InvalidAddress {
				reason: "address too long",
			}.into()),
		}
	}
}

impl<D: Domain> AsRawFd for RawSocket<D> {
	fn as_raw_fd(&self) -> std::os::fd::RawFd {
		self.fd.as_raw_fd()
	}
}

impl<D: Domain> std::os::fd::AsFd for RawSocket<D> {
	fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
		self.fd.as_fd()
	}
}
