use std::marker::PhantomData;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

use crate::addr::{self, Domain, FromSockAddr};
use crate::error::{Result, SocketError, errno};
use super::stream::ConnectedStream;

/// A listening socket ready to accept connections.
///
/// The type parameter D tracks which address family (Ipv4, Unix).
pub struct Listener<D: Domain> {
	fd: OwnedFd,
	_marker: PhantomData<D>,
}

impl<D: Domain> Listener<D> {
	/// Internal use only: called by BoundSocket::listen()
	pub(crate) fn from_fd(fd: OwnedFd) -> Self {
		Self {
			fd,
			_marker: PhantomData,
		}
	}

	/// Accepts a connection, returning the client's address.
	///
	/// Blocks unless a connection is already pending, so callers poll first.
	pub fn accept(&self) -> Result<(ConnectedStream<D>, D::Addr)> {
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

		let fd = unsafe {
			libc::accept4(
				self.fd.as_raw_fd(),
				&mut storage as *mut _ as *mut libc::sockaddr,
				&mut len,
				libc::SOCK_CLOEXEC,
			)
		};

		if fd == -1 {
			return Err(SocketError::Accept { errno: errno() }.into());
		}

		let stream = ConnectedStream::from_fd(unsafe { OwnedFd::from_raw_fd(fd) });

		let addr = unsafe {
			D::Addr::from_sockaddr(&storage as *const _ as *const libc::sockaddr, len)
				.ok_or(SocketError::InvalidAddress {
					reason: "invalid client address",
				})?
		};

		Ok((stream, addr))
	}

	/// Returns the address the listener is bound to.
	///
	/// For TCP this reports the kernel-chosen port after binding port 0.
	pub fn local_addr(&self) -> Option<D::Addr> {
		addr::query_addr(self.fd.as_raw_fd(), false)
	}
}

impl<D: Domain> AsRawFd for Listener<D> {
	fn as_raw_fd(&self) -> std::os::fd::RawFd {
		self.fd.as_raw_fd()
	}
}

impl<D: Domain> std::os::fd::AsFd for Listener<D> {
	fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
		self.fd.as_fd()
	}
}
