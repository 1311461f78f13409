use std::marker::PhantomData;
use std::os::fd::{AsRawFd, OwnedFd};

use crate::addr::{self, Domain};
use crate::error::{IoError, Result, SocketError, errno};

/// A connected stream socket.
///
/// Created by Listener::accept() (server side) or RawSocket::connect() (client side).
pub struct ConnectedStream<D: Domain> {
	fd: OwnedFd,
	_marker: PhantomData<D>,
}

impl<D: Domain> ConnectedStream<D> {
	pub(crate) fn from_fd(fd: OwnedFd) -> Self {
		Self {
			fd,
			_marker: PhantomData,
		}
	}

	pub fn send_with_flags(&self, buf: &[u8], flags: i32) -> std::result::Result<usize, IoError> {
		let n = unsafe {
			libc::send(
				self.fd.as_raw_fd(),
				buf.as_ptr() as *const libc::c_void,
				buf.len(),
				flags,
			)
		};

		if n == -1 {
			Err(IoError::Write { errno: errno() })
		} else {
			Ok(n as usize)
		}
	}

	/// Returns the kernel byte count; 0 means the peer closed its side.
	pub fn recv_with_flags(&self, buf: &mut [u8], flags: i32) -> std::result::Result<usize, IoError> {
		let n = unsafe {
			libc::recv(
				self.fd.as_raw_fd(),
				buf.as_mut_ptr() as *mut libc::c_void,
				buf.len(),
				flags,
			)
		};

		if n == -1 {
			Err(IoError::Read { errno: errno() })
		} else {
			Ok(n as usize)
		}
	}

	pub fn shutdown(&self, how: Shutdown) -> Result<()> {
		let how = match how {
			Shutdown::Read => libc::SHUT_RD,
			Shutdown::Write => libc::SHUT_WR,
			Shutdown::ReadWrite => libc::SHUT_RDWR,
		};

		let result = unsafe { libc::shutdown(self.fd.as_raw_fd(), how) };

		if result == -1 {
			Err(SocketError::SetOption { errno: errno(), option: "shutdown" }.into())
		} else {
			Ok(())
		}
	}

	/// Returns the remote address of this connection.
	pub fn peer_addr(&self) -> Option<D::Addr> {
		addr::query_addr(self.fd.as_raw_fd(), true)
	}

	/// Returns the local address of this connection.
	pub fn local_addr(&self) -> Option<D::Addr> {
		addr::query_addr(self.fd.as_raw_fd(), false)
	}
}

impl<D: Domain> AsRawFd for ConnectedStream<D> {
	fn as_raw_fd(&self) -> std::os::fd::RawFd {
		self.fd.as_raw_fd()
	}
}

impl<D: Domain> std::os::fd::AsFd for ConnectedStream<D> {
	fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
		self.fd.as_fd()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	Read,      // SHUT_RD
	Write,     // SHUT_WR
	ReadWrite, // SHUT_RDWR
}
