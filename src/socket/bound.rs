use std::marker::PhantomData;
use std::os::fd::{AsRawFd, OwnedFd};

use crate::addr::Domain;
use crate::error::{Result, SocketError, errno};
use super::listener::Listener;

/// A stream socket that has been bound to an address but is not yet listening.
///
/// Call `.listen()` to become a Listener.
pub struct BoundSocket<D: Domain> {
	fd: OwnedFd,
	_marker: PhantomData<D>,
}

impl<D: Domain> BoundSocket<D> {
	/// Internal use only - called by RawSocket::bind()
	pub(crate) fn from_fd(fd: OwnedFd) -> Self {
		Self {
			fd,
			_marker: PhantomData,
		}
	}

	/// Transitions to a listening socket.
	///
	/// `backlog` is the maximum pending connections queue size.
	/// Consumes self; you cannot use BoundSocket after this.
	pub fn listen(self, backlog: i32) -> Result<Listener<D>> {
		let result = unsafe { libc::listen(self.fd.as_raw_fd(), backlog) };

		if result == -1 {
			return Err(SocketError::Listen { errno: errno(), backlog }.into());
		}

		Ok(Listener::from_fd(self.fd))
	}
}

impl<D: Domain> AsRawFd for BoundSocket<D> {
	fn as_raw_fd(&self) -> std::os::fd::RawFd {
		self.fd.as_raw_fd()
	}
}
