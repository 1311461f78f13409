use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::{IoError, errno};

/// `revents` of a single-descriptor `poll()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Readiness(libc::c_short);

impl Readiness {
	#[inline]
	pub fn readable(self) -> bool {
		self.0 & libc::POLLIN != 0
	}

	#[inline]
	pub fn error(self) -> bool {
		self.0 & libc::POLLERR != 0
	}

	#[inline]
	pub fn hangup(self) -> bool {
		self.0 & libc::POLLHUP != 0
	}

	#[inline]
	pub fn invalid(self) -> bool {
		self.0 & libc::POLLNVAL != 0
	}

	/// Input or hangup: either way the next read makes progress.
	#[inline]
	pub fn pending(self) -> bool {
		self.0 & (libc::POLLIN | libc::POLLHUP) != 0
	}
}

/// Waits up to `timeout` for input on `fd`.
///
/// Returns `None` on timeout and when a signal interrupts the wait.
pub(crate) fn poll_input(fd: RawFd, timeout: Duration) -> Result<Option<Readiness>, IoError> {
	let mut pfd = libc::pollfd {
		fd,
		events: libc::POLLIN,
		revents: 0,
	};
	let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

	let n = unsafe { libc::poll(&mut pfd, 1, millis) };
	match n {
		-1 => match errno() {
			libc::EINTR => Ok(None),
			e => Err(IoError::Poll { errno: e }),
		},
		0 => Ok(None),
		_ => Ok(Some(Readiness(pfd.revents))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hangup_alone_counts_as_pending() {
		let hup = Readiness(libc::POLLHUP);
		assert!(!hup.readable());
		assert!(hup.pending());
		assert!(Readiness(libc::POLLIN).pending());
		assert!(!Readiness(0).pending());
		assert!(!Readiness(libc::POLLNVAL).pending());
	}
}
