use crate::addr::{Domain, ToSockAddr};

/// Longest filesystem path a `sockaddr_un` can hold, excluding the terminator.
pub const MAX_UNIX_PATH: usize = 107;

/// Unix domain socket marker.
///
/// Sockets with this domain use filesystem paths (e.g., /tmp/app.sock).
/// Only works on the same machine.
pub struct Unix;

impl Domain for Unix {
	type Addr = UnixAddr;

	#[inline]
	fn raw() -> libc::c_int {
		libc::AF_UNIX
	}
}

/// Unix domain socket address (file path, abstract name, or unnamed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnixAddr {
	path: Vec<u8>,
	/// True if this is an abstract socket (Linux-only, no filesystem entry).
	is_abstract: bool,
}

impl UnixAddr {
	/// Creates a new Unix address from a filesystem path.
	pub fn new<P: AsRef<[u8]>>(path: P) -> Self {
		Self {
			path: path.as_ref().to_vec(),
			is_abstract: false,
		}
	}

	/// Creates an abstract socket address (Linux-only).
	///
	/// Abstract sockets exist only in memory, with no filesystem entry.
	pub fn abstract_socket<P: AsRef<[u8]>>(name: P) -> Self {
		Self {
			path: name.as_ref().to_vec(),
			is_abstract: true,
		}
	}

	/// The address of an unbound peer.
	pub(crate) fn unnamed() -> Self {
		Self { path: Vec::new(), is_abstract: false }
	}

	/// Returns true if this is an abstract socket.
	pub fn is_abstract(&self) -> bool {
		self.is_abstract
	}

	/// Returns true for the address of an unbound socket.
	pub fn is_unnamed(&self) -> bool {
		self.path.is_empty() && !self.is_abstract
	}

	/// Returns the path bytes.
	pub fn path(&self) -> &[u8] {
		&self.path
	}

	/// Returns true if the address fits into `sockaddr_un`.
	pub fn fits(&self) -> bool {
		self.path.len() <= MAX_UNIX_PATH
	}

	/// Converts to the raw sockaddr_un and its meaningful length.
	pub(crate) fn to_raw(&self) -> Option<(libc::sockaddr_un, libc::socklen_t)> {
		if !self.fits() {
			return None;
		}
		let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
		addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

		// Abstract names start after a leading NUL; paths end with one.
		let offset = usize::from(self.is_abstract);
		for (i, &byte) in self.path.iter().enumerate() {
			addr.sun_path[i + offset] = byte as libc::c_char;
		}
		let len = std::mem::size_of::<libc::sa_family_t>() + self.path.len() + 1;
		Some((addr, len as libc::socklen_t))
	}

	/// Creates from raw sockaddr_un.
	pub(crate) fn from_raw(raw: &libc::sockaddr_un) -> Self {
		if raw.sun_path[0] == 0 {
			let len = raw.sun_path[1..]
				.iter()
				.position(|&c| c == 0)
				.unwrap_or(raw.sun_path.len() - 1);
			let path = raw.sun_path[1..=len].iter().map(|&c| c as u8).collect();
			Self { path, is_abstract: true }
		} else {
			let len = raw.sun_path
				.iter()
				.position(|&c| c == 0)
				.unwrap_or(raw.sun_path.len());
			let path = raw.sun_path[..len].iter().map(|&c| c as u8).collect();
			Self { path, is_abstract: false }
		}
	}
}

/// Path form; abstract names are shown with a leading `@`.
impl std::fmt::Display for UnixAddr {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.is_abstract {
			f.write_str("@")?;
		}
		f.write_str(&String::from_utf8_lossy(&self.path))
	}
}

impl ToSockAddr for UnixAddr {
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R,
	{
		let (raw, len) = self.to_raw()?;
		let ptr = &raw as *const _ as *const libc::sockaddr;
		Some(f(ptr, len))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::addr::FromSockAddr;

	#[test]
	fn path_too_long_is_rejected() {
		let ok = UnixAddr::new("a".repeat(MAX_UNIX_PATH));
		assert!(ok.with_raw(|_, _| ()).is_some());

		let long = UnixAddr::new("a".repeat(MAX_UNIX_PATH + 1));
		assert!(long.with_raw(|_, _| ()).is_none());
	}

	#[test]
	fn abstract_name_survives_raw_form() {
		let addr = UnixAddr::abstract_socket("jaycore");
		let back = addr
			.with_raw(|ptr, len| unsafe { UnixAddr::from_sockaddr(ptr, len) })
			.flatten()
			.unwrap();
		assert!(back.is_abstract());
		assert_eq!(back.path(), b"jaycore");
		assert_eq!(back.to_string(), "@jaycore");
	}

	#[test]
	fn family_only_sockaddr_is_unnamed() {
		let raw: libc::sockaddr_un = unsafe { std::mem::zeroed() };
		let ptr = &raw as *const _ as *const libc::sockaddr;
		let len = std::mem::size_of::<libc::sa_family_t>() as libc::socklen_t;
		let addr = unsafe { UnixAddr::from_sockaddr(ptr, len) }.unwrap();
		assert!(addr.is_unnamed());
	}
}
