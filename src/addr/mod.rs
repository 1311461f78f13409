//! Address families and related types.
//!
//! This module defines the two address families a server can listen on:
//! - `Ipv4`: Internet Protocol version 4
//! - `Unix`: Unix domain sockets (local only)

mod ipv4;
mod unix;
pub use self::ipv4::{Ipv4, SocketAddrV4};
pub use self::unix::{Unix, UnixAddr, MAX_UNIX_PATH};

/// Trait for address family markers.
///
/// Each type implementing this trait represents an address family
/// that can be passed to the `socket()` syscall.
pub trait Domain: Send + Sync + 'static {
	/// The socket address type used by this family.
	type Addr: SockAddr;

	/// Returns the libc constant for this address family.
	fn raw() -> libc::c_int;
}

/// Everything the socket layer needs from an address type.
pub trait SockAddr:
	ToSockAddr + FromSockAddr + std::fmt::Debug + std::fmt::Display + Clone + Send + Sync + 'static
{
}

impl<A> SockAddr for A where
	A: ToSockAddr + FromSockAddr + std::fmt::Debug + std::fmt::Display + Clone + Send + Sync + 'static
{
}

/// Trait for address types that can be converted to raw sockaddr for syscalls.
pub trait ToSockAddr {
	/// Calls the provided closure with a pointer to the raw sockaddr and its size.
	/// Returns None if the address is invalid (e.g., path too long for Unix).
	fn with_raw<F, R>(&self, f: F) -> Option<R>
	where
		F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R;
}
/*
sockaddr_in and sockaddr_un have different sizes, so the raw struct
is built on the stack of with_raw() and only lent to the closure.
 */

/// Trait for address types that can be created from raw sockaddr.
pub trait FromSockAddr: Sized {
	/// Creates address from raw sockaddr storage.
	///
	/// # Safety
	/// The sockaddr must be of the correct family for this type
	/// and valid for `len` bytes.
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self>;
}

impl FromSockAddr for SocketAddrV4 {
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
		if len < std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t {
			return None;
		}
		let raw = unsafe { &*(addr as *const libc::sockaddr_in) };
		Some(Self::from_raw(raw))
	}
}

impl FromSockAddr for UnixAddr {
	unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
		let family_len = std::mem::size_of::<libc::sa_family_t>() as libc::socklen_t;
		if len < family_len {
			return None;
		}
		if len == family_len {
			// Peers of accept() on a Unix listener are normally unbound.
			return Some(UnixAddr::unnamed());
		}
		let raw = unsafe { &*(addr as *const libc::sockaddr_un) };
		Some(Self::from_raw(raw))
	}
}

/// Reads an address with `getsockname()` or `getpeername()`.
pub(crate) fn query_addr<A: FromSockAddr>(
	fd: libc::c_int,
	peer: bool,
) -> Option<A> {
	let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
	let ptr = &mut storage as *mut _ as *mut libc::sockaddr;

	let result = unsafe {
		if peer {
			libc::getpeername(fd, ptr, &mut len)
		} else {
			libc::getsockname(fd, ptr, &mut len)
		}
	};
	if result == -1 {
		return None;
	}
	unsafe { A::from_sockaddr(ptr, len) }
}
