pub mod addr;
pub mod env;
pub mod socket;
mod connection;
mod error;
mod handler;
mod system;
mod thread;

pub use self::error::{Error, ErrorCategory, ErrorKind, IoError, Result, SocketError, ThreadError, errno};
pub use self::addr::{Domain, Ipv4, SocketAddrV4, UnixAddr};
pub use self::socket::{Disconnect, Role, Shutdown, Socket, Tcp, Transport, Unix,
					   BufferConfig, CloseMode, KeepaliveConfig, ReuseConfig, SocketConfig, TcpConfig,
					   DEFAULT_BACKLOG};
pub use self::socket::{set_reuse_addr, set_reuse_port, set_tcp_nodelay,
					   set_keepalive, set_keepalive_idle, set_keepalive_interval, set_keepalive_count,
					   set_linger, set_recv_buffer_size, set_send_buffer_size, take_error};
pub use self::thread::{Exit, Tick, TickGuard, TickLock, ThreadState, TickThread};
pub use self::handler::{CloseReason, Handler, Origin};
pub use self::connection::{Connection, ConnectionConfig};
pub use self::system::{System, SystemConfig, SystemStats};
