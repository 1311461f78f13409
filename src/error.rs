use crate::socket::Role;

/// Socket creation/configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("socket() failed: {}", errno_to_str(*.errno))]
    Create { errno: i32 },

    #[error("bind({addr}) failed: {}", errno_to_str(*.errno))]
    Bind { errno: i32, addr: String },

    #[error("listen(backlog={backlog}) failed: {}", errno_to_str(*.errno))]
    Listen { errno: i32, backlog: i32 },

    #[error("connect({addr}) failed: {}", errno_to_str(*.errno))]
    Connect { errno: i32, addr: String },

    #[error("accept() failed: {}", errno_to_str(*.errno))]
    Accept { errno: i32 },

    #[error("setsockopt({option}) failed: {}", errno_to_str(*.errno))]
    SetOption { errno: i32, option: &'static str },

    #[error("getsockopt({option}) failed: {}", errno_to_str(*.errno))]
    GetOption { errno: i32, option: &'static str },

    #[error("invalid address: {reason}")]
    InvalidAddress { reason: &'static str },

    #[error("cannot resolve host {host:?}")]
    DnsResolution { host: String },

    #[error("operation requires a {expected} socket, found {actual}")]
    WrongRole { expected: Role, actual: Role },

    #[error("socket is not connected")]
    NotConnected,

    #[error("socket is already a {role} socket")]
    AlreadyBound { role: Role },
}

/// I/O operation errors.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("recv() failed: {}", errno_to_str(*.errno))]
    Read { errno: i32 },

    #[error("send() failed: {}", errno_to_str(*.errno))]
    Write { errno: i32 },

    #[error("poll() failed: {}", errno_to_str(*.errno))]
    Poll { errno: i32 },

    #[error("operation would block")]
    WouldBlock,

    #[error("interrupted by signal")]
    Interrupted,
}

/// Worker thread errors.
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    #[error("failed to spawn thread {name:?}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("thread {name:?} is already running")]
    AlreadyRunning { name: String },

    #[error("thread {name:?} lost its tick context")]
    Unavailable { name: String },

    #[error("connection limit of {limit} reached")]
    LimitReached { limit: usize },
}

/// Any error the runtime reports.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Thread(#[from] ThreadError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Enumerated error kind, independent of which layer raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    WrongRole,
    NotConnected,
    AlreadyBound,
    InvalidAddress,
    Again,
    Interrupted,
    RemoteDisconnect,
    BrokenPipe,
    ConnectionReset,
    SocketCreate,
    AddressInUse,
    PermissionDenied,
    ConnectionRefused,
    DnsResolution,
    Transport,
    ThreadCreate,
    AlreadyRunning,
    ResourceExhausted,
}

/// Coarse grouping that decides how an error is handled.
///
/// - `Usage`: caller bug, surfaced and never retried
/// - `Transient`: retried once or deferred to the next tick
/// - `Peer`: turned into an automatic close of the socket
/// - `Transport`: the operation fails and is reported to the embedder
/// - `Resource`: fatal for the affected worker only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Usage,
    Transient,
    Peer,
    Transport,
    Resource,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::WrongRole
            | ErrorKind::NotConnected
            | ErrorKind::AlreadyBound
            | ErrorKind::InvalidAddress
            | ErrorKind::AlreadyRunning => ErrorCategory::Usage,
            ErrorKind::Again | ErrorKind::Interrupted => ErrorCategory::Transient,
            ErrorKind::RemoteDisconnect | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset => {
                ErrorCategory::Peer
            }
            ErrorKind::SocketCreate
            | ErrorKind::AddressInUse
            | ErrorKind::PermissionDenied
            | ErrorKind::ConnectionRefused
            | ErrorKind::DnsResolution
            | ErrorKind::Transport => ErrorCategory::Transport,
            ErrorKind::ThreadCreate | ErrorKind::ResourceExhausted => ErrorCategory::Resource,
        }
    }
}

impl SocketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SocketError::Create { errno } => match *errno {
                libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM => {
                    ErrorKind::ResourceExhausted
                }
                _ => ErrorKind::SocketCreate,
            },
            SocketError::Bind { errno, .. } | SocketError::Listen { errno, .. } => match *errno {
                libc::EADDRINUSE => ErrorKind::AddressInUse,
                libc::EACCES | libc::EPERM => ErrorKind::PermissionDenied,
                _ => ErrorKind::Transport,
            },
            SocketError::Connect { errno, .. } => match *errno {
                libc::ECONNREFUSED | libc::ENOENT => ErrorKind::ConnectionRefused,
                libc::EACCES | libc::EPERM => ErrorKind::PermissionDenied,
                _ => ErrorKind::Transport,
            },
            SocketError::Accept { errno } => match *errno {
                libc::EAGAIN | libc::ECONNABORTED => ErrorKind::Again,
                libc::EINTR => ErrorKind::Interrupted,
                libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM => {
                    ErrorKind::ResourceExhausted
                }
                _ => ErrorKind::Transport,
            },
            SocketError::SetOption { .. } | SocketError::GetOption { .. } => ErrorKind::Transport,
            SocketError::InvalidAddress { .. } => ErrorKind::InvalidAddress,
            SocketError::DnsResolution { .. } => ErrorKind::DnsResolution,
            SocketError::WrongRole { .. } => ErrorKind::WrongRole,
            SocketError::NotConnected => ErrorKind::NotConnected,
            SocketError::AlreadyBound { .. } => ErrorKind::AlreadyBound,
        }
    }

    pub fn errno(&self) -> Option<i32> {
        match self {
            SocketError::Create { errno }
            | SocketError::Bind { errno, .. }
            | SocketError::Listen { errno, .. }
            | SocketError::Connect { errno, .. }
            | SocketError::Accept { errno }
            | SocketError::SetOption { errno, .. }
            | SocketError::GetOption { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

impl IoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IoError::Read { errno } | IoError::Write { errno } | IoError::Poll { errno } => {
                match *errno {
                    libc::EAGAIN => ErrorKind::Again,
                    libc::EINTR => ErrorKind::Interrupted,
                    libc::EPIPE => ErrorKind::BrokenPipe,
                    libc::ECONNRESET => ErrorKind::ConnectionReset,
                    libc::ENOTCONN => ErrorKind::NotConnected,
                    _ => ErrorKind::Transport,
                }
            }
            IoError::WouldBlock => ErrorKind::Again,
            IoError::Interrupted => ErrorKind::Interrupted,
        }
    }

    pub fn errno(&self) -> Option<i32> {
        match self {
            IoError::Read { errno } | IoError::Write { errno } | IoError::Poll { errno } => {
                Some(*errno)
            }
            _ => None,
        }
    }
}

impl ThreadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ThreadError::Spawn { .. } | ThreadError::Unavailable { .. } => ErrorKind::ThreadCreate,
            ThreadError::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
            ThreadError::LimitReached { .. } => ErrorKind::ResourceExhausted,
        }
    }
}

impl Error {
    /// Returns the enumerated kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Socket(err) => err.kind(),
            Error::Io(err) => err.kind(),
            Error::Thread(err) => err.kind(),
        }
    }

    /// Returns the underlying OS error code, if the error came from a syscall.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Error::Socket(err) => err.errno(),
            Error::Io(err) => err.errno(),
            Error::Thread(ThreadError::Spawn { source, .. }) => source.raw_os_error(),
            Error::Thread(_) => None,
        }
    }

    #[inline]
    pub fn category(&self) -> ErrorCategory {
        self.kind().category()
    }
}

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
    match errno {
        libc::EACCES => "permission denied".into(),
        libc::EADDRINUSE => "address already in use".into(),
        libc::EADDRNOTAVAIL => "address not available".into(),
        libc::EAFNOSUPPORT => "address family not supported".into(),
        libc::EAGAIN => "resource temporarily unavailable".into(),
        libc::EBADF => "bad file descriptor".into(),
        libc::ECONNABORTED => "connection aborted".into(),
        libc::ECONNREFUSED => "connection refused".into(),
        libc::ECONNRESET => "connection reset by peer".into(),
        libc::EINTR => "interrupted by signal".into(),
        libc::EINVAL => "invalid argument".into(),
        libc::EMFILE => "too many open files".into(),
        libc::ENFILE => "file table overflow".into(),
        libc::ENETUNREACH => "network unreachable".into(),
        libc::ENOBUFS => "no buffer space available".into(),
        libc::ENOENT => "no such file or directory".into(),
        libc::ENOTCONN => "not connected".into(),
        libc::EPIPE => "broken pipe".into(),
        libc::ETIMEDOUT => "connection timed out".into(),
        _ => format!("errno {}", errno),
    }
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
    match errno {
        libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
        libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
        libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
        libc::EAGAIN => std::io::ErrorKind::WouldBlock,
        libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
        libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
        libc::EINTR => std::io::ErrorKind::Interrupted,
        libc::EINVAL => std::io::ErrorKind::InvalidInput,
        libc::ENOTCONN => std::io::ErrorKind::NotConnected,
        libc::EPIPE => std::io::ErrorKind::BrokenPipe,
        libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
        _ => std::io::ErrorKind::Other,
    }
}

impl From<SocketError> for std::io::Error {
    fn from(err: SocketError) -> Self {
        let kind = match &err {
            SocketError::InvalidAddress { .. } | SocketError::DnsResolution { .. } => {
                std::io::ErrorKind::InvalidInput
            }
            SocketError::WrongRole { .. } | SocketError::AlreadyBound { .. } => {
                std::io::ErrorKind::Unsupported
            }
            SocketError::NotConnected => std::io::ErrorKind::NotConnected,
            other => other.errno().map_or(std::io::ErrorKind::Other, errno_to_kind),
        };
        std::io::Error::new(kind, err)
    }
}

impl From<IoError> for std::io::Error {
    fn from(err: IoError) -> Self {
        let kind = match &err {
            IoError::Read { errno } | IoError::Write { errno } | IoError::Poll { errno } => {
                errno_to_kind(*errno)
            }
            IoError::WouldBlock => std::io::ErrorKind::WouldBlock,
            IoError::Interrupted => std::io::ErrorKind::Interrupted,
        };
        std::io::Error::new(kind, err)
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Socket(err) => err.into(),
            Error::Io(err) => err.into(),
            Error::Thread(ThreadError::Spawn { source, .. }) => source,
            Error::Thread(err) => std::io::Error::other(err),
        }
    }
}
