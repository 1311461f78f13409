//! User callbacks driven by connection workers and the supervisor.

use crate::error::Error;
use crate::socket::{Disconnect, Socket, Transport};

/// How a connection worker came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Accepted by a [`System`](crate::System) listener.
    AcceptedByServer,
    /// Handed to a system from outside via [`System::adopt`](crate::System::adopt).
    CreatedFromOutside,
}

/// Why a connection worker delivered `on_close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Peer closed its side.
    RemoteDisconnect,
    /// Peer reset the connection.
    ConnectionReset,
    /// A write hit a connection the peer had already torn down.
    BrokenPipe,
    /// The handler closed the socket itself.
    ClosedLocally,
    /// The supervisor cancelled the worker.
    ExternalShutdown,
    /// `poll` reported an error condition on the socket.
    TransportError,
    /// The worker's start hook panicked and the connection was dropped.
    Aborted,
}

impl From<Disconnect> for CloseReason {
    fn from(cause: Disconnect) -> Self {
        match cause {
            Disconnect::Remote => CloseReason::RemoteDisconnect,
            Disconnect::Reset => CloseReason::ConnectionReset,
            Disconnect::BrokenPipe => CloseReason::BrokenPipe,
            Disconnect::Error(_) => CloseReason::TransportError,
            Disconnect::Local => CloseReason::ClosedLocally,
        }
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CloseReason::RemoteDisconnect => "remote disconnect",
            CloseReason::ConnectionReset => "connection reset",
            CloseReason::BrokenPipe => "broken pipe",
            CloseReason::ClosedLocally => "closed locally",
            CloseReason::ExternalShutdown => "external shutdown",
            CloseReason::TransportError => "transport error",
            CloseReason::Aborted => "aborted",
        })
    }
}

/// Callbacks for every connection of a system, plus their shared context.
///
/// One handler is shared by all workers, so callbacks for different
/// connections run concurrently. For a single connection the order is
/// always `on_create`, any number of `on_data`, then `on_close`.
///
/// Callbacks must not block indefinitely: a worker stuck inside a callback
/// cannot be cancelled.
pub trait Handler<T: Transport>: Send + Sync + 'static {
    /// A worker entered its running state.
    fn on_create(&self, _reference: &str, _origin: Origin) {}

    /// Input is pending on `socket`.
    ///
    /// The socket may only be used for the duration of the call. Closing it
    /// ends the connection once the call returns.
    fn on_data(&self, socket: &mut Socket<T>);

    /// The worker is about to exit. Delivered exactly once per `on_create`.
    fn on_close(&self, _reference: &str, _reason: CloseReason) {}

    /// The listener failed in a way the system cannot recover from.
    ///
    /// The system stops accepting but keeps its live connections; the
    /// embedder decides whether to tear everything down.
    fn on_fatal(&self, _error: &Error) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_maps_to_reason() {
        assert_eq!(CloseReason::from(Disconnect::Remote), CloseReason::RemoteDisconnect);
        assert_eq!(CloseReason::from(Disconnect::Reset), CloseReason::ConnectionReset);
        assert_eq!(CloseReason::from(Disconnect::BrokenPipe), CloseReason::BrokenPipe);
        assert_eq!(CloseReason::from(Disconnect::Error(libc::ETIMEDOUT)), CloseReason::TransportError);
        assert_eq!(CloseReason::from(Disconnect::Local), CloseReason::ClosedLocally);
    }

    #[test]
    fn reason_display() {
        assert_eq!(CloseReason::ExternalShutdown.to_string(), "external shutdown");
    }
}
