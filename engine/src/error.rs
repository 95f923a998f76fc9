//! RPC-layer error wrapping: every request into a `GameActor` or
//! `PlaySession` can fail either because the actor replied with a pure
//! [`ActionError`](protocol::ActionError), or because the RPC itself never
//! completed (mailbox closed, reply dropped, timeout elapsed).

use std::fmt;

use protocol::TransportError;

/// Wraps an action-level error `E` together with the transport failures
/// that can happen around it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError<E> {
    /// The actor processed the request and reported this outcome.
    Action(E),
    /// The request could not be completed at all.
    Transport(TransportError),
}

impl<E: fmt::Display> fmt::Display for RpcError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Action(err) => write!(f, "{err}"),
            RpcError::Transport(err) => write!(f, "{err}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RpcError<E> {}

impl<E> From<TransportError> for RpcError<E> {
    fn from(value: TransportError) -> Self {
        RpcError::Transport(value)
    }
}
