//! Error types for registration and calls.

use crate::function::Shape;
use thiserror::Error;

/// Error returned when registering a function fails.
///
/// Registration happens once during setup, so either variant is a
/// configuration bug the caller should treat as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    /// A function is already registered under this id.
    #[error("function id {0}: already registered")]
    AlreadyRegistered(String),

    /// A handle or client already exists, so the registry is read-only.
    #[error("function id {0}: registry is frozen once the server is shared")]
    RegistryFrozen(String),
}

/// Error delivered to the caller of a synchronous or asynchronous call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The client has not been attached to a server.
    #[error("server not attached")]
    NotAttached,

    /// No function is registered under the id.
    #[error("function id {0}: function not registered")]
    NotRegistered(String),

    /// The registered function has a different return shape than requested.
    #[error("function id {id}: return type mismatch (registered {actual}, requested {expected})")]
    ShapeMismatch {
        /// The function id.
        id: String,
        /// The shape the caller asked for.
        expected: Shape,
        /// The shape of the registered function.
        actual: Shape,
    },

    /// The server's inbound queue is full.
    #[error("channel full")]
    ChannelFull,

    /// The client's asynchronous in-flight cap has been reached.
    #[error("too many calls")]
    TooManyCalls,

    /// The server closed before the call was executed.
    #[error("server closed")]
    ServerClosed,

    /// The function panicked while executing.
    #[error("{0}")]
    Fault(String),
}
