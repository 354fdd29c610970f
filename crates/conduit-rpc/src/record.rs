//! Call and result records exchanged between clients and servers.

use crate::error::CallError;
use crate::function::{Callback, Value};
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Where the outcome of a call record goes.
pub(crate) enum Reply<R> {
    /// Fire-and-forget: nobody waits for the outcome.
    None,
    /// A synchronous caller blocked on its private result slot.
    Sync(oneshot::Sender<Result<Value<R>, CallError>>),
    /// An asynchronous caller's result channel plus the callback to run.
    Async(AsyncReply<R>),
}

impl<R> Reply<R> {
    /// Delivers `outcome`. Never blocks.
    ///
    /// The asynchronous channel always has a free slot here: a client never
    /// has more calls in flight than its channel holds. Returns `false` if
    /// the caller is gone.
    pub(crate) fn send(self, outcome: Result<Value<R>, CallError>) -> bool {
        match self {
            Reply::None => true,
            Reply::Sync(tx) => tx.send(outcome).is_ok(),
            Reply::Async(reply) => reply.send(outcome),
        }
    }
}

/// Route back to an asynchronous caller.
///
/// Dropped without a result (the server went away before draining the
/// record), it resolves the caller with [`CallError::ServerClosed`] so the
/// client's in-flight count still comes back down.
pub(crate) struct AsyncReply<R> {
    results: mpsc::Sender<ResultRecord<R>>,
    callback: Option<Callback<R>>,
}

impl<R> AsyncReply<R> {
    pub(crate) fn new(results: mpsc::Sender<ResultRecord<R>>, callback: Callback<R>) -> Self {
        Self {
            results,
            callback: Some(callback),
        }
    }

    fn send(mut self, outcome: Result<Value<R>, CallError>) -> bool {
        match self.callback.take() {
            Some(callback) => self
                .results
                .try_send(ResultRecord { outcome, callback })
                .is_ok(),
            None => false,
        }
    }

    fn into_callback(mut self) -> Option<Callback<R>> {
        self.callback.take()
    }
}

impl<R> Drop for AsyncReply<R> {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            let _ = self
                .results
                .try_send(ResultRecord::failure(CallError::ServerClosed, callback));
        }
    }
}

/// One invocation in flight.
///
/// Built by a client (or by `post`), consumed by the server's draining
/// thread. Every record that expects a reply resolves exactly once: with
/// the function's value, with the fault it raised, or with
/// [`CallError::ServerClosed`] when the server closes or is dropped first.
pub struct CallRecord<K, A, R> {
    pub(crate) id: K,
    pub(crate) args: A,
    pub(crate) reply: Reply<R>,
}

impl<K, A, R> CallRecord<K, A, R> {
    pub(crate) fn new(id: K, args: A, reply: Reply<R>) -> Self {
        Self { id, args, reply }
    }

    /// Returns the id of the function being called.
    pub fn id(&self) -> &K {
        &self.id
    }

    /// Returns `true` if a caller is waiting for the outcome.
    pub fn expects_reply(&self) -> bool {
        !matches!(self.reply, Reply::None)
    }

    /// Turns a record that never reached the server back into a failed
    /// result for its asynchronous caller.
    pub(crate) fn into_failure(self, err: CallError) -> Option<ResultRecord<R>> {
        match self.reply {
            Reply::Async(reply) => reply
                .into_callback()
                .map(|callback| ResultRecord::failure(err, callback)),
            _ => None,
        }
    }
}

impl<K: fmt::Debug, A, R> fmt::Debug for CallRecord<K, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reply = match &self.reply {
            Reply::None => "none",
            Reply::Sync(_) => "sync",
            Reply::Async(..) => "async",
        };
        f.debug_struct("CallRecord")
            .field("id", &self.id)
            .field("reply", &reply)
            .finish_non_exhaustive()
    }
}

/// The outcome of an asynchronous call, waiting on the client's result
/// channel to be resolved.
pub struct ResultRecord<R> {
    pub(crate) outcome: Result<Value<R>, CallError>,
    pub(crate) callback: Callback<R>,
}

impl<R> ResultRecord<R> {
    pub(crate) fn failure(err: CallError, callback: Callback<R>) -> Self {
        Self {
            outcome: Err(err),
            callback,
        }
    }

    /// Returns the value or failure.
    pub fn outcome(&self) -> &Result<Value<R>, CallError> {
        &self.outcome
    }

    /// Returns the failure, if the call failed.
    pub fn error(&self) -> Option<&CallError> {
        self.outcome.as_ref().err()
    }

    /// Runs the callback with the outcome.
    pub(crate) fn invoke(self) {
        self.callback.invoke(self.outcome)
    }
}

impl<R: fmt::Debug> fmt::Debug for ResultRecord<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultRecord")
            .field("outcome", &self.outcome)
            .field("callback", &self.callback)
            .finish()
    }
}
