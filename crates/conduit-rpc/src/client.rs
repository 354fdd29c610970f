//! Mailbox client: synchronous and asynchronous calls into one server.
//!
//! A [`Client`] belongs to one calling thread. Synchronous calls block that
//! thread until the result arrives. Asynchronous calls return at once; their
//! results land on the client's own result channel, and the owning thread
//! later pulls them off and passes them to [`Client::resolve`], which runs
//! the attached callback.
//!
//! The number of asynchronous calls submitted but not yet resolved is
//! capped. Past the cap a call is rejected with [`CallError::TooManyCalls`]
//! before it ever reaches the server.

use crate::error::CallError;
use crate::function::{Callback, FunctionId, Shape, Value};
use crate::record::{AsyncReply, CallRecord, Reply, ResultRecord};
use crate::server::ServerHandle;
use conduit_core::{catch, Logger};
use std::fmt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// A per-caller handle for calling functions owned by a server.
pub struct Client<K, A, R> {
    server: Option<ServerHandle<K, A, R>>,
    results_tx: mpsc::Sender<ResultRecord<R>>,
    results_rx: mpsc::Receiver<ResultRecord<R>>,
    capacity: usize,
    pending: usize,
    logger: Logger,
}

impl<K: FunctionId, A: Send + 'static, R: Send + 'static> Client<K, A, R> {
    /// Creates a client that is not attached to any server yet.
    ///
    /// `capacity` caps the asynchronous calls in flight. A capacity of zero
    /// rejects every asynchronous call.
    pub fn new(capacity: usize, logger: Logger) -> Self {
        let (results_tx, results_rx) = mpsc::channel(capacity.max(1));
        Self {
            server: None,
            results_tx,
            results_rx,
            capacity,
            pending: 0,
            logger,
        }
    }

    /// Attaches the client to a server, replacing any previous one.
    ///
    /// Calls already in flight still resolve through this client.
    pub fn attach(&mut self, server: &ServerHandle<K, A, R>) {
        self.server = Some(server.clone());
    }

    /// Returns the server this client is attached to.
    pub fn server(&self) -> Option<&ServerHandle<K, A, R>> {
        self.server.as_ref()
    }

    /// Returns the cap on asynchronous calls in flight.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of asynchronous calls not yet resolved.
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Returns `true` if no asynchronous call is waiting to be resolved.
    pub fn idle(&self) -> bool {
        self.pending == 0
    }

    // -------------------------------------------------------------------------
    // Synchronous calls
    // -------------------------------------------------------------------------

    /// Calls a function that returns nothing and waits for it to finish.
    pub fn call0(&mut self, id: K, args: A) -> Result<(), CallError> {
        self.call(id, args, Shape::NoResult).map(|_| ())
    }

    /// Calls a function that returns one value and waits for the value.
    pub fn call1(&mut self, id: K, args: A) -> Result<R, CallError> {
        self.call(id, args, Shape::Single)?.into_single()
    }

    /// Calls a function that returns a sequence and waits for it.
    pub fn call_n(&mut self, id: K, args: A) -> Result<Vec<R>, CallError> {
        self.call(id, args, Shape::Sequence)?.into_sequence()
    }

    /// Enqueues a call and blocks until its result arrives.
    ///
    /// Enqueueing itself blocks while the server's queue is full.
    fn call(&mut self, id: K, args: A, shape: Shape) -> Result<Value<R>, CallError> {
        let server = self.target(&id, shape)?;

        let (tx, rx) = oneshot::channel();
        server
            .sender
            .blocking_send(CallRecord::new(id, args, Reply::Sync(tx)))
            .map_err(|_| CallError::ServerClosed)?;

        // The record was dropped unanswered only if the server went away.
        rx.blocking_recv().unwrap_or(Err(CallError::ServerClosed))
    }

    // -------------------------------------------------------------------------
    // Asynchronous calls
    // -------------------------------------------------------------------------

    /// Calls a function asynchronously. The callback's shape selects which
    /// kind of function is expected.
    ///
    /// Never blocks. Over the in-flight cap the callback runs immediately
    /// with [`CallError::TooManyCalls`]. Any other failure (unknown id, shape
    /// mismatch, full or closed queue) is queued on the result channel and
    /// reaches the callback through [`Client::resolve`], like a result.
    pub fn async_call(&mut self, id: K, args: A, callback: Callback<R>) {
        if self.pending >= self.capacity {
            self.run_callback(ResultRecord::failure(CallError::TooManyCalls, callback));
            return;
        }

        let failure = match self.target(&id, callback.shape()) {
            Err(err) => Some(ResultRecord::failure(err, callback)),
            Ok(server) => {
                let reply = Reply::Async(AsyncReply::new(self.results_tx.clone(), callback));
                match server.sender.try_send(CallRecord::new(id, args, reply)) {
                    Ok(()) => None,
                    Err(TrySendError::Full(record)) => record.into_failure(CallError::ChannelFull),
                    Err(TrySendError::Closed(record)) => {
                        record.into_failure(CallError::ServerClosed)
                    }
                }
            }
        };

        if let Some(failure) = failure {
            // There is room: fewer than `capacity` results are outstanding.
            match self.results_tx.try_send(failure) {
                Ok(()) => {}
                Err(TrySendError::Full(failure)) | Err(TrySendError::Closed(failure)) => {
                    self.run_callback(failure);
                    return;
                }
            }
        }
        self.pending += 1;
    }

    /// Asynchronously calls a function that returns nothing.
    pub fn async_call0(
        &mut self,
        id: K,
        args: A,
        callback: impl FnOnce(Result<(), CallError>) + Send + 'static,
    ) {
        self.async_call(id, args, Callback::no_result(callback));
    }

    /// Asynchronously calls a function that returns one value.
    pub fn async_call1(
        &mut self,
        id: K,
        args: A,
        callback: impl FnOnce(Result<R, CallError>) + Send + 'static,
    ) {
        self.async_call(id, args, Callback::single(callback));
    }

    /// Asynchronously calls a function that returns a sequence.
    pub fn async_call_n(
        &mut self,
        id: K,
        args: A,
        callback: impl FnOnce(Result<Vec<R>, CallError>) + Send + 'static,
    ) {
        self.async_call(id, args, Callback::sequence(callback));
    }

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------

    /// Waits for the next asynchronous result.
    pub async fn recv(&mut self) -> Option<ResultRecord<R>> {
        self.results_rx.recv().await
    }

    /// Blocks the current thread until the next asynchronous result arrives.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<ResultRecord<R>> {
        self.results_rx.blocking_recv()
    }

    /// Takes the next asynchronous result if one is ready.
    pub fn try_recv(&mut self) -> Option<ResultRecord<R>> {
        self.results_rx.try_recv().ok()
    }

    /// Resolves one asynchronous result by running its callback.
    ///
    /// A panic inside the callback is caught and logged.
    pub fn resolve(&mut self, result: ResultRecord<R>) {
        self.pending = self.pending.saturating_sub(1);
        self.run_callback(result);
    }

    /// Resolves results until no asynchronous call is in flight.
    ///
    /// Blocks the current thread. The client stays usable afterwards.
    pub fn close(&mut self) {
        while self.pending > 0 {
            match self.results_rx.blocking_recv() {
                Some(result) => self.resolve(result),
                None => break,
            }
        }
    }

    fn run_callback(&self, result: ResultRecord<R>) {
        if let Err(fault) = catch(|| result.invoke()) {
            self.logger
                .error(format_args!("callback: {}", fault.report()));
        }
    }

    fn target(&self, id: &K, requested: Shape) -> Result<&ServerHandle<K, A, R>, CallError> {
        let server = self.server.as_ref().ok_or(CallError::NotAttached)?;
        match server.shapes.get(id) {
            None => Err(CallError::NotRegistered(format!("{:?}", id))),
            Some(&actual) if actual != requested => Err(CallError::ShapeMismatch {
                id: format!("{:?}", id),
                expected: requested,
                actual,
            }),
            Some(_) => Ok(server),
        }
    }
}

impl<K, A, R> fmt::Debug for Client<K, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("attached", &self.server.is_some())
            .field("capacity", &self.capacity)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
