//! Dispatcher: concurrent work, completions on the owner thread.

use crate::linear::LinearContext;
use conduit_core::{catch, Logger};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

/// A completion callback, run on the owner thread.
pub(crate) type Callback = Box<dyn FnOnce() + Send>;

/// A finished unit of work waiting to be resolved on the owner thread.
///
/// Pulled off the completion channel with [`Dispatcher::recv`],
/// [`Dispatcher::blocking_recv`] or [`Dispatcher::try_recv`] and handed to
/// [`Dispatcher::resolve_one`].
pub struct Completion {
    callback: Option<Callback>,
}

impl Completion {
    pub(crate) fn new(callback: Option<Callback>) -> Self {
        Self { callback }
    }

    /// Returns `true` if a callback is attached.
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

/// Runs work on fresh threads and funnels completions back to one thread.
///
/// The thread that owns the dispatcher drains the completion channel and
/// resolves each [`Completion`]; callbacks therefore always run on the
/// owner thread, never on a worker.
///
/// # Example
///
/// ```
/// use conduit_dispatch::Dispatcher;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// let mut dispatcher = Dispatcher::new(16);
/// let answer = Arc::new(AtomicU32::new(0));
///
/// let slot = Arc::clone(&answer);
/// dispatcher.dispatch(
///     move || slot.store(1 + 1, Ordering::SeqCst),
///     || println!("done on the owner thread"),
/// );
///
/// dispatcher.close();
/// assert_eq!(answer.load(Ordering::SeqCst), 2);
/// assert!(dispatcher.idle());
/// ```
pub struct Dispatcher {
    sender: mpsc::Sender<Completion>,
    completions: mpsc::Receiver<Completion>,
    pending: Arc<Mutex<usize>>,
    logger: Logger,
}

impl Dispatcher {
    /// Creates a dispatcher whose completion channel holds `capacity`
    /// entries. Workers that finish while it is full wait for room.
    pub fn new(capacity: usize) -> Self {
        Self::with_logger(capacity, Logger::default())
    }

    /// Creates a dispatcher that reports faults to `logger`.
    pub fn with_logger(capacity: usize, logger: Logger) -> Self {
        let (sender, completions) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            completions,
            pending: Arc::new(Mutex::new(0)),
            logger,
        }
    }

    /// Runs `work` on a new thread, then queues `callback` for the owner.
    ///
    /// The callback is queued whether `work` returns or panics. A panic is
    /// caught and logged.
    pub fn dispatch<W, C>(&self, work: W, callback: C)
    where
        W: FnOnce() + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.spawn_unit(Box::new(work), Some(Box::new(callback)));
    }

    /// Runs `work` on a new thread with no completion callback.
    ///
    /// The completion is still queued and counted until resolved.
    pub fn spawn<W>(&self, work: W)
    where
        W: FnOnce() + Send + 'static,
    {
        self.spawn_unit(Box::new(work), None);
    }

    fn spawn_unit(&self, work: Box<dyn FnOnce() + Send>, callback: Option<Callback>) {
        *self.pending.lock() += 1;

        let sender = self.sender.clone();
        let logger = self.logger.clone();
        let spawned = thread::Builder::new()
            .name("conduit-dispatch".to_string())
            .spawn(move || {
                if let Err(fault) = catch(work) {
                    logger.error(format_args!("work: {}", fault.report()));
                }
                if sender.blocking_send(Completion::new(callback)).is_err() {
                    logger.error(format_args!("work: dispatcher dropped before completion"));
                }
            });

        if let Err(e) = spawned {
            self.logger
                .fatal(format_args!("dispatcher: failed to spawn worker thread: {}", e));
        }
    }

    /// Returns a context whose work bodies run one at a time, in
    /// submission order, on top of this dispatcher.
    pub fn linear_context(&self) -> LinearContext {
        LinearContext::new(
            self.sender.clone(),
            Arc::clone(&self.pending),
            self.logger.clone(),
        )
    }

    /// Waits for the next completion.
    pub async fn recv(&mut self) -> Option<Completion> {
        self.completions.recv().await
    }

    /// Blocks the current thread until the next completion arrives.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<Completion> {
        self.completions.blocking_recv()
    }

    /// Takes the next completion if one is ready.
    pub fn try_recv(&mut self) -> Option<Completion> {
        self.completions.try_recv().ok()
    }

    /// Resolves one completion on the owner thread.
    ///
    /// Decrements the pending count, then runs the callback if there is
    /// one. A panic inside the callback is caught and logged.
    pub fn resolve_one(&self, completion: Completion) {
        {
            let mut pending = self.pending.lock();
            *pending = pending.saturating_sub(1);
        }

        if let Some(callback) = completion.callback {
            if let Err(fault) = catch(callback) {
                self.logger
                    .error(format_args!("callback: {}", fault.report()));
            }
        }
    }

    /// Resolves completions until no work is outstanding.
    ///
    /// Blocks the owner thread.
    pub fn close(&mut self) {
        while !self.idle() {
            match self.completions.blocking_recv() {
                Some(completion) => self.resolve_one(completion),
                None => break,
            }
        }
    }

    /// Returns `true` if no work is outstanding.
    pub fn idle(&self) -> bool {
        *self.pending.lock() == 0
    }

    /// Returns the number of units dispatched but not yet resolved.
    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
