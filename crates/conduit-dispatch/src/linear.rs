//! Linear context: FIFO-ordered work bodies on top of a dispatcher.
//!
//! Every submitted unit still gets its own thread, so spawning is never
//! serialized. Only the work bodies are: each spawned thread first takes
//! the context's execution slot, then pops the front of the queue and runs
//! that unit while holding the slot. Since units are popped in the order
//! they were pushed and only the slot holder pops, bodies run one at a time
//! in submission order, whichever thread happens to win the slot.
//!
//! Completions go to the parent dispatcher's channel like any other work,
//! and are not ordered.

use crate::dispatcher::{Callback, Completion};
use conduit_core::{catch, Logger};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;

struct LinearUnit {
    work: Box<dyn FnOnce() + Send>,
    callback: Option<Callback>,
}

#[derive(Default)]
struct LinearQueue {
    units: VecDeque<LinearUnit>,
    next_ticket: u64,
}

/// Orders work bodies submitted through it.
///
/// Created by [`Dispatcher::linear_context`](crate::Dispatcher::linear_context).
/// Cheap to clone; clones share the same queue and execution slot, so
/// submissions from several threads are ordered together.
///
/// # Example
///
/// ```
/// use conduit_dispatch::Dispatcher;
/// use parking_lot::Mutex;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let mut dispatcher = Dispatcher::new(16);
/// let linear = dispatcher.linear_context();
/// let out = Arc::new(Mutex::new(Vec::new()));
///
/// let first = Arc::clone(&out);
/// linear.submit_work(move || {
///     std::thread::sleep(Duration::from_millis(50));
///     first.lock().push(1);
/// });
/// let second = Arc::clone(&out);
/// linear.submit_work(move || second.lock().push(2));
///
/// dispatcher.close();
/// assert_eq!(*out.lock(), vec![1, 2]);
/// ```
#[derive(Clone)]
pub struct LinearContext {
    sender: mpsc::Sender<Completion>,
    pending: Arc<Mutex<usize>>,
    queue: Arc<Mutex<LinearQueue>>,
    execution: Arc<Mutex<()>>,
    logger: Logger,
}

impl LinearContext {
    pub(crate) fn new(
        sender: mpsc::Sender<Completion>,
        pending: Arc<Mutex<usize>>,
        logger: Logger,
    ) -> Self {
        Self {
            sender,
            pending,
            queue: Arc::new(Mutex::new(LinearQueue::default())),
            execution: Arc::new(Mutex::new(())),
            logger,
        }
    }

    /// Submits a unit of work with a completion callback.
    ///
    /// Returns the unit's ticket: its position in submission order,
    /// starting from zero. Bodies run in ticket order.
    pub fn submit<W, C>(&self, work: W, callback: C) -> u64
    where
        W: FnOnce() + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        self.submit_unit(LinearUnit {
            work: Box::new(work),
            callback: Some(Box::new(callback)),
        })
    }

    /// Submits a unit of work with no completion callback.
    pub fn submit_work<W>(&self, work: W) -> u64
    where
        W: FnOnce() + Send + 'static,
    {
        self.submit_unit(LinearUnit {
            work: Box::new(work),
            callback: None,
        })
    }

    /// Returns the number of units queued and not yet started.
    pub fn queued(&self) -> usize {
        self.queue.lock().units.len()
    }

    fn submit_unit(&self, unit: LinearUnit) -> u64 {
        *self.pending.lock() += 1;

        let ticket = {
            let mut queue = self.queue.lock();
            let ticket = queue.next_ticket;
            queue.next_ticket += 1;
            queue.units.push_back(unit);
            ticket
        };

        let context = self.clone();
        let spawned = thread::Builder::new()
            .name("conduit-linear".to_string())
            .spawn(move || context.run_front());

        if let Err(e) = spawned {
            self.logger
                .fatal(format_args!("linear context: failed to spawn worker thread: {}", e));
        }
        ticket
    }

    /// Body of each spawned thread.
    fn run_front(&self) {
        let callback = {
            let _slot = self.execution.lock();

            let Some(unit) = self.queue.lock().units.pop_front() else {
                self.logger
                    .error(format_args!("linear context: queue empty while holding the slot"));
                return;
            };

            if let Err(fault) = catch(unit.work) {
                self.logger.error(format_args!("work: {}", fault.report()));
            }
            unit.callback
        };

        if self.sender.blocking_send(Completion::new(callback)).is_err() {
            self.logger
                .error(format_args!("work: dispatcher dropped before completion"));
        }
    }
}

impl fmt::Debug for LinearContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearContext")
            .field("queued", &self.queued())
            .finish_non_exhaustive()
    }
}
