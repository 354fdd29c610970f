//! Mailbox server: a function registry drained by one thread.
//!
//! A [`Server`] owns the registered functions and the receiving end of a
//! bounded inbound queue of [`CallRecord`]s. Exactly one thread drains it,
//! which `&mut self` on [`Server::execute`] enforces: the server can be moved
//! to its draining thread but never shared.
//!
//! Other threads reach the server through a [`ServerHandle`], which carries
//! the sending end of the queue and a read-only copy of the function shapes.
//! Creating the first handle freezes the registry.

use crate::client::Client;
use crate::error::{CallError, RegisterError};
use crate::function::{Function, FunctionId, Shape};
use crate::record::{CallRecord, Reply};
use conduit_core::{catch, Logger};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A mailbox server.
///
/// # Example
///
/// ```
/// use conduit_rpc::Server;
/// use std::thread;
///
/// let mut server = Server::<&'static str, String, String>::new(16);
/// server.register_single("echo", |arg| arg).unwrap();
///
/// let mut client = server.open(4);
/// let worker = thread::spawn(move || {
///     let record = server.blocking_recv().unwrap();
///     server.execute(record);
///     server.close();
/// });
///
/// assert_eq!(client.call1("echo", "hi".to_string()).unwrap(), "hi");
/// worker.join().unwrap();
/// ```
pub struct Server<K, A, R> {
    functions: HashMap<K, Function<A, R>>,
    shapes: Arc<HashMap<K, Shape>>,
    frozen: bool,
    inbox: mpsc::Receiver<CallRecord<K, A, R>>,
    sender: mpsc::Sender<CallRecord<K, A, R>>,
    logger: Logger,
}

impl<K: FunctionId, A: Send + 'static, R: Send + 'static> Server<K, A, R> {
    /// Creates a server whose inbound queue holds `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self::with_logger(capacity, Logger::default())
    }

    /// Creates a server that reports faults to `logger`.
    pub fn with_logger(capacity: usize, logger: Logger) -> Self {
        let (sender, inbox) = mpsc::channel(capacity.max(1));
        Self {
            functions: HashMap::new(),
            shapes: Arc::new(HashMap::new()),
            frozen: false,
            inbox,
            sender,
            logger,
        }
    }

    /// Registers a function under `id`.
    ///
    /// Must happen before the server is shared: once [`Server::handle`] or
    /// [`Server::open`] has been called, registration fails with
    /// [`RegisterError::RegistryFrozen`].
    pub fn register(&mut self, id: K, function: Function<A, R>) -> Result<(), RegisterError> {
        if self.frozen {
            return Err(RegisterError::RegistryFrozen(format!("{:?}", id)));
        }
        if self.functions.contains_key(&id) {
            return Err(RegisterError::AlreadyRegistered(format!("{:?}", id)));
        }

        Arc::make_mut(&mut self.shapes).insert(id.clone(), function.shape());
        self.functions.insert(id, function);
        Ok(())
    }

    /// Registers a function that returns nothing.
    pub fn register_no_result(
        &mut self,
        id: K,
        f: impl FnMut(A) + Send + 'static,
    ) -> Result<(), RegisterError> {
        self.register(id, Function::no_result(f))
    }

    /// Registers a function that returns one value.
    pub fn register_single(
        &mut self,
        id: K,
        f: impl FnMut(A) -> R + Send + 'static,
    ) -> Result<(), RegisterError> {
        self.register(id, Function::single(f))
    }

    /// Registers a function that returns a sequence of values.
    pub fn register_sequence(
        &mut self,
        id: K,
        f: impl FnMut(A) -> Vec<R> + Send + 'static,
    ) -> Result<(), RegisterError> {
        self.register(id, Function::sequence(f))
    }

    /// Returns `true` if a function is registered under `id`.
    pub fn is_registered(&self, id: &K) -> bool {
        self.shapes.contains_key(id)
    }

    /// Returns the shape of the function registered under `id`.
    pub fn shape(&self, id: &K) -> Option<Shape> {
        self.shapes.get(id).copied()
    }

    /// Returns a handle for other threads and freezes the registry.
    pub fn handle(&mut self) -> ServerHandle<K, A, R> {
        self.frozen = true;
        ServerHandle {
            shapes: Arc::clone(&self.shapes),
            sender: self.sender.clone(),
            logger: self.logger.clone(),
        }
    }

    /// Opens a new client attached to this server.
    ///
    /// `capacity` caps the client's asynchronous calls in flight.
    pub fn open(&mut self, capacity: usize) -> Client<K, A, R> {
        self.handle().open(capacity)
    }

    /// Enqueues a fire-and-forget call.
    ///
    /// See [`ServerHandle::post`].
    pub fn post(&self, id: K, args: A) {
        post(&self.shapes, &self.sender, &self.logger, id, args);
    }

    /// Waits for the next call record.
    ///
    /// Returns `None` once the server has been closed and drained.
    pub async fn recv(&mut self) -> Option<CallRecord<K, A, R>> {
        self.inbox.recv().await
    }

    /// Blocks the current thread until the next call record arrives.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<CallRecord<K, A, R>> {
        self.inbox.blocking_recv()
    }

    /// Takes the next call record if one is queued.
    pub fn try_recv(&mut self) -> Option<CallRecord<K, A, R>> {
        self.inbox.try_recv().ok()
    }

    /// Returns the number of queued call records.
    pub fn len(&self) -> usize {
        self.inbox.len()
    }

    /// Returns `true` if no call records are queued.
    pub fn is_empty(&self) -> bool {
        self.inbox.is_empty()
    }

    /// Executes one call record on the draining thread.
    ///
    /// A panic inside the function is caught, logged, and returned to the
    /// caller as [`CallError::Fault`]. The draining thread keeps going.
    pub fn execute(&mut self, record: CallRecord<K, A, R>) {
        let CallRecord { id, args, reply } = record;

        let outcome = match self.functions.get_mut(&id) {
            Some(function) => match catch(|| function.call(args)) {
                Ok(value) => Ok(value),
                Err(fault) => {
                    self.logger
                        .error(format_args!("function id {:?}: {}", id, fault.report()));
                    Err(CallError::Fault(fault.to_string()))
                }
            },
            None => Err(CallError::NotRegistered(format!("{:?}", id))),
        };

        if !reply.send(outcome) {
            self.logger.debug(format_args!(
                "function id {:?}: caller went away before the result",
                id
            ));
        }
    }

    /// Closes the inbound queue and resolves every record still in it with
    /// [`CallError::ServerClosed`].
    ///
    /// Producers blocked on a full queue are released with the same error.
    /// Call once, from the draining thread, after the last call has been
    /// executed.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn close(&mut self) {
        self.inbox.close();

        while let Some(record) = self.inbox.blocking_recv() {
            let CallRecord { id, reply, .. } = record;
            self.logger
                .debug(format_args!("function id {:?}: server closed", id));
            let _ = reply.send(Err(CallError::ServerClosed));
        }
    }
}

impl<K: fmt::Debug, A, R> fmt::Debug for Server<K, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("functions", &self.shapes)
            .field("frozen", &self.frozen)
            .field("queued", &self.inbox.len())
            .finish_non_exhaustive()
    }
}

/// A cloneable, thread-safe handle to a [`Server`].
pub struct ServerHandle<K, A, R> {
    pub(crate) shapes: Arc<HashMap<K, Shape>>,
    pub(crate) sender: mpsc::Sender<CallRecord<K, A, R>>,
    pub(crate) logger: Logger,
}

impl<K: FunctionId, A: Send + 'static, R: Send + 'static> ServerHandle<K, A, R> {
    /// Opens a new client attached to the server.
    ///
    /// `capacity` caps the client's asynchronous calls in flight.
    pub fn open(&self, capacity: usize) -> Client<K, A, R> {
        let mut client = Client::new(capacity, self.logger.clone());
        client.attach(self);
        client
    }

    /// Enqueues a fire-and-forget call.
    ///
    /// Best effort and never blocks: the call is dropped if `id` is not
    /// registered (with a debug log line), if the queue is full, or if the
    /// server has closed. The function's return value is discarded.
    pub fn post(&self, id: K, args: A) {
        post(&self.shapes, &self.sender, &self.logger, id, args);
    }

    /// Returns the shape of the function registered under `id`.
    pub fn shape(&self, id: &K) -> Option<Shape> {
        self.shapes.get(id).copied()
    }

    /// Returns `true` if the server has been closed.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<K, A, R> Clone for ServerHandle<K, A, R> {
    fn clone(&self) -> Self {
        Self {
            shapes: Arc::clone(&self.shapes),
            sender: self.sender.clone(),
            logger: self.logger.clone(),
        }
    }
}

impl<K: fmt::Debug, A, R> fmt::Debug for ServerHandle<K, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("functions", &self.shapes)
            .field("closed", &self.sender.is_closed())
            .finish_non_exhaustive()
    }
}

fn post<K: FunctionId, A, R>(
    shapes: &HashMap<K, Shape>,
    sender: &mpsc::Sender<CallRecord<K, A, R>>,
    logger: &Logger,
    id: K,
    args: A,
) {
    if !shapes.contains_key(&id) {
        logger.debug(format_args!(
            "function id {:?}: post dropped, function not registered",
            id
        ));
        return;
    }
    let _ = sender.try_send(CallRecord::new(id, args, Reply::None));
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{Level, MemorySink};
    use std::sync::mpsc as std_mpsc;
    use std::thread;

    fn server() -> Server<&'static str, i32, i32> {
        Server::new(8)
    }

    #[test]
    fn test_register_duplicate_id() {
        let mut server = server();
        server.register_single("double", |n| n * 2).unwrap();

        let err = server.register_no_result("double", |_| {}).unwrap_err();
        assert_eq!(err, RegisterError::AlreadyRegistered("\"double\"".to_string()));
        assert_eq!(server.shape(&"double"), Some(Shape::Single));
    }

    #[test]
    fn test_register_after_handle_is_frozen() {
        let mut server = server();
        server.register_single("double", |n| n * 2).unwrap();
        let _handle = server.handle();

        let err = server.register_single("triple", |n| n * 3).unwrap_err();
        assert!(matches!(err, RegisterError::RegistryFrozen(_)));
        assert!(!server.is_registered(&"triple"));
    }

    #[test]
    fn test_handle_sees_registered_shapes() {
        let mut server = server();
        server.register_no_result("log", |_| {}).unwrap();
        server.register_sequence("range", |n| (0..n).collect()).unwrap();

        let handle = server.handle();
        assert_eq!(handle.shape(&"log"), Some(Shape::NoResult));
        assert_eq!(handle.shape(&"range"), Some(Shape::Sequence));
        assert_eq!(handle.shape(&"missing"), None);
    }

    #[test]
    fn test_post_executes_and_discards_result() {
        let (tx, rx) = std_mpsc::channel();
        let mut server = server();
        server
            .register_single("square", move |n| {
                tx.send(n * n).unwrap();
                n * n
            })
            .unwrap();

        server.post("square", 4);
        let record = server.try_recv().unwrap();
        assert!(!record.expects_reply());
        server.execute(record);

        assert_eq!(rx.try_recv().unwrap(), 16);
    }

    #[test]
    fn test_post_unknown_id_is_dropped() {
        let sink = Arc::new(MemorySink::new());
        let mut server: Server<&str, i32, i32> =
            Server::with_logger(8, Logger::new(Level::Debug, sink.clone()));

        server.post("missing", 1);

        assert!(server.try_recv().is_none());
        assert_eq!(sink.messages_at(Level::Debug).len(), 1);
    }

    #[test]
    fn test_post_full_queue_is_dropped() {
        let mut server: Server<&str, i32, i32> = Server::new(2);
        server.register_no_result("noop", |_| {}).unwrap();

        for n in 0..5 {
            server.post("noop", n);
        }

        assert_eq!(server.len(), 2);
    }

    #[test]
    fn test_execute_contains_fault_and_keeps_draining() {
        let sink = Arc::new(MemorySink::new());
        let mut server: Server<&str, i32, i32> =
            Server::with_logger(8, Logger::new(Level::Debug, sink.clone()));
        server
            .register_single("checked", |n| {
                if n < 0 {
                    panic!("negative input");
                }
                n
            })
            .unwrap();

        let mut client = server.open(4);
        let worker = thread::spawn(move || {
            for _ in 0..2 {
                let record = server.blocking_recv().unwrap();
                server.execute(record);
            }
            server
        });

        assert_eq!(
            client.call1("checked", -1),
            Err(CallError::Fault("negative input".to_string()))
        );
        assert_eq!(client.call1("checked", 5), Ok(5));

        let mut server = worker.join().unwrap();
        server.close();

        let errors = sink.messages_at(Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("negative input"));
    }

    #[test]
    fn test_functions_run_one_at_a_time() {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let mut server: Server<&str, u64, u64> = Server::new(64);
        {
            let busy = Arc::clone(&busy);
            let overlaps = Arc::clone(&overlaps);
            server
                .register_single("work", move |n| {
                    if busy.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::sleep(std::time::Duration::from_millis(1));
                    busy.store(false, Ordering::SeqCst);
                    n
                })
                .unwrap();
        }

        let handle = server.handle();
        let callers: Vec<_> = (0..4u64)
            .map(|t| {
                let mut client = handle.open(1);
                thread::spawn(move || {
                    for n in 0..5u64 {
                        assert_eq!(client.call1("work", t * 10 + n), Ok(t * 10 + n));
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            let record = server.blocking_recv().unwrap();
            server.execute(record);
        }
        for caller in callers {
            caller.join().unwrap();
        }
        server.close();

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_resolves_queued_records() {
        let mut server = server();
        server.register_single("double", |n| n * 2).unwrap();
        let handle = server.handle();

        let callers: Vec<_> = (0..3)
            .map(|n| {
                let mut client = handle.open(1);
                thread::spawn(move || client.call1("double", n))
            })
            .collect();

        while server.len() < 3 {
            thread::yield_now();
        }
        server.close();

        for caller in callers {
            assert_eq!(caller.join().unwrap(), Err(CallError::ServerClosed));
        }
        assert!(handle.is_closed());
    }

    #[test]
    fn test_close_releases_blocked_sender() {
        let mut server: Server<&str, i32, i32> = Server::new(1);
        server.register_single("double", |n| n * 2).unwrap();
        server.post("double", 1);
        assert_eq!(server.len(), 1);

        let mut client = server.open(1);
        let caller = thread::spawn(move || client.call1("double", 2));

        // Give the caller time to block on the full queue.
        thread::sleep(std::time::Duration::from_millis(50));
        server.close();

        assert_eq!(caller.join().unwrap(), Err(CallError::ServerClosed));
    }
}
