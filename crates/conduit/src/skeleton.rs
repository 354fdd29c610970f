//! Module run loop.
//!
//! A [`Skeleton`] is what one module's thread runs. It owns a [`Server`]
//! for the calls other modules make into it, a [`Client`] for the
//! asynchronous calls it makes into other modules, and a [`Dispatcher`] for
//! background work. [`Skeleton::run`] drains all three until the close
//! signal fires.
//!
//! Waiting happens on a current-thread tokio runtime, but every call
//! record, result and completion is handled after `block_on` returns, off
//! the runtime. Registered functions and callbacks are therefore free to
//! make blocking synchronous calls into other modules.

use crate::config::ModuleConfig;
use crate::signal::CloseSignal;
use conduit_core::Logger;
use conduit_dispatch::{Completion, Dispatcher, LinearContext};
use conduit_rpc::{
    CallRecord, Callback, Client, Function, FunctionId, RegisterError, ResultRecord, Server,
    ServerHandle,
};
use std::fmt;

enum Event<K, A, R> {
    Call(CallRecord<K, A, R>),
    Result(ResultRecord<R>),
    Completion(Completion),
    Close,
}

/// One module's server, client and dispatcher, driven by a single thread.
///
/// # Example
///
/// ```
/// use conduit::{close_signal, Logger, ModuleConfig, Skeleton};
/// use std::thread;
///
/// let mut skeleton = Skeleton::<&'static str, u32, u32>::new(&ModuleConfig::new(), Logger::default());
/// skeleton.server_mut().register_single("double", |n| n * 2).unwrap();
///
/// let mut client = skeleton.handle().open(4);
/// let (close, signal) = close_signal();
/// let module = thread::spawn(move || skeleton.run(signal));
///
/// assert_eq!(client.call1("double", 21), Ok(42));
///
/// close.close();
/// module.join().unwrap();
/// ```
pub struct Skeleton<K, A, R> {
    server: Server<K, A, R>,
    client: Client<K, A, R>,
    dispatcher: Dispatcher,
    logger: Logger,
}

impl<K: FunctionId, A: Send + 'static, R: Send + 'static> Skeleton<K, A, R> {
    /// Creates a skeleton sized by `config`, logging to `logger`.
    pub fn new(config: &ModuleConfig, logger: Logger) -> Self {
        Self {
            server: Server::with_logger(config.server_capacity, logger.clone()),
            client: Client::new(config.async_call_capacity, logger.clone()),
            dispatcher: Dispatcher::with_logger(config.dispatcher_capacity, logger.clone()),
            logger,
        }
    }

    /// Registers a function on the module's server.
    pub fn register(&mut self, id: K, function: Function<A, R>) -> Result<(), RegisterError> {
        self.server.register(id, function)
    }

    /// Returns the module's server, for registration.
    pub fn server_mut(&mut self) -> &mut Server<K, A, R> {
        &mut self.server
    }

    /// Returns a handle other modules use to call this one.
    ///
    /// Freezes the server's registry.
    pub fn handle(&mut self) -> ServerHandle<K, A, R> {
        self.server.handle()
    }

    /// Returns the client used for outgoing asynchronous calls.
    pub fn client_mut(&mut self) -> &mut Client<K, A, R> {
        &mut self.client
    }

    /// Returns the module's dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns a linear context on the module's dispatcher.
    pub fn linear_context(&self) -> LinearContext {
        self.dispatcher.linear_context()
    }

    /// Returns the module's logger.
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Calls a function on another module asynchronously.
    ///
    /// The callback runs on this module's thread once [`Skeleton::run`]
    /// picks up the result.
    pub fn async_call(&mut self, target: &ServerHandle<K, A, R>, id: K, args: A, callback: Callback<R>) {
        self.client.attach(target);
        self.client.async_call(id, args, callback);
    }

    /// Drains the server, the client's results and the dispatcher's
    /// completions until `close` fires, then shuts down.
    ///
    /// Shutdown closes the server, resolving every queued call with
    /// [`CallError::ServerClosed`](conduit_rpc::CallError::ServerClosed),
    /// then waits for all outstanding work and asynchronous calls.
    pub fn run(&mut self, mut close: CloseSignal) {
        let runtime = match tokio::runtime::Builder::new_current_thread().build() {
            Ok(runtime) => runtime,
            Err(e) => self
                .logger
                .fatal(format_args!("skeleton: failed to build event loop: {}", e)),
        };

        loop {
            let event = {
                let Skeleton {
                    server,
                    client,
                    dispatcher,
                    ..
                } = self;
                runtime.block_on(async {
                    tokio::select! {
                        _ = &mut close.rx => Event::Close,
                        Some(record) = server.recv() => Event::Call(record),
                        Some(result) = client.recv() => Event::Result(result),
                        Some(completion) = dispatcher.recv() => Event::Completion(completion),
                        else => Event::Close,
                    }
                })
            };

            match event {
                Event::Call(record) => self.server.execute(record),
                Event::Result(result) => self.client.resolve(result),
                Event::Completion(completion) => self.dispatcher.resolve_one(completion),
                Event::Close => break,
            }
        }

        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.server.close();
        while !self.dispatcher.idle() || !self.client.idle() {
            self.dispatcher.close();
            self.client.close();
        }
    }
}

impl<K: fmt::Debug, A, R> fmt::Debug for Skeleton<K, A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Skeleton")
            .field("server", &self.server)
            .field("client", &self.client)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::close_signal;
    use conduit_rpc::CallError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn skeleton() -> Skeleton<&'static str, u32, u32> {
        Skeleton::new(&ModuleConfig::new().server_capacity(16), Logger::default())
    }

    #[test]
    fn test_serves_sync_calls() {
        let mut skeleton = skeleton();
        skeleton.server_mut().register_single("double", |n| n * 2).unwrap();
        skeleton
            .server_mut()
            .register_sequence("upto", |n| (0..n).collect())
            .unwrap();

        let mut client = skeleton.handle().open(4);
        let (close, signal) = close_signal();
        let module = thread::spawn(move || skeleton.run(signal));

        assert_eq!(client.call1("double", 4), Ok(8));
        assert_eq!(client.call_n("upto", 3), Ok(vec![0, 1, 2]));

        close.close();
        module.join().unwrap();
    }

    #[test]
    fn test_resolves_dispatched_work_on_module_thread() {
        let mut skeleton = skeleton();
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let done = Arc::clone(&done);
            skeleton.dispatcher().dispatch(
                || thread::sleep(Duration::from_millis(10)),
                move || {
                    done.fetch_add(1, Ordering::SeqCst);
                },
            );
        }

        let (close, signal) = close_signal();
        let module = thread::spawn(move || skeleton.run(signal));
        close.close();
        module.join().unwrap();

        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_async_call_between_modules() {
        let mut callee = skeleton();
        callee.server_mut().register_single("inc", |n| n + 1).unwrap();
        let callee_handle = callee.handle();

        let mut caller = skeleton();
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        caller.async_call(
            &callee_handle,
            "inc",
            1,
            Callback::single(move |r| sink.lock().push(r)),
        );

        let (close_callee, callee_signal) = close_signal();
        let callee_thread = thread::spawn(move || callee.run(callee_signal));
        let (close_caller, caller_signal) = close_signal();
        let caller_thread = thread::spawn(move || caller.run(caller_signal));

        // Shutting the caller down waits for its in-flight call.
        close_caller.close();
        caller_thread.join().unwrap();
        close_callee.close();
        callee_thread.join().unwrap();

        assert_eq!(*results.lock(), vec![Ok(2)]);
    }

    #[test]
    fn test_function_may_call_another_module_synchronously() {
        let mut inner = skeleton();
        inner.server_mut().register_single("square", |n| n * n).unwrap();
        let inner_handle = inner.handle();

        let mut outer = skeleton();
        let mut nested = inner_handle.open(1);
        outer
            .server_mut()
            .register_single("square_plus_one", move |n| {
                nested.call1("square", n).unwrap_or(0) + 1
            })
            .unwrap();
        let mut client = outer.handle().open(1);

        let (close_inner, inner_signal) = close_signal();
        let inner_thread = thread::spawn(move || inner.run(inner_signal));
        let (close_outer, outer_signal) = close_signal();
        let outer_thread = thread::spawn(move || outer.run(outer_signal));

        assert_eq!(client.call1("square_plus_one", 3), Ok(10));

        close_outer.close();
        outer_thread.join().unwrap();
        close_inner.close();
        inner_thread.join().unwrap();
    }

    #[test]
    fn test_close_fails_calls_after_shutdown() {
        let mut skeleton = skeleton();
        skeleton.server_mut().register_single("double", |n| n * 2).unwrap();
        let mut client = skeleton.handle().open(1);

        let (close, signal) = close_signal();
        let module = thread::spawn(move || skeleton.run(signal));
        close.close();
        module.join().unwrap();

        assert_eq!(client.call1("double", 1), Err(CallError::ServerClosed));
    }
}
