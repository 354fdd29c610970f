//! Module lifecycle.
//!
//! A [`Module`] is a unit of the application with its own thread. The
//! [`Modules`] runner initializes every module in order, runs each on a
//! dedicated thread, and on stop tears them down in reverse order.

use crate::signal::{close_signal, CloseHandle, CloseSignal};
use conduit_core::{catch, Fault, Logger};
use std::thread::{self, JoinHandle};

/// A long-running part of the application.
///
/// `on_init` and `on_destroy` run on the thread that starts and stops the
/// [`Modules`]; `run` runs on the module's own thread.
pub trait Module: Send {
    /// Name used for the module's thread and in logs.
    fn name(&self) -> &str;

    /// Called before any module starts running.
    fn on_init(&mut self) {}

    /// Runs the module until `close` fires.
    ///
    /// Modules built on a [`Skeleton`](crate::Skeleton) usually just hand
    /// the signal to [`Skeleton::run`](crate::Skeleton::run).
    fn run(&mut self, close: CloseSignal);

    /// Called after the module's thread has finished.
    fn on_destroy(&mut self) {}
}

struct Running {
    name: String,
    close: CloseHandle,
    thread: JoinHandle<Box<dyn Module>>,
}

/// A set of running modules.
pub struct Modules {
    running: Vec<Running>,
    logger: Logger,
}

impl Modules {
    /// Initializes and starts `modules`.
    ///
    /// Every module's `on_init` runs, in order, before any module's thread
    /// is spawned.
    pub fn start(mut modules: Vec<Box<dyn Module>>, logger: Logger) -> Self {
        for module in modules.iter_mut() {
            logger.debug(format_args!("module {}: init", module.name()));
            module.on_init();
        }

        let mut running = Vec::with_capacity(modules.len());
        for mut module in modules {
            let name = module.name().to_string();
            let (close, signal) = close_signal();
            let spawned = thread::Builder::new()
                .name(format!("module-{}", name))
                .spawn(move || {
                    module.run(signal);
                    module
                });

            match spawned {
                Ok(thread) => running.push(Running {
                    name,
                    close,
                    thread,
                }),
                Err(e) => logger.fatal(format_args!("module {}: failed to spawn thread: {}", name, e)),
            }
        }

        Self { running, logger }
    }

    /// Number of running modules.
    pub fn len(&self) -> usize {
        self.running.len()
    }

    /// Returns `true` if no modules are running.
    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Names of the running modules, in start order.
    pub fn names(&self) -> Vec<&str> {
        self.running.iter().map(|r| r.name.as_str()).collect()
    }

    /// Stops every module, last started first.
    ///
    /// Each module is signalled, joined, then destroyed before the next one
    /// is signalled. A module whose thread panicked is logged and skipped.
    pub fn stop(mut self) {
        while let Some(Running {
            name,
            close,
            thread,
        }) = self.running.pop()
        {
            close.close();
            match thread.join() {
                Ok(mut module) => {
                    if let Err(fault) = catch(|| module.on_destroy()) {
                        self.logger
                            .error(format_args!("module {}: destroy: {}", name, fault.report()));
                    }
                    self.logger.debug(format_args!("module {}: stopped", name));
                }
                Err(payload) => {
                    let fault = Fault::from_payload(payload);
                    self.logger
                        .error(format_args!("module {}: run: {}", name, fault.message()));
                }
            }
        }
    }
}

impl std::fmt::Debug for Modules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modules")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{Level, MemorySink};
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        events: Arc<Mutex<Vec<String>>>,
        panic_in_run: bool,
    }

    impl Recorder {
        fn boxed(name: &'static str, events: &Arc<Mutex<Vec<String>>>) -> Box<dyn Module> {
            Box::new(Self {
                name,
                events: Arc::clone(events),
                panic_in_run: false,
            })
        }
    }

    impl Module for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn on_init(&mut self) {
            self.events.lock().push(format!("init {}", self.name));
        }

        fn run(&mut self, close: CloseSignal) {
            if self.panic_in_run {
                panic!("{} broke", self.name);
            }
            assert_eq!(
                thread::current().name(),
                Some(format!("module-{}", self.name).as_str())
            );
            close.wait();
        }

        fn on_destroy(&mut self) {
            self.events.lock().push(format!("destroy {}", self.name));
        }
    }

    #[test]
    fn test_init_in_order_destroy_in_reverse() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let modules = Modules::start(
            vec![
                Recorder::boxed("a", &events),
                Recorder::boxed("b", &events),
                Recorder::boxed("c", &events),
            ],
            Logger::default(),
        );

        assert_eq!(modules.len(), 3);
        assert_eq!(modules.names(), vec!["a", "b", "c"]);

        modules.stop();

        assert_eq!(
            *events.lock(),
            vec!["init a", "init b", "init c", "destroy c", "destroy b", "destroy a"]
        );
    }

    #[test]
    fn test_panicking_module_is_logged() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(MemorySink::new());
        let logger = Logger::new(Level::Debug, sink.clone());

        let broken: Box<dyn Module> = Box::new(Recorder {
            name: "broken",
            events: Arc::clone(&events),
            panic_in_run: true,
        });
        let modules = Modules::start(vec![Recorder::boxed("ok", &events), broken], logger);
        modules.stop();

        assert_eq!(*events.lock(), vec!["init ok", "init broken", "destroy ok"]);
        let errors = sink.messages_at(Level::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("module broken: run: broken broke"));
    }

    #[test]
    fn test_empty() {
        let modules = Modules::start(Vec::new(), Logger::default());
        assert!(modules.is_empty());
        modules.stop();
    }
}
