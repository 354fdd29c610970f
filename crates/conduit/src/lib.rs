//! # Conduit
//!
//! Thread-confinement concurrency for in-process modules.
//!
//! Each module owns its state on one thread. Other threads reach it through
//! message passing only:
//!
//! - **Mailbox RPC** ([`Server`], [`Client`]): functions registered on a
//!   server run on the server's owner thread, one at a time. Clients call
//!   them synchronously (blocking for the result) or asynchronously (with a
//!   callback resolved on the client's owner thread).
//! - **Dispatcher** ([`Dispatcher`]): runs blocking work on its own thread
//!   and hands the completion callback back to the owner thread.
//! - **Linear context** ([`LinearContext`]): work submitted through one
//!   context runs strictly in submission order.
//! - **Skeleton** ([`Skeleton`]): the run loop that drains a module's server,
//!   client results and dispatcher completions until closed.
//! - **Modules** ([`Module`], [`Modules`]): start a set of modules on their
//!   own threads and stop them in reverse order.
//!
//! # Quick start
//!
//! ```
//! use conduit::prelude::*;
//! use std::thread;
//!
//! let mut skeleton = Skeleton::<&'static str, String, String>::new(
//!     &ModuleConfig::new(),
//!     Logger::default(),
//! );
//! skeleton
//!     .server_mut()
//!     .register_single("echo", |s: String| s)
//!     .unwrap();
//!
//! let mut client = skeleton.handle().open(8);
//! let (close, signal) = close_signal();
//! let module = thread::spawn(move || skeleton.run(signal));
//!
//! assert_eq!(client.call1("echo", "hi".to_string()), Ok("hi".to_string()));
//! assert_eq!(
//!     client.call1("missing", String::new()),
//!     Err(CallError::NotRegistered("\"missing\"".into()))
//! );
//!
//! close.close();
//! module.join().unwrap();
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod logging;
mod module;
mod signal;
mod skeleton;

pub use config::{Config, ConfigError, LogConfig, ModuleConfig};
pub use logging::init_tracing;
pub use module::{Module, Modules};
pub use signal::{close_signal, CloseHandle, CloseSignal};
pub use skeleton::Skeleton;

pub use conduit_core::{catch, Fault, Level, LogSink, Logger, MemorySink, TracingSink, WriterSink};
pub use conduit_dispatch::{Completion, Dispatcher, LinearContext};
pub use conduit_rpc::{
    CallError, CallRecord, Callback, Client, Function, FunctionId, RegisterError, ResultRecord,
    Server, ServerHandle, Shape, Value,
};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        close_signal, CallError, Callback, Client, CloseHandle, CloseSignal, Dispatcher, Function,
        LinearContext, Logger, Module, ModuleConfig, Modules, Server, ServerHandle, Skeleton,
    };
}
