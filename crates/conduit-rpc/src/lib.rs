//! # conduit-rpc
//!
//! Mailbox-based call/return between threads.
//!
//! A [`Server`] owns a set of functions and is drained by exactly one
//! thread. Any number of [`Client`]s, each owned by its own thread, call
//! those functions through the server's bounded inbound queue:
//!
//! - Synchronous calls ([`Client::call0`], [`Client::call1`],
//!   [`Client::call_n`]) block until the result comes back.
//! - Asynchronous calls ([`Client::async_call`] and friends) return at once;
//!   the owning thread later resolves the result, running the callback.
//! - Fire-and-forget posts ([`ServerHandle::post`]) are dropped when they
//!   cannot be queued.
//!
//! Functions come in three shapes (no result, single value, sequence of
//! values) fixed at registration; see [`Function`] and [`Callback`].
//!
//! # Example
//!
//! ```
//! use conduit_rpc::{CallError, Server};
//! use std::thread;
//!
//! let mut server = Server::<&'static str, i64, i64>::new(64);
//! server.register_single("add_one", |n| n + 1).unwrap();
//!
//! let mut client = server.open(8);
//! client.async_call1("add_one", 41, |result: Result<i64, CallError>| {
//!     assert_eq!(result, Ok(42));
//! });
//!
//! let worker = thread::spawn(move || {
//!     let record = server.blocking_recv().unwrap();
//!     server.execute(record);
//!     server.close();
//! });
//!
//! // Run the callback on this thread.
//! client.close();
//! worker.join().unwrap();
//! ```

#![warn(missing_docs)]

mod client;
mod error;
mod function;
mod record;
mod server;

pub use client::Client;
pub use error::{CallError, RegisterError};
pub use function::{Callback, Function, FunctionId, Shape, Value};
pub use record::{CallRecord, ResultRecord};
pub use server::{Server, ServerHandle};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        CallError, Callback, Client, Function, FunctionId, RegisterError, Server, ServerHandle,
        Shape, Value,
    };
}
