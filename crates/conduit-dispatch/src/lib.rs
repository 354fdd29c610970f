//! # conduit-dispatch
//!
//! Fire-and-work concurrency with completions funnelled back to one thread.
//!
//! - [`Dispatcher`] runs each unit of work on its own thread and queues the
//!   unit's callback for the owner thread, which resolves it.
//! - [`LinearContext`] layers strict ordering on a dispatcher: work bodies
//!   submitted through one context run one at a time, in submission order.
//!
//! Panics in work bodies and callbacks are caught where they happen and
//! logged; they never reach the owner thread.

#![warn(missing_docs)]

mod dispatcher;
mod linear;

pub use dispatcher::{Completion, Dispatcher};
pub use linear::LinearContext;
