//! # conduit-core
//!
//! Pieces shared by every conduit crate:
//!
//! - **Logging**: the leveled [`Logger`] handle each component is constructed
//!   with, and the sinks it can write to ([`TracingSink`], [`WriterSink`],
//!   [`MemorySink`]).
//! - **Fault capture**: [`catch`] runs a unit of owned code and turns a panic
//!   into a [`Fault`] value instead of unwinding into the caller.
//!
//! # Example
//!
//! ```
//! use conduit_core::{catch, Level, Logger, MemorySink};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::new());
//! let logger = Logger::new(Level::Debug, sink.clone());
//!
//! let result = catch(|| -> u32 { panic!("boom") });
//! if let Err(fault) = result {
//!     logger.error(format_args!("{}", fault));
//! }
//!
//! assert_eq!(sink.entries().len(), 1);
//! ```

#![warn(missing_docs)]

mod fault;
mod log;

pub use fault::{catch, Fault};
pub use log::{Level, LogSink, Logger, MemorySink, ParseLevelError, TracingSink, WriterSink};
