//! Leveled logging collaborator.
//!
//! Components never log through a global. Each one is constructed with a
//! [`Logger`], a cloneable handle over a minimum [`Level`] and a [`LogSink`].
//! The default logger writes everything at debug level and above to
//! [`TracingSink`], which forwards to the `tracing` macros.
//!
//! Levels are ordered `Debug < Release < Error < Fatal`. Logging at
//! [`Level::Fatal`] flushes the sink and terminates the process.

use chrono::Local;
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Level
// =============================================================================

/// Severity of a log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Level {
    /// Diagnostics useful while developing.
    #[default]
    Debug,
    /// Normal operational messages.
    Release,
    /// Recovered faults and failed operations.
    Error,
    /// Unrecoverable conditions. The process exits after the message.
    Fatal,
}

impl Level {
    /// Returns the fixed-width tag written in front of each line.
    pub fn tag(&self) -> &'static str {
        match self {
            Level::Debug => "[debug  ]",
            Level::Release => "[release]",
            Level::Error => "[error  ]",
            Level::Fatal => "[fatal  ]",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "debug",
            Level::Release => "release",
            Level::Error => "error",
            Level::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Error returned when a string does not name a [`Level`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "release" => Ok(Level::Release),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, ParseLevelError> {
        value.parse()
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Destination for log messages.
///
/// Sinks are shared between threads, so implementations synchronize
/// internally.
pub trait LogSink: Send + Sync {
    /// Writes one message.
    fn write(&self, level: Level, message: &str);

    /// Flushes buffered output. Called before a fatal exit.
    fn flush(&self) {}
}

/// Forwards messages to the `tracing` macros.
///
/// `Release` maps to `info`, `Error` and `Fatal` both map to `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write(&self, level: Level, message: &str) {
        match level {
            Level::Debug => tracing::debug!("{}", message),
            Level::Release => tracing::info!("{}", message),
            Level::Error => tracing::error!("{}", message),
            Level::Fatal => tracing::error!(fatal = true, "{}", message),
        }
    }
}

/// Writes timestamped, tagged lines to any [`Write`] implementation.
///
/// Each line looks like `2024/01/31 12:00:00 [error  ] message`.
pub struct WriterSink {
    writer: Mutex<Box<dyn Write + Send>>,
    path: Option<PathBuf>,
}

impl WriterSink {
    /// Wraps an arbitrary writer.
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            path: None,
        }
    }

    /// Writes to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Creates a new log file inside `dir`, named after the current local
    /// time as `YYYYMMDD_HH_MM_SS.log`.
    pub fn create_in(dir: impl AsRef<Path>) -> io::Result<Self> {
        let name = format!("{}.log", Local::now().format("%Y%m%d_%H_%M_%S"));
        let path = dir.as_ref().join(name);
        let file = File::create(&path)?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
            path: Some(path),
        })
    }

    /// Returns the file path when this sink writes to a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Debug for WriterSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSink")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl LogSink for WriterSink {
    fn write(&self, level: Level, message: &str) {
        let timestamp = Local::now().format("%Y/%m/%d %H:%M:%S");
        let mut writer = self.writer.lock();
        // Nowhere to report a failing log writer.
        let _ = writeln!(writer, "{} {} {}", timestamp, level.tag(), message);
    }

    fn flush(&self) {
        let _ = self.writer.lock().flush();
    }
}

/// Keeps every message in memory.
///
/// Useful in tests that assert a fault was reported.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every message written so far.
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.lock().clone()
    }

    /// Returns the messages written at exactly `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Discards every captured message.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn write(&self, level: Level, message: &str) {
        self.entries.lock().push((level, message.to_string()));
    }
}

// =============================================================================
// Logger
// =============================================================================

/// A cloneable handle to a leveled log sink.
///
/// Messages below the logger's minimum level are discarded before they
/// reach the sink.
#[derive(Clone)]
pub struct Logger {
    level: Level,
    sink: Arc<dyn LogSink>,
}

impl Logger {
    /// Creates a logger over `sink` that keeps messages at `level` and above.
    pub fn new(level: Level, sink: Arc<dyn LogSink>) -> Self {
        Self { level, sink }
    }

    /// Creates a logger over [`TracingSink`].
    pub fn tracing(level: Level) -> Self {
        Self::new(level, Arc::new(TracingSink))
    }

    /// Returns the minimum level.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Returns `true` if a message at `level` would be written.
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    /// Writes a message at `level`.
    ///
    /// A fatal message is always written, whatever the minimum level, and
    /// ends the process.
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if level == Level::Fatal {
            self.fatal(args);
        }
        if self.enabled(level) {
            self.sink.write(level, &args.to_string());
        }
    }

    /// Writes a debug message.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    /// Writes a release message.
    pub fn release(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Release, args);
    }

    /// Writes an error message.
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    /// Writes a fatal message, flushes the sink and exits with status 1.
    pub fn fatal(&self, args: fmt::Arguments<'_>) -> ! {
        self.sink.write(Level::Fatal, &args.to_string());
        self.sink.flush();
        std::process::exit(1)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::tracing(Level::Debug)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}
