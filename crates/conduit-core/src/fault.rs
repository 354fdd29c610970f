//! Fault capture at execution boundaries.
//!
//! Registered functions, work bodies and callbacks are owned code: a panic
//! raised inside one of them must never take down the thread that runs it.
//! [`catch`] is the boundary. It runs the closure and converts an unwinding
//! panic into a [`Fault`] carrying the panic message, the source location
//! of the panic and a backtrace taken where the panic was raised.
//!
//! The first call to [`catch`] installs a process-wide panic hook. Inside a
//! `catch` the hook records the panic site for the fault instead of printing
//! to stderr; the fault is reported through whatever logger the boundary
//! uses. Panics outside any `catch` go to the previously installed hook.

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;

/// Where a caught panic was raised.
struct PanicSite {
    location: Option<String>,
    backtrace: Backtrace,
}

thread_local! {
    static CATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_SITE: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static HOOK: OnceLock<()> = OnceLock::new();

fn install_hook() {
    HOOK.get_or_init(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let contained = CATCH_DEPTH.try_with(|depth| depth.get() > 0).unwrap_or(false);
            if !contained {
                previous(info);
                return;
            }
            let site = PanicSite {
                location: info
                    .location()
                    .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())),
                backtrace: Backtrace::capture(),
            };
            let _ = LAST_SITE.try_with(|slot| *slot.borrow_mut() = Some(site));
        }));
    });
}

/// A panic caught at an execution boundary.
#[derive(Debug)]
pub struct Fault {
    message: String,
    location: Option<String>,
    backtrace: Backtrace,
}

impl Fault {
    /// Creates a fault from a message, capturing the current backtrace.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Builds a fault from a panic payload, such as the one returned by
    /// [`JoinHandle::join`](std::thread::JoinHandle::join).
    ///
    /// The backtrace is taken here, not at the panic site.
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        Self::new(payload_message(payload.as_ref()))
    }

    /// Returns the panic message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `file:line:column` of the panic, when it was caught by
    /// [`catch`].
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Returns the backtrace of the panic.
    ///
    /// Empty unless backtraces are enabled through `RUST_BACKTRACE`.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Formats the message and location, followed by the backtrace when one
    /// was captured.
    pub fn report(&self) -> String {
        let mut report = self.message.clone();
        if let Some(location) = &self.location {
            report.push_str(" at ");
            report.push_str(location);
        }
        if self.backtrace.status() == BacktraceStatus::Captured {
            report.push('\n');
            report.push_str(&self.backtrace.to_string());
        }
        report
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for Fault {}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `f`, catching any panic it raises.
///
/// The closure is treated as unwind safe: the caller owns whatever state
/// it touches and decides whether that state is still usable afterwards.
pub fn catch<F, T>(f: F) -> Result<T, Fault>
where
    F: FnOnce() -> T,
{
    install_hook();

    LAST_SITE.with(|slot| *slot.borrow_mut() = None);
    CATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    CATCH_DEPTH.with(|depth| depth.set(depth.get() - 1));

    result.map_err(|payload| {
        let message = payload_message(payload.as_ref());
        match LAST_SITE.with(|slot| slot.borrow_mut().take()) {
            Some(site) => Fault {
                message,
                location: site.location,
                backtrace: site.backtrace,
            },
            None => Fault::new(message),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_passes_value_through() {
        assert_eq!(catch(|| 40 + 2).unwrap(), 42);
    }

    #[test]
    fn test_catch_static_str_panic() {
        let fault = catch(|| -> () { panic!("static message") }).unwrap_err();
        assert_eq!(fault.message(), "static message");
        assert_eq!(fault.to_string(), "static message");
    }

    #[test]
    fn test_catch_formatted_panic() {
        let id = 7;
        let fault = catch(|| -> () { panic!("bad id {}", id) }).unwrap_err();
        assert_eq!(fault.message(), "bad id 7");
    }

    #[test]
    fn test_catch_non_string_payload() {
        let fault = catch(|| std::panic::panic_any(17u32)).unwrap_err();
        assert_eq!(fault.message(), "unknown panic payload");
    }

    #[test]
    fn test_catch_allows_mutation_of_captured_state() {
        let mut hits = Vec::new();
        let _ = catch(|| {
            hits.push(1);
            panic!("after push");
        });
        assert_eq!(hits, vec![1]);
    }

    fn fail_deep_inside() {
        panic!("deep failure");
    }

    #[test]
    fn test_fault_points_at_panic_site() {
        let expected_line = line!() - 5;
        let fault = catch(fail_deep_inside).unwrap_err();

        let location = fault.location().unwrap();
        assert!(location.starts_with(&format!("{}:{}:", file!(), expected_line)));
        assert!(fault.report().starts_with("deep failure at "));

        if fault.backtrace().status() == BacktraceStatus::Captured {
            assert!(fault.backtrace().to_string().contains("fail_deep_inside"));
        }
    }

    #[test]
    fn test_nested_catch_keeps_each_site() {
        let outer = catch(|| {
            let inner = catch(|| -> () { panic!("inner") }).unwrap_err();
            assert_eq!(inner.message(), "inner");
            assert!(inner.location().is_some());
            panic!("outer");
        })
        .unwrap_err();

        assert_eq!(outer.message(), "outer");
        assert!(outer.location().is_some());
        assert_eq!(CATCH_DEPTH.with(|depth| depth.get()), 0);
    }

    #[test]
    fn test_joined_thread_payload_has_no_site() {
        let payload = std::thread::spawn(|| -> () { panic!("worker died") })
            .join()
            .unwrap_err();
        let fault = Fault::from_payload(payload);
        assert_eq!(fault.message(), "worker died");
        assert_eq!(fault.location(), None);
    }
}
