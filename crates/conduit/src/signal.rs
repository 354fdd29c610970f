//! One-shot close signal for run loops.

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

/// Creates a connected close handle and signal.
pub fn close_signal() -> (CloseHandle, CloseSignal) {
    let (tx, rx) = oneshot::channel();
    (CloseHandle { tx }, CloseSignal { rx })
}

/// Sends the close signal. Dropping the handle closes too.
#[derive(Debug)]
pub struct CloseHandle {
    tx: oneshot::Sender<()>,
}

impl CloseHandle {
    /// Asks the run loop holding the matching [`CloseSignal`] to stop.
    pub fn close(self) {
        let _ = self.tx.send(());
    }
}

/// Received by a run loop; fires once its [`CloseHandle`] closes or drops.
#[derive(Debug)]
pub struct CloseSignal {
    pub(crate) rx: oneshot::Receiver<()>,
}

impl CloseSignal {
    /// Returns `true` once close has been requested.
    pub fn is_closed(&mut self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Blocks the current thread until close is requested.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn wait(self) {
        let _ = self.rx.blocking_recv();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close() {
        let (handle, mut signal) = close_signal();
        assert!(!signal.is_closed());
        handle.close();
        assert!(signal.is_closed());
    }

    #[test]
    fn test_drop_closes() {
        let (handle, mut signal) = close_signal();
        drop(handle);
        assert!(signal.is_closed());
    }

    #[test]
    fn test_wait_returns_after_close() {
        let (handle, signal) = close_signal();
        let waiter = std::thread::spawn(move || signal.wait());
        handle.close();
        waiter.join().unwrap();
    }
}
