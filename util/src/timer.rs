//! Cancellable one-shot timers

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A timer which runs a continuation once after a delay unless it is cancelled first.
///
/// Dropping the timer cancels it. The continuation runs on the timer's own thread, so it must
/// not assume it holds any lock held by the code which armed the timer.
pub struct OneShotTimer {
    cancel_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<bool>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl OneShotTimer {
    /// Arm a new timer which will call `f` after `delay`.
    pub fn start<F>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static
    {
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            match cancel_rx.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {
                    f();
                    true
                },
                // Cancelled explicitly or the timer was dropped
                Ok(()) | Err(RecvTimeoutError::Disconnected) => false
            }
        });

        Self {
            cancel_tx: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    /// Cancel the timer.
    ///
    /// If the continuation has already started it is not interrupted.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            tx.send(()).ok();
        }
    }

    /// True if the timer has either fired or been cancelled.
    pub fn is_finished(&self) -> bool {
        match self.handle {
            Some(ref h) => h.is_finished(),
            None => true
        }
    }

    /// Block until the timer thread exits, returning true if the continuation ran.
    pub fn join(mut self) -> bool {
        match self.handle.take() {
            Some(h) => h.join().unwrap_or(false),
            None => false
        }
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_timer_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();

        let timer = OneShotTimer::start(Duration::from_millis(10), move || {
            f.store(true, Ordering::SeqCst);
        });

        assert!(timer.join());
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancelled_timer_does_not_fire() {
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();

        let mut timer = OneShotTimer::start(Duration::from_millis(500), move || {
            f.store(true, Ordering::SeqCst);
        });
        timer.cancel();

        assert!(!timer.join());
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_dropped_timer_does_not_fire() {
        let fired = Arc::new(AtomicBool::new(false));
        let f = fired.clone();

        drop(OneShotTimer::start(Duration::from_millis(50), move || {
            f.store(true, Ordering::SeqCst);
        }));

        thread::sleep(Duration::from_millis(150));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
