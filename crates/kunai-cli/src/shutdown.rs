use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::info;

/// Stop flag for the poll loop with an interruptible sleep.
///
/// `wait` returns as soon as the signal is triggered, so Ctrl+C never has to
/// sit out a full poll interval.
pub struct ShutdownSignal {
    triggered: AtomicBool,
    condvar: Condvar,
    mutex: Mutex<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            triggered: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        }
    }

    /// Create a signal that Ctrl+C triggers
    pub fn install() -> anyhow::Result<Arc<Self>> {
        let signal = Arc::new(Self::new());
        let handler = Arc::clone(&signal);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal, stopping...");
            handler.trigger();
        })?;
        Ok(signal)
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        let _guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        self.condvar.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` or until triggered; `true` means triggered.
    pub fn wait(&self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }

        let guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        let (_guard, _timeout) = self
            .condvar
            .wait_timeout_while(guard, duration, |_| !self.is_shutdown())
            .unwrap_or_else(PoisonError::into_inner);
        self.is_shutdown()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
