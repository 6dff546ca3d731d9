//! One-shot completion gate for a single device sub-operation

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Completion signal for one sub-operation (a home cycle or one axis seek).
///
/// A gate is issued when its directive is about to go out and fires at most
/// once. Waiting observes the fired state, so a wait started after the signal
/// or repeated after a timeout resolves only if the gate has really fired.
#[derive(Debug)]
pub struct Gate {
    fired: watch::Sender<bool>,
    issued: AtomicBool,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Create an armed gate
    pub fn new() -> Self {
        let (fired, _) = watch::channel(false);
        Self {
            fired,
            issued: AtomicBool::new(false),
        }
    }

    /// Mark the gate's directive as sent to the device
    pub fn issue(&self) {
        self.issued.store(true, Ordering::SeqCst);
    }

    /// Whether the directive for this gate has gone out
    pub fn is_issued(&self) -> bool {
        self.issued.load(Ordering::SeqCst)
    }

    /// Fire the gate. Returns `false` if it had already fired.
    pub fn signal(&self) -> bool {
        self.fired.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    /// Whether the gate has fired
    pub fn is_signaled(&self) -> bool {
        *self.fired.borrow()
    }

    /// Suspend until the gate fires
    pub(crate) async fn wait(&self) {
        let mut rx = self.fired.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = rx.wait_for(|fired| *fired).await;
    }
}
