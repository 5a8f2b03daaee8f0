//! Monotonic stop signal shared between the connection manager and the
//! publication loop.
//!
//! The flag starts lowered and can only ever be raised. Reads are a single
//! atomic load, so the publication loop can poll it from any task while the
//! reconnect task raises it from another.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    notify: Notify,
}

/// Cloneable handle to a process-wide exit flag
#[derive(Debug, Clone, Default)]
pub struct ExitFlag {
    inner: Arc<Inner>,
}

impl ExitFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag. Returns `true` only for the call that performed the
    /// false -> true transition.
    pub fn raise(&self) -> bool {
        let transitioned = self
            .inner
            .raised
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if transitioned {
            self.inner.notify.notify_waiters();
        }
        transitioned
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::Acquire)
    }

    /// Wait until the flag is raised
    pub async fn raised(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration` unless the flag is raised first.
    /// Returns true if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.raised() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
