//! One-way shutdown flag shared by the driver, the coordinator and run
//! handles.

use core::time::Duration;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Why a run stopped issuing work.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopReason {
    /// Every evaluation allowed by the budget was issued.
    BudgetExhausted,
    /// The run was cancelled through a [`RunHandle`](crate::RunHandle) or
    /// an operator interrupt.
    Cancelled,
    /// The decision model kept proposing already-issued points and no
    /// evaluation was left in flight.
    Stalled,
    /// A fatal internal failure (thread spawn or coordinator panic).
    Aborted,
}

struct Inner {
    reason: Mutex<Option<StopReason>>,
    raised: Condvar,
}

/// Single-assignment stop condition.
///
/// Once raised it never resets; only the first reason is kept.
#[derive(Clone)]
pub(crate) struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                reason: Mutex::new(None),
                raised: Condvar::new(),
            }),
        }
    }

    /// Raise the signal, running `before` while holding the signal's lock
    /// so it completes before any observer can see the flag set.
    ///
    /// Returns `false` (without calling `before`) if it was already raised.
    pub(crate) fn raise_with(&self, reason: StopReason, before: impl FnOnce()) -> bool {
        let mut slot = self.inner.reason.lock();
        if slot.is_some() {
            return false;
        }
        before();
        *slot = Some(reason);
        drop(slot);
        self.inner.raised.notify_all();
        true
    }

    pub(crate) fn reason(&self) -> Option<StopReason> {
        *self.inner.reason.lock()
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait up to `timeout` for the signal. Returns the reason if raised.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<StopReason> {
        let mut slot = self.inner.reason.lock();
        if slot.is_none() {
            let _ = self.inner.raised.wait_for(&mut slot, timeout);
        }
        *slot
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn first_reason_wins() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_raised());
        assert!(signal.raise_with(StopReason::BudgetExhausted, || {}));
        assert!(!signal.raise_with(StopReason::Cancelled, || panic!("must not run")));
        assert_eq!(signal.reason(), Some(StopReason::BudgetExhausted));
    }

    #[test]
    fn wait_wakes_on_raise() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        signal.raise_with(StopReason::Cancelled, || {});
        assert_eq!(waiter.join().unwrap(), Some(StopReason::Cancelled));
    }

    #[test]
    fn wait_times_out() {
        let signal = ShutdownSignal::new();
        assert_eq!(signal.wait_timeout(Duration::from_millis(10)), None);
    }
}
