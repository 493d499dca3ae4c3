//! Liveness monitor
//!
//! A countdown is armed at startup. Its expiry is the *early warning*: if the
//! program has checkpointed since the last expiry, the countdown is restarted
//! and execution continues; otherwise the program is declared hung.
//!
//! The feed request is a plain flag so `mark` stays cheap. The countdown
//! hardware is only touched from the expiry interrupt.

use core::sync::atomic::{AtomicBool, Ordering};

use platform::{CountdownTimer, WatchdogTimeout};

/// Outcome of an early-warning expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EarlyWarning {
    /// A checkpoint arrived in time; the countdown was restarted.
    Fed,
    /// No checkpoint since the last expiry; raise `Hung`.
    Hung,
    /// The monitor is not armed (spurious or late interrupt).
    Ignored,
}

/// Feed/arm flags shared between program flow and the expiry interrupt.
pub struct LivenessMonitor {
    feed_pending: AtomicBool,
    armed: AtomicBool,
}

impl LivenessMonitor {
    /// Disarmed monitor, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            feed_pending: AtomicBool::new(false),
            armed: AtomicBool::new(false),
        }
    }

    /// Start the countdown. Any stale feed request is discarded.
    pub fn arm<T: CountdownTimer>(&self, timer: &mut T, timeout: WatchdogTimeout) {
        self.feed_pending.store(false, Ordering::Release);
        timer.start(timeout.early_warning_ms());
        self.armed.store(true, Ordering::Release);
        #[cfg(feature = "defmt")]
        defmt::info!("liveness: armed, period {} ms", timeout.period_ms());
    }

    /// Stop the countdown.
    pub fn disarm<T: CountdownTimer>(&self, timer: &mut T) {
        self.armed.store(false, Ordering::Release);
        timer.stop();
    }

    /// Whether the countdown is running.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Note that the program is alive. Called by every checkpoint.
    pub fn request_feed(&self) {
        self.feed_pending.store(true, Ordering::Release);
    }

    /// Whether a feed is waiting for the next expiry.
    pub fn feed_pending(&self) -> bool {
        self.feed_pending.load(Ordering::Acquire)
    }

    /// Decide feed-or-fault at an early-warning expiry.
    pub fn on_early_warning<T: CountdownTimer>(&self, timer: &mut T) -> EarlyWarning {
        if !self.is_armed() {
            return EarlyWarning::Ignored;
        }
        if self.feed_pending.swap(false, Ordering::AcqRel) {
            timer.restart();
            EarlyWarning::Fed
        } else {
            #[cfg(feature = "defmt")]
            defmt::warn!("liveness: no checkpoint before early warning");
            EarlyWarning::Hung
        }
    }
}

impl Default for LivenessMonitor {
    fn default() -> Self {
        Self::new()
    }
}
