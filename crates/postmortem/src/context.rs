//! The process-wide fault context.
//!
//! One [`FaultContext`] lives in a `static` for the whole program. It owns the
//! state shared between normal program flow and the fault path.
//!
//! | State          | Written by                                   | Read by                 |
//! |----------------|----------------------------------------------|-------------------------|
//! | checkpoint     | [`FaultContext::mark`] (program flow)        | fault capture           |
//! | feed request   | [`FaultContext::mark`]                       | early-warning interrupt |
//! | callback       | [`FaultContext::set_fault_callback`]         | fault capture           |
//! | capture guard  | fault capture (first entry only)             | fault capture           |

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use platform::{CountdownTimer, MemoryProbe, WatchdogTimeout};

use crate::checkpoint::{Checkpoint, CheckpointLedger};
use crate::config::EngineConfig;
use crate::liveness::LivenessMonitor;

/// Free memory at a checkpoint fell to or below the low-water mark.
///
/// The caller must raise an `OutOfMemory` fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MemoryExhausted {
    /// Measured free bytes (negative when heap and stack already overlap).
    pub free_bytes: i32,
}

impl core::fmt::Display for MemoryExhausted {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "free memory exhausted ({} bytes left)", self.free_bytes)
    }
}

/// Shared state of the fault engine.
pub struct FaultContext {
    config: EngineConfig,
    ledger: CheckpointLedger,
    liveness: LivenessMonitor,
    callback: Mutex<Cell<Option<fn()>>>,
    capturing: AtomicBool,
}

impl FaultContext {
    /// Fresh context, usable in a `static`.
    pub const fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ledger: CheckpointLedger::new(),
            liveness: LivenessMonitor::new(),
            callback: Mutex::new(Cell::new(None)),
            capturing: AtomicBool::new(false),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Checkpoint ledger.
    pub fn ledger(&self) -> &CheckpointLedger {
        &self.ledger
    }

    /// Liveness monitor flags.
    pub fn liveness(&self) -> &LivenessMonitor {
        &self.liveness
    }

    /// Record a checkpoint and check free memory.
    ///
    /// Prefer the [`mark!`](crate::mark) macro, which fills in the line and
    /// file automatically.
    ///
    /// # Errors
    ///
    /// [`MemoryExhausted`] when `probe` reports a negative value or no more
    /// than [`EngineConfig::low_water_bytes`]. The checkpoint is still
    /// recorded, so the resulting fault points at this call site.
    pub fn mark<P: MemoryProbe + ?Sized>(
        &self,
        line: u32,
        location: &'static str,
        probe: &P,
    ) -> Result<(), MemoryExhausted> {
        self.liveness.request_feed();
        self.ledger.record(line, location);
        let free_bytes = probe.free_memory();
        match u32::try_from(free_bytes) {
            Ok(free) if free > self.config.low_water_bytes => Ok(()),
            _ => Err(MemoryExhausted { free_bytes }),
        }
    }

    /// Current checkpoint as seen by fault capture.
    pub fn checkpoint(&self) -> Checkpoint {
        self.ledger.snapshot()
    }

    /// Arm the liveness countdown.
    pub fn start_liveness_monitor<T: CountdownTimer>(&self, timer: &mut T, timeout: WatchdogTimeout) {
        self.liveness.arm(timer, timeout);
    }

    /// Stop the liveness countdown.
    pub fn stop_liveness_monitor<T: CountdownTimer>(&self, timer: &mut T) {
        self.liveness.disarm(timer);
    }

    /// Install the function run after the record is persisted and before reset.
    ///
    /// It runs with interrupts masked and the liveness monitor stopped; it
    /// must not fault or block.
    pub fn set_fault_callback(&self, callback: fn()) {
        critical_section::with(|cs| self.callback.borrow(cs).set(Some(callback)));
    }

    /// Remove the fault callback.
    pub fn clear_fault_callback(&self) {
        critical_section::with(|cs| self.callback.borrow(cs).set(None));
    }

    /// The installed fault callback, if any.
    pub fn fault_callback(&self) -> Option<fn()> {
        critical_section::with(|cs| self.callback.borrow(cs).get())
    }

    /// Claim the capture path. Returns `false` if a capture already started.
    pub fn begin_capture(&self) -> bool {
        !self.capturing.swap(true, Ordering::AcqRel)
    }

    /// Whether a capture has started.
    pub fn capture_in_progress(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }
}

/// Record a checkpoint at the call site.
///
/// `mark!(ctx, probe)` uses the current file name as the location;
/// `mark!(ctx, probe, "label")` uses an explicit label. Evaluates to
/// `Result<(), MemoryExhausted>`.
#[macro_export]
macro_rules! mark {
    ($ctx:expr, $probe:expr) => {
        $ctx.mark(
            ::core::line!(),
            $crate::checkpoint::short_file_name(::core::file!()),
            $probe,
        )
    };
    ($ctx:expr, $probe:expr, $location:expr) => {
        $ctx.mark(::core::line!(), $location, $probe)
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;
    use platform::mocks::{CountdownEvent, MockCountdown, MockMemory};

    fn ctx() -> FaultContext {
        FaultContext::new(EngineConfig::DEFAULT.with_low_water(1024))
    }

    #[test]
    fn mark_records_and_requests_feed() {
        let ctx = ctx();
        let mem = MockMemory::new(8 * 1024);
        ctx.mark(12, "loop.rs", &mem).unwrap();
        assert_eq!(ctx.checkpoint().line, 12);
        assert_eq!(ctx.checkpoint().location, "loop.rs");
        assert!(ctx.liveness().feed_pending());
    }

    #[test]
    fn mark_at_low_water_is_exhausted() {
        let ctx = ctx();
        let mem = MockMemory::new(1024);
        assert_eq!(
            ctx.mark(5, "alloc.rs", &mem),
            Err(MemoryExhausted { free_bytes: 1024 })
        );
        // The checkpoint still points at the offending call.
        assert_eq!(ctx.checkpoint().location, "alloc.rs");
    }

    #[test]
    fn negative_free_memory_is_exhausted() {
        let ctx = ctx();
        let mem = MockMemory::new(-16);
        assert!(ctx.mark(5, "alloc.rs", &mem).is_err());
    }

    #[test]
    fn mark_macro_uses_call_site() {
        let ctx = ctx();
        let mem = MockMemory::default();
        let line = line!() + 1;
        mark!(ctx, &mem).unwrap();
        assert_eq!(ctx.checkpoint().line, line);
        assert_eq!(ctx.checkpoint().location, "context.rs");
        mark!(ctx, &mem, "main").unwrap();
        assert_eq!(ctx.checkpoint().location, "main");
    }

    #[test]
    fn liveness_start_stop_drive_timer() {
        let ctx = ctx();
        let mut timer = MockCountdown::new();
        ctx.start_liveness_monitor(&mut timer, WatchdogTimeout::S4);
        ctx.stop_liveness_monitor(&mut timer);
        assert_eq!(
            timer.events(),
            &[CountdownEvent::Start(2_000), CountdownEvent::Stop]
        );
    }

    #[test]
    fn callback_can_be_set_and_cleared() {
        fn noop() {}
        let ctx = ctx();
        assert!(ctx.fault_callback().is_none());
        ctx.set_fault_callback(noop);
        assert!(ctx.fault_callback().is_some());
        ctx.clear_fault_callback();
        assert!(ctx.fault_callback().is_none());
    }

    #[test]
    fn capture_guard_admits_only_first_entry() {
        let ctx = ctx();
        assert!(ctx.begin_capture());
        assert!(!ctx.begin_capture());
        assert!(ctx.capture_in_progress());
    }
}
