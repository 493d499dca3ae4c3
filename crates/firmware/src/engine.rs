//! Process-wide fault engine state and the board fault paths.
//!
//! [`FAULTS`] is usable from the first instruction of `main`. The
//! [`FaultHandler`](postmortem::FaultHandler) needs the flash and SysTick
//! peripherals, so it is installed once after `embassy_stm32::init`; faults
//! before that reset without a record.

use postmortem::FaultContext;

use crate::boot::ENGINE_CONFIG;

/// Fault context shared by program flow and the exception handlers.
pub static FAULTS: FaultContext = FaultContext::new(ENGINE_CONFIG);

/// Record a checkpoint here against [`FAULTS`]; low memory raises an
/// `OutOfMemory` fault.
///
/// `checkpoint!()` uses the file name, `checkpoint!("label")` a fixed label.
#[cfg(feature = "hardware")]
#[macro_export]
macro_rules! checkpoint {
    () => {
        $crate::engine::check($crate::postmortem::mark!(
            $crate::engine::FAULTS,
            &$crate::hal::memory::MspProbe
        ))
    };
    ($location:expr) => {
        $crate::engine::check($crate::postmortem::mark!(
            $crate::engine::FAULTS,
            &$crate::hal::memory::MspProbe,
            $location
        ))
    };
}

#[cfg(feature = "hardware")]
pub use board::{check, early_warning, install, raise, start_liveness, stop_liveness, with_store};

#[cfg(feature = "hardware")]
mod board {
    use core::cell::RefCell;

    use cortex_m::peripheral::{SCB, SYST};
    use critical_section::Mutex;
    use embassy_stm32::peripherals::FLASH;
    use platform::{CapturedContext, WatchdogTimeout};
    use postmortem::{
        CrashStore, FaultCause, FaultEntry, FaultHandler, MemoryExhausted, ScanLayout, Seed,
        StackScanner,
    };
    use static_cell::StaticCell;

    use super::FAULTS;
    use crate::boot::{MAX_SCAN_WORDS, RESET_HANDLER_SPAN};
    use crate::hal::countdown::SysTickCountdown;
    use crate::hal::flash::{crash_store, BoardFlash};
    use crate::hal::memory::TargetMemory;
    use crate::hal::system::CortexSystem;

    type BoardHandler =
        FaultHandler<BoardFlash, SysTickCountdown, &'static StackScanner<TargetMemory>, CortexSystem>;

    static HANDLER: Mutex<RefCell<Option<BoardHandler>>> = Mutex::new(RefCell::new(None));
    static SCANNER: StaticCell<StackScanner<TargetMemory>> = StaticCell::new();

    fn scan_layout() -> ScanLayout {
        extern "C" {
            static __stext: u32;
            static __etext: u32;
            static _stack_start: u32;
            fn Reset() -> !;
        }
        // SAFETY: only the addresses of linker-provided symbols are taken.
        let (text_start, text_end, stack_top) = unsafe {
            (
                core::ptr::addr_of!(__stext) as u32,
                core::ptr::addr_of!(__etext) as u32,
                core::ptr::addr_of!(_stack_start) as u32,
            )
        };
        let reset = (Reset as usize as u32) & !1;
        ScanLayout {
            text: text_start..text_end,
            stack_top,
            entry: reset..reset.saturating_add(RESET_HANDLER_SPAN),
            max_scan_words: MAX_SCAN_WORDS,
        }
    }

    /// Build the fault handler. Later calls are ignored.
    pub fn install(flash: FLASH, syst: SYST) {
        let Some(scanner) = SCANNER.try_init(StackScanner::new(TargetMemory, scan_layout())) else {
            defmt::warn!("postmortem: handler already installed");
            return;
        };
        let handler = FaultHandler::new(
            crash_store(flash),
            SysTickCountdown::new(syst),
            &*scanner,
            CortexSystem,
        );
        critical_section::with(|cs| {
            let _previous = HANDLER.borrow(cs).replace(Some(handler));
        });
    }

    /// Run `f` against the crash store (post-reboot queries).
    pub fn with_store<R>(f: impl FnOnce(&mut CrashStore<BoardFlash>) -> R) -> Option<R> {
        critical_section::with(|cs| {
            let mut slot = HANDLER.borrow(cs).try_borrow_mut().ok()?;
            slot.as_mut().map(|h| f(h.store_mut()))
        })
    }

    /// Arm the SysTick liveness countdown.
    pub fn start_liveness(timeout: WatchdogTimeout) {
        critical_section::with(|cs| {
            if let Ok(mut slot) = HANDLER.borrow(cs).try_borrow_mut() {
                if let Some(h) = slot.as_mut() {
                    FAULTS.start_liveness_monitor(h.timer_mut(), timeout);
                }
            }
        });
    }

    /// Stop the SysTick liveness countdown.
    pub fn stop_liveness() {
        critical_section::with(|cs| {
            if let Ok(mut slot) = HANDLER.borrow(cs).try_borrow_mut() {
                if let Some(h) = slot.as_mut() {
                    FAULTS.stop_liveness_monitor(h.timer_mut());
                }
            }
        });
    }

    /// Enter the fault path. Never returns.
    #[inline(never)]
    pub fn raise(entry: FaultEntry) -> ! {
        let here = Seed {
            pc: cortex_m::register::pc::read(),
            lr: cortex_m::register::lr::read(),
            sp: cortex_m::register::msp::read(),
        };
        if !FAULTS.capture_in_progress() {
            critical_section::with(|cs| {
                if let Ok(mut slot) = HANDLER.borrow(cs).try_borrow_mut() {
                    if let Some(h) = slot.as_mut() {
                        h.unwinder().set_current(here);
                        h.handle(&FAULTS, entry);
                    }
                }
            });
        }
        // Nested fault, or no handler installed yet.
        SCB::sys_reset()
    }

    /// SysTick body: advance the countdown and decide feed or hang.
    pub fn early_warning(captured: &CapturedContext) {
        critical_section::with(|cs| {
            let Ok(mut slot) = HANDLER.borrow(cs).try_borrow_mut() else {
                return;
            };
            let Some(h) = slot.as_mut() else {
                return;
            };
            if h.timer_mut().tick() {
                let _ = h.on_early_warning(&FAULTS, captured);
            }
        });
    }

    /// Raise `OutOfMemory` when a checkpoint reported exhaustion.
    pub fn check(result: Result<(), MemoryExhausted>) {
        if let Err(e) = result {
            defmt::error!("postmortem: {} bytes free at checkpoint", e.free_bytes);
            raise(FaultEntry::panic(FaultCause::OutOfMemory));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postmortem::FaultCause;

    #[test]
    fn context_starts_clean() {
        let cp = FAULTS.checkpoint();
        assert_eq!(cp.line, 0);
        assert!(!cp.write_in_progress);
        assert!(!FAULTS.liveness().is_armed());
        assert_eq!(FAULTS.config().watchdog_vector, 15);
        assert_ne!(FaultCause::User, FaultCause::None);
    }
}
