//! Liveness countdown on SysTick.
//!
//! SysTick interrupts at [`SYSTICK_HZ`]; [`TickCountdown`] divides that down
//! to the early-warning period in software. TIM2 drives embassy-time, so
//! SysTick is free for this.

use platform::CountdownTimer;

use crate::boot::SYSTICK_HZ;

/// Software early-warning counter advanced once per SysTick interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickCountdown {
    period: u32,
    remaining: u32,
    running: bool,
}

impl TickCountdown {
    /// Stopped countdown.
    pub const fn new() -> Self {
        Self {
            period: 0,
            remaining: 0,
            running: false,
        }
    }

    /// Whether the countdown is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Ticks left until the next early warning.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Advance one tick.
    ///
    /// Returns `true` when the early-warning period elapsed. The counter
    /// reloads so a missed restart warns again one period later.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.remaining = self.period;
            return true;
        }
        false
    }
}

/// SysTick interrupts in `ms` milliseconds, at least one.
pub fn ms_to_ticks(ms: u32) -> u32 {
    u64::from(ms)
        .saturating_mul(u64::from(SYSTICK_HZ))
        .checked_div(1000)
        .and_then(|t| u32::try_from(t).ok())
        .unwrap_or(u32::MAX)
        .max(1)
}

impl CountdownTimer for TickCountdown {
    fn start(&mut self, early_warning_ms: u32) {
        self.period = ms_to_ticks(early_warning_ms);
        self.remaining = self.period;
        self.running = true;
    }

    fn restart(&mut self) {
        self.remaining = self.period;
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

/// [`CountdownTimer`] on the core SysTick peripheral.
#[cfg(feature = "hardware")]
pub struct SysTickCountdown {
    syst: cortex_m::peripheral::SYST,
    soft: TickCountdown,
}

#[cfg(feature = "hardware")]
impl SysTickCountdown {
    /// Take ownership of SysTick. The counter stays off until `start`.
    pub fn new(mut syst: cortex_m::peripheral::SYST) -> Self {
        syst.disable_interrupt();
        syst.disable_counter();
        Self {
            syst,
            soft: TickCountdown::new(),
        }
    }

    /// Called from the SysTick handler; `true` at early warning.
    pub fn tick(&mut self) -> bool {
        self.soft.tick()
    }
}

#[cfg(feature = "hardware")]
impl CountdownTimer for SysTickCountdown {
    fn start(&mut self, early_warning_ms: u32) {
        use cortex_m::peripheral::syst::SystClkSource;

        self.soft.start(early_warning_ms);
        self.syst.set_clock_source(SystClkSource::Core);
        self.syst.set_reload(crate::boot::SYSTICK_RELOAD);
        self.syst.clear_current();
        self.syst.enable_interrupt();
        self.syst.enable_counter();
    }

    fn restart(&mut self) {
        self.soft.restart();
    }

    fn stop(&mut self) {
        self.syst.disable_interrupt();
        self.syst.disable_counter();
        self.soft.stop();
    }
}
