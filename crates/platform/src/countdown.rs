//! Liveness countdown abstraction.
//!
//! The liveness monitor needs a countdown that raises a fault-capable
//! interrupt when it expires and can be restarted or stopped. The hardware
//! implementation lives in board glue (SysTick on the reference board); host
//! tests use [`crate::mocks::MockCountdown`].

/// Liveness timeout selection.
///
/// The labelled duration is the full watchdog period. The early-warning
/// interrupt fires at half of it, leaving the second half as the hard stage.
/// The discriminants match the period codes of the watchdog peripherals this
/// ladder originates from (1 = shortest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum WatchdogTimeout {
    /// 8 ms period
    Ms8 = 1,
    /// 15 ms period
    Ms15 = 2,
    /// 31 ms period
    Ms31 = 3,
    /// 62 ms period
    Ms62 = 4,
    /// 125 ms period
    Ms125 = 5,
    /// 250 ms period
    Ms250 = 6,
    /// 500 ms period
    Ms500 = 7,
    /// 1 s period
    S1 = 8,
    /// 2 s period
    S2 = 9,
    /// 4 s period
    S4 = 10,
    /// 8 s period
    S8 = 11,
}

impl WatchdogTimeout {
    /// Every selectable timeout, shortest first.
    pub const ALL: [Self; 11] = [
        Self::Ms8,
        Self::Ms15,
        Self::Ms31,
        Self::Ms62,
        Self::Ms125,
        Self::Ms250,
        Self::Ms500,
        Self::S1,
        Self::S2,
        Self::S4,
        Self::S8,
    ];

    /// Full watchdog period in milliseconds.
    pub const fn period_ms(self) -> u32 {
        match self {
            Self::Ms8 => 8,
            Self::Ms15 => 15,
            Self::Ms31 => 31,
            Self::Ms62 => 62,
            Self::Ms125 => 125,
            Self::Ms250 => 250,
            Self::Ms500 => 500,
            Self::S1 => 1_000,
            Self::S2 => 2_000,
            Self::S4 => 4_000,
            Self::S8 => 8_000,
        }
    }

    /// Delay from (re)start to the early-warning interrupt, in milliseconds.
    ///
    /// Never zero, so even the 8 ms setting leaves a measurable window.
    pub const fn early_warning_ms(self) -> u32 {
        let half = self.period_ms() / 2;
        if half == 0 {
            1
        } else {
            half
        }
    }

    /// Period code (1 = 8 ms … 11 = 8 s).
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a period code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }
}

/// A one-shot-per-period countdown whose expiry is the early-warning stage.
///
/// Implementations must raise the board's liveness interrupt when the armed
/// delay elapses without a [`restart`](CountdownTimer::restart).
pub trait CountdownTimer {
    /// Arm the countdown to expire `early_warning_ms` from now.
    fn start(&mut self, early_warning_ms: u32);

    /// Reload the countdown with the delay given to the last `start`.
    fn restart(&mut self);

    /// Stop the countdown; no further expiry interrupts until `start`.
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_warning_is_half_the_period() {
        assert_eq!(WatchdogTimeout::S8.early_warning_ms(), 4_000);
        assert_eq!(WatchdogTimeout::Ms250.early_warning_ms(), 125);
        assert_eq!(WatchdogTimeout::Ms15.early_warning_ms(), 7);
    }

    #[test]
    fn periods_increase_monotonically() {
        for pair in WatchdogTimeout::ALL.windows(2) {
            if let [a, b] = pair {
                assert!(a.period_ms() < b.period_ms());
            }
        }
    }

    #[test]
    fn codes_round_trip() {
        for t in WatchdogTimeout::ALL {
            assert_eq!(WatchdogTimeout::from_code(t.code()), Some(t));
        }
        assert_eq!(WatchdogTimeout::from_code(0), None);
        assert_eq!(WatchdogTimeout::from_code(12), None);
    }
}
