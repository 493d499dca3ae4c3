//! Engine configuration
//!
//! Compile-time capacities shared by the codec and the unwinder, plus the
//! small runtime configuration a board hands to [`crate::FaultContext`].

/// Stacktrace slots in a persisted record.
pub const MAX_STACKTRACE: usize = 32;

/// Maximum number of return addresses a walk collects. The final record
/// slot is always left as the zero terminator.
pub const MAX_FRAMES: usize = MAX_STACKTRACE - 1;

/// Maximum number of bytes kept from a checkpoint location (plus NUL on disk).
pub const SOURCE_NAME_CAPACITY: usize = 63;

/// Persisted layout version written by this build.
pub const RECORD_VERSION: u32 = 1;

/// Cortex-M exception number of HardFault.
pub const HARDFAULT_VECTOR: u32 = 3;

/// Cortex-M exception number of SysTick.
pub const SYSTICK_VECTOR: u32 = 15;

/// Board-level engine configuration.
///
/// Constructed in a `const` context so the fault context can live in a
/// `static`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineConfig {
    /// Exception number of the liveness countdown interrupt.
    pub watchdog_vector: u32,
    /// Exception number classified as a hard fault.
    pub hardfault_vector: u32,
    /// A checkpoint reporting this many free bytes or fewer raises
    /// `OutOfMemory`.
    pub low_water_bytes: u32,
    /// Program-buffer size used when committing the record to flash.
    /// Rounded up to the flash write granularity by the store.
    pub program_chunk: usize,
}

impl EngineConfig {
    /// SysTick liveness countdown, 512 B low-water mark, 256 B program chunks.
    pub const DEFAULT: Self = Self {
        watchdog_vector: SYSTICK_VECTOR,
        hardfault_vector: HARDFAULT_VECTOR,
        low_water_bytes: 512,
        program_chunk: 256,
    };

    /// Replace the liveness interrupt vector.
    #[must_use]
    pub const fn with_watchdog_vector(mut self, vector: u32) -> Self {
        self.watchdog_vector = vector;
        self
    }

    /// Replace the low-water threshold.
    #[must_use]
    pub const fn with_low_water(mut self, bytes: u32) -> Self {
        self.low_water_bytes = bytes;
        self
    }

    /// Replace the program chunk size.
    #[must_use]
    pub const fn with_program_chunk(mut self, bytes: usize) -> Self {
        self.program_chunk = bytes;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
