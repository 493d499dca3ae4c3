//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits, plus a
//! NOR flash model with real erase/program discipline, for use in unit and
//! integration tests of the fault engine.

#![cfg(any(test, feature = "std"))]

use core::cell::Cell;

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashError, NorFlashErrorKind,
    ReadNorFlash,
};

use crate::{CountdownTimer, MemoryProbe, SystemControl};

// ── Flash ───────────────────────────────────────────────────────────────────

/// Error raised by [`MockFlash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFlashError {
    /// Offset or length not aligned to the program/erase granularity.
    NotAligned,
    /// Access beyond the end of the device.
    OutOfBounds,
    /// A program operation tried to set a bit that was not erased.
    NotErased {
        /// Absolute offset of the first offending byte.
        offset: u32,
    },
    /// Failure injected with [`MockFlash::fail_after_writes`].
    Injected,
}

impl NorFlashError for MockFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            Self::NotAligned => NorFlashErrorKind::NotAligned,
            Self::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            Self::NotErased { .. } | Self::Injected => NorFlashErrorKind::Other,
        }
    }
}

impl From<NorFlashErrorKind> for MockFlashError {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => Self::NotAligned,
            NorFlashErrorKind::OutOfBounds => Self::OutOfBounds,
            _ => Self::Injected,
        }
    }
}

/// One recorded flash operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    /// `erase(from, to)`
    Erase {
        /// Start offset (inclusive).
        from: u32,
        /// End offset (exclusive).
        to: u32,
    },
    /// `write(offset, len bytes)`
    Write {
        /// Start offset.
        offset: u32,
        /// Number of bytes programmed.
        len: usize,
    },
}

/// In-memory NOR flash.
///
/// Erase sets bytes to `0xFF`; program can only clear bits. Programming a bit
/// from 0 back to 1 without an erase is an error, exactly like the real part,
/// so a store that forgets to erase fails its tests.
pub struct MockFlash<const SIZE: usize, const WRITE: usize, const ERASE: usize> {
    bytes: [u8; SIZE],
    ops: heapless::Vec<FlashOp, 64>,
    erase_count: usize,
    write_count: usize,
    fail_after: Option<usize>,
}

/// Default geometry used by the engine tests: 4 KiB, 4-byte program unit,
/// 1 KiB erase sector.
pub type MockCrashFlash = MockFlash<4096, 4, 1024>;

impl<const SIZE: usize, const WRITE: usize, const ERASE: usize> MockFlash<SIZE, WRITE, ERASE> {
    /// Create a fully erased device.
    pub fn new() -> Self {
        Self {
            bytes: [0xFF; SIZE],
            ops: heapless::Vec::new(),
            erase_count: 0,
            write_count: 0,
            fail_after: None,
        }
    }

    /// Create a device whose every byte is zero (never-programmed RAM-backed slot).
    pub fn zeroed() -> Self {
        let mut flash = Self::new();
        flash.bytes = [0; SIZE];
        flash
    }

    /// Raw device contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable raw contents, for injecting corruption.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Recorded operations, oldest first (capped at 64).
    pub fn ops(&self) -> &[FlashOp] {
        &self.ops
    }

    /// Number of erase calls that succeeded.
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Number of write calls that succeeded.
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Make every write after the first `n` successful ones fail.
    pub fn fail_after_writes(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    /// Clear the operation log and counters (contents unchanged).
    pub fn clear_log(&mut self) {
        self.ops.clear();
        self.erase_count = 0;
        self.write_count = 0;
    }

    fn log(&mut self, op: FlashOp) {
        // Log is best-effort; a full log just stops recording.
        let _ = self.ops.push(op);
    }
}

impl<const SIZE: usize, const WRITE: usize, const ERASE: usize> Default
    for MockFlash<SIZE, WRITE, ERASE>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize, const WRITE: usize, const ERASE: usize> ErrorType
    for MockFlash<SIZE, WRITE, ERASE>
{
    type Error = MockFlashError;
}

impl<const SIZE: usize, const WRITE: usize, const ERASE: usize> ReadNorFlash
    for MockFlash<SIZE, WRITE, ERASE>
{
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        let src = self
            .bytes
            .get(start..start.saturating_add(bytes.len()))
            .ok_or(MockFlashError::OutOfBounds)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize, const WRITE: usize, const ERASE: usize> NorFlash
    for MockFlash<SIZE, WRITE, ERASE>
{
    const WRITE_SIZE: usize = WRITE;
    const ERASE_SIZE: usize = ERASE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        check_erase(self, from, to)?;
        let span = self
            .bytes
            .get_mut(from as usize..to as usize)
            .ok_or(MockFlashError::OutOfBounds)?;
        span.fill(0xFF);
        self.erase_count = self.erase_count.saturating_add(1);
        self.log(FlashOp::Erase { from, to });
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        check_write(self, offset, bytes.len())?;
        if self.fail_after.is_some_and(|n| self.write_count >= n) {
            return Err(MockFlashError::Injected);
        }
        let start = offset as usize;
        let dst = self
            .bytes
            .get_mut(start..start.saturating_add(bytes.len()))
            .ok_or(MockFlashError::OutOfBounds)?;
        if let Some(i) = dst.iter().zip(bytes).position(|(old, new)| old & new != *new) {
            let offset = offset.saturating_add(u32::try_from(i).unwrap_or(u32::MAX));
            return Err(MockFlashError::NotErased { offset });
        }
        for (old, new) in dst.iter_mut().zip(bytes) {
            *old &= *new;
        }
        self.write_count = self.write_count.saturating_add(1);
        self.log(FlashOp::Write {
            offset,
            len: bytes.len(),
        });
        Ok(())
    }
}

// ── Countdown ───────────────────────────────────────────────────────────────

/// One recorded countdown call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    /// `start(early_warning_ms)`
    Start(u32),
    /// `restart()`
    Restart,
    /// `stop()`
    Stop,
}

/// Mock liveness countdown that records every call.
#[derive(Debug, Default)]
pub struct MockCountdown {
    events: heapless::Vec<CountdownEvent, 32>,
    running: bool,
    armed_ms: Option<u32>,
}

impl MockCountdown {
    /// Create a stopped countdown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls seen so far, oldest first (capped at 32).
    pub fn events(&self) -> &[CountdownEvent] {
        &self.events
    }

    /// Whether the countdown is currently running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Delay passed to the most recent `start`.
    pub fn armed_ms(&self) -> Option<u32> {
        self.armed_ms
    }

    /// Number of `restart` calls.
    pub fn restart_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, CountdownEvent::Restart))
            .count()
    }
}

impl CountdownTimer for MockCountdown {
    fn start(&mut self, early_warning_ms: u32) {
        self.running = true;
        self.armed_ms = Some(early_warning_ms);
        let _ = self.events.push(CountdownEvent::Start(early_warning_ms));
    }

    fn restart(&mut self) {
        self.running = true;
        let _ = self.events.push(CountdownEvent::Restart);
    }

    fn stop(&mut self) {
        self.running = false;
        let _ = self.events.push(CountdownEvent::Stop);
    }
}

// ── System control ──────────────────────────────────────────────────────────

/// Panic message used by [`MockSystem::system_reset`].
pub const RESET_PANIC: &str = "system reset requested";

/// Mock processor control.
///
/// `system_reset` cannot return, so the mock panics with [`RESET_PANIC`];
/// tests catch it with `std::panic::catch_unwind`.
#[derive(Debug, Default)]
pub struct MockSystem {
    vector: u32,
    interrupts_disabled: bool,
}

impl MockSystem {
    /// Thread-mode system (vector 0) with interrupts enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// System currently servicing exception `vector`.
    pub fn in_exception(vector: u32) -> Self {
        Self {
            vector,
            interrupts_disabled: false,
        }
    }

    /// Whether `disable_interrupts` has been called.
    pub fn interrupts_disabled(&self) -> bool {
        self.interrupts_disabled
    }
}

impl SystemControl for MockSystem {
    fn active_vector(&self) -> u32 {
        self.vector
    }

    fn disable_interrupts(&mut self) {
        self.interrupts_disabled = true;
    }

    #[allow(clippy::panic)] // diverging reset has no host equivalent
    fn system_reset(&mut self) -> ! {
        panic!("{}", RESET_PANIC)
    }
}

// ── Memory probe ────────────────────────────────────────────────────────────

/// Mock free-memory probe with a settable reading.
#[derive(Debug)]
pub struct MockMemory {
    free: Cell<i32>,
}

impl MockMemory {
    /// Probe reporting `free` bytes.
    pub fn new(free: i32) -> Self {
        Self {
            free: Cell::new(free),
        }
    }

    /// Change the reported free memory.
    pub fn set(&self, free: i32) {
        self.free.set(free);
    }
}

impl Default for MockMemory {
    fn default() -> Self {
        Self::new(32 * 1024)
    }
}

impl MemoryProbe for MockMemory {
    fn free_memory(&self) -> i32 {
        self.free.get()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    type Flash = MockFlash<64, 4, 16>;

    #[test]
    fn fresh_flash_is_erased() {
        let flash = Flash::new();
        assert!(flash.bytes().iter().all(|&b| b == 0xFF));
        assert_eq!(flash.capacity(), 64);
    }

    #[test]
    fn program_clears_bits_and_read_returns_them() {
        let mut flash = Flash::new();
        flash.write(4, &[0x12, 0x34, 0x56, 0x78]).unwrap();
        let mut out = [0u8; 4];
        flash.read(4, &mut out).unwrap();
        assert_eq!(out, [0x12, 0x34, 0x56, 0x78]);
        assert_eq!(flash.write_count(), 1);
    }

    #[test]
    fn program_without_erase_is_rejected() {
        let mut flash = Flash::new();
        flash.write(0, &[0x00, 0x00, 0x00, 0x00]).unwrap();
        let err = flash.write(0, &[0x01, 0x00, 0x00, 0x00]).unwrap_err();
        assert_eq!(err, MockFlashError::NotErased { offset: 0 });
    }

    #[test]
    fn erase_restores_ones_and_is_logged() {
        let mut flash = Flash::zeroed();
        flash.erase(16, 32).unwrap();
        assert!(flash.bytes()[16..32].iter().all(|&b| b == 0xFF));
        assert!(flash.bytes()[..16].iter().all(|&b| b == 0));
        assert_eq!(flash.ops(), &[FlashOp::Erase { from: 16, to: 32 }]);
    }

    #[test]
    fn misaligned_operations_fail() {
        let mut flash = Flash::new();
        assert_eq!(flash.erase(1, 16), Err(MockFlashError::NotAligned));
        assert_eq!(flash.write(2, &[0; 4]), Err(MockFlashError::NotAligned));
        assert_eq!(flash.write(0, &[0; 3]), Err(MockFlashError::NotAligned));
        assert_eq!(flash.erase(0, 80), Err(MockFlashError::OutOfBounds));
    }

    #[test]
    fn injected_failure_after_n_writes() {
        let mut flash = Flash::new();
        flash.fail_after_writes(1);
        flash.write(0, &[0; 4]).unwrap();
        assert_eq!(flash.write(4, &[0; 4]), Err(MockFlashError::Injected));
    }

    #[test]
    fn countdown_records_calls() {
        let mut timer = MockCountdown::new();
        timer.start(500);
        timer.restart();
        timer.stop();
        assert_eq!(
            timer.events(),
            &[
                CountdownEvent::Start(500),
                CountdownEvent::Restart,
                CountdownEvent::Stop
            ]
        );
        assert!(!timer.is_running());
        assert_eq!(timer.armed_ms(), Some(500));
        assert_eq!(timer.restart_count(), 1);
    }

    #[test]
    fn system_reset_panics_with_marker() {
        let result = std::panic::catch_unwind(|| {
            let mut sys = MockSystem::in_exception(3);
            sys.system_reset();
        });
        let payload = result.unwrap_err();
        let msg = payload.downcast_ref::<String>().unwrap();
        assert_eq!(msg, RESET_PANIC);
    }

    #[test]
    fn memory_probe_reports_settable_value() {
        let mem = MockMemory::new(100);
        assert_eq!(mem.free_memory(), 100);
        mem.set(-4);
        assert_eq!(mem.free_memory(), -4);
    }
}
