//! Memory map, free-stack probe and the target memory reader used by the
//! stack scanner.

use core::ops::Range;

use crate::boot::{AXISRAM_BASE, AXISRAM_SIZE, DTCM_BASE, DTCM_SIZE, FLASH_BASE, FLASH_SIZE};

/// Address ranges that are always safe to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryMap<const N: usize> {
    regions: [Range<u32>; N],
}

impl<const N: usize> MemoryMap<N> {
    /// Map made of `regions`.
    pub const fn new(regions: [Range<u32>; N]) -> Self {
        Self { regions }
    }

    /// Whether `len` bytes at `addr` lie inside one region.
    pub fn contains(&self, addr: u32, len: u32) -> bool {
        let Some(end) = addr.checked_add(len) else {
            return false;
        };
        self.regions
            .iter()
            .any(|r| r.start <= addr && end <= r.end)
    }
}

/// Readable regions of the STM32H743: internal flash, DTCM and AXI SRAM.
pub const BOARD_MAP: MemoryMap<3> = MemoryMap::new([
    FLASH_BASE..FLASH_BASE + FLASH_SIZE,
    DTCM_BASE..DTCM_BASE + DTCM_SIZE,
    AXISRAM_BASE..AXISRAM_BASE + AXISRAM_SIZE,
]);

/// Free bytes between the stack pointer and the top of static data.
///
/// Negative once the stack has grown into `.bss`.
pub fn free_between(sp: u32, floor: u32) -> i32 {
    let free = i64::from(sp).saturating_sub(i64::from(floor));
    i32::try_from(free).unwrap_or(if free < 0 { i32::MIN } else { i32::MAX })
}

/// Reads target memory directly, refusing anything outside [`BOARD_MAP`].
#[cfg(feature = "hardware")]
pub struct TargetMemory;

#[cfg(feature = "hardware")]
impl postmortem::MemoryReader for TargetMemory {
    fn read_word(&self, addr: u32) -> Option<u32> {
        if addr & 3 != 0 || !BOARD_MAP.contains(addr, 4) {
            return None;
        }
        // SAFETY: aligned, and inside a region that is mapped and readable
        // for the whole lifetime of the program.
        Some(unsafe { core::ptr::read_volatile(addr as *const u32) })
    }

    fn read_halfword(&self, addr: u32) -> Option<u16> {
        if addr & 1 != 0 || !BOARD_MAP.contains(addr, 2) {
            return None;
        }
        // SAFETY: as for `read_word`.
        Some(unsafe { core::ptr::read_volatile(addr as *const u16) })
    }
}

/// Free memory as the gap between MSP and the end of `.bss`.
#[cfg(feature = "hardware")]
pub struct MspProbe;

#[cfg(feature = "hardware")]
impl platform::MemoryProbe for MspProbe {
    fn free_memory(&self) -> i32 {
        extern "C" {
            static __ebss: u32;
        }
        // SAFETY: only the address of the linker symbol is taken.
        let floor = unsafe { core::ptr::addr_of!(__ebss) } as u32;
        free_between(cortex_m::register::msp::read(), floor)
    }
}
