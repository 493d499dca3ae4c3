//! Internal flash as the crash record device.
//!
//! `embassy_stm32::flash::Flash` implements `NorFlash` with offsets relative
//! to [`FLASH_BASE`], 32-byte writes and 128 KiB sector erases.
//!
//! The slot itself is a zero-filled static linked into `.crash_slot`. A
//! zeroed slot decodes as "no fault", so whatever tool programs the image
//! (probe-rs, a bootloader, a sector erase) also resets the failure count.

use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::peripherals::FLASH;
use postmortem::{CrashStore, SLOT_SIZE};

use crate::boot::{CRASH_SLOT_OFFSET, FLASH_BASE};

/// Blocking internal flash driver.
pub type BoardFlash = Flash<'static, Blocking>;

/// Crash slot contents as programmed with the image. Only ever written
/// through the flash controller; never read through this reference.
#[used]
#[link_section = ".crash_slot"]
static CRASH_SLOT: [u8; SLOT_SIZE] = [0; SLOT_SIZE];

/// Flash offset of the linked crash slot.
fn slot_offset() -> u32 {
    (core::ptr::addr_of!(CRASH_SLOT) as u32).wrapping_sub(FLASH_BASE)
}

/// Crash store over the linked slot.
pub fn crash_store(flash: FLASH) -> CrashStore<BoardFlash> {
    let offset = slot_offset();
    if offset != CRASH_SLOT_OFFSET {
        defmt::warn!(
            "postmortem: .crash_slot linked at {=u32:#x}, expected {=u32:#x}",
            offset,
            CRASH_SLOT_OFFSET
        );
    }
    CrashStore::new(Flash::new_blocking(flash), offset)
}
