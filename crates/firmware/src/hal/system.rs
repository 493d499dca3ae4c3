//! Core system control on Cortex-M7.

use cortex_m::peripheral::SCB;
use platform::SystemControl;

/// ICSR.VECTACTIVE mask.
const VECTACTIVE_MASK: u32 = 0x1FF;

/// Active exception number, 0 in thread mode.
pub fn active_vector() -> u32 {
    // SAFETY: read-only access to ICSR, which has no read side effects.
    unsafe { (*SCB::PTR).icsr.read() & VECTACTIVE_MASK }
}

/// [`SystemControl`] backed by the SCB and PRIMASK.
pub struct CortexSystem;

impl SystemControl for CortexSystem {
    fn active_vector(&self) -> u32 {
        active_vector()
    }

    fn disable_interrupts(&mut self) {
        cortex_m::interrupt::disable();
    }

    fn system_reset(&mut self) -> ! {
        SCB::sys_reset()
    }
}
