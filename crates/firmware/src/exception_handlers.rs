//! Cortex-M exception entry for the fault engine.
//!
//! Both handlers are hand-written trampolines that push r4–r11 and pass
//! EXC_RETURN along, so the engine sees the full register file of the
//! interrupted code and the stack pointer from before the (basic or FPU)
//! frame.
//!
//! - **HardFault**: captured and handed to the engine; never returns.
//! - **SysTick**: liveness early warning; returns to the interrupted code
//!   when the program checked in.
//! - **panic**: routed to the engine as a `USER` fault.

#![allow(clippy::doc_markdown)]

use platform::{CapturedContext, CALLEE_SAVED_COUNT};
use postmortem::config::SYSTICK_VECTOR;
use postmortem::{FaultCause, FaultEntry};

use crate::engine;
use crate::hal::system::active_vector;

/// Register file from a trampoline's arguments.
///
/// # Safety
///
/// `frame` must point at the hardware-stacked words and `callee` at the
/// r4–r11 block the trampoline pushed, both live for the call.
unsafe fn capture(
    vector: u32,
    frame: *const [u32; 8],
    exc_return: u32,
    callee: *const [u32; CALLEE_SAVED_COUNT],
) -> CapturedContext {
    // SAFETY: guaranteed by the caller; both blocks are word-aligned stack
    // memory.
    let (words, saved) = unsafe { (core::ptr::read(frame), core::ptr::read(callee)) };
    CapturedContext::from_trampoline(vector, words, exc_return, &saved, frame as u32)
}

// HardFault trampoline. Pushes r4-r11 and calls
// `hardfault_entry(frame, exc_return, callee_saved)`, which never returns.
core::arch::global_asm!(
    ".section .text.HardFault,\"ax\",%progbits",
    ".global HardFault",
    ".type HardFault,%function",
    ".thumb_func",
    "HardFault:",
    "    push {{r4-r11}}",
    "    mov r2, sp",
    "    mov r1, lr",
    "    tst lr, #4",
    "    ite eq",
    "    addeq r0, sp, #32",
    "    mrsne r0, psp",
    "    bl {entry}",
    "    b .",
    ".size HardFault, . - HardFault",
    entry = sym hardfault_entry,
);

extern "C" fn hardfault_entry(
    frame: *const [u32; 8],
    exc_return: u32,
    callee: *const [u32; CALLEE_SAVED_COUNT],
) -> ! {
    // SAFETY: called only from the HardFault trampoline above.
    let captured = unsafe { capture(active_vector(), frame, exc_return, callee) };
    engine::raise(FaultEntry::Exception(captured))
}

// SysTick trampoline. Pushes r4-r11, r12 (padding) and EXC_RETURN, then calls
// `systick_entry(frame, exc_return, callee_saved)`. Returns by popping
// EXC_RETURN into pc.
core::arch::global_asm!(
    ".section .text.SysTick,\"ax\",%progbits",
    ".global SysTick",
    ".type SysTick,%function",
    ".thumb_func",
    "SysTick:",
    "    push {{r4-r11, ip, lr}}",
    "    mov r2, sp",
    "    mov r1, lr",
    "    tst lr, #4",
    "    ite eq",
    "    addeq r0, sp, #40",
    "    mrsne r0, psp",
    "    bl {entry}",
    "    pop {{r4-r11, ip, pc}}",
    ".size SysTick, . - SysTick",
    entry = sym systick_entry,
);

extern "C" fn systick_entry(
    frame: *const [u32; 8],
    exc_return: u32,
    callee: *const [u32; CALLEE_SAVED_COUNT],
) {
    // SAFETY: called only from the SysTick trampoline above.
    let captured = unsafe { capture(SYSTICK_VECTOR, frame, exc_return, callee) };
    engine::early_warning(&captured);
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    defmt::error!("panic: {}", defmt::Display2Format(info));
    engine::raise(FaultEntry::panic(FaultCause::User))
}
