//! Register state captured at exception entry.
//!
//! The exception trampoline (board glue, outside the engine's test surface)
//! satisfies one narrow contract: given the stack pointer that was active at
//! exception entry, produce the 16-register file and xPSR as they were
//! immediately before the exception. This module holds the types that carry
//! that result into the fault engine.
//!
//! # ARMv7-M exception entry (ARM DDI0403E §B1.5.6)
//!
//! On exception entry the core pushes eight words onto the active stack:
//!
//! ```text
//! SP + 0x00  r0
//! SP + 0x04  r1
//! SP + 0x08  r2
//! SP + 0x0C  r3
//! SP + 0x10  r12
//! SP + 0x14  lr   (link register of the interrupted code)
//! SP + 0x18  pc   (return address = faulting / interrupted instruction)
//! SP + 0x1C  xPSR
//! ```
//!
//! When the FPU context is active the frame grows by 18 words (s0–s15,
//! FPSCR, reserved). When stacked xPSR bit 9 is set the core inserted one
//! padding word to 8-byte align the frame.

/// Number of general-purpose registers in the captured file (r0–r15).
pub const REGISTER_COUNT: usize = 16;

/// Number of callee-saved registers the trampoline preserves itself (r4–r11).
pub const CALLEE_SAVED_COUNT: usize = 8;

/// Size in bytes of the basic (integer-only) exception frame.
pub const BASIC_FRAME_BYTES: u32 = 8 * 4;

/// Size in bytes of the extended (FPU) exception frame.
pub const EXTENDED_FRAME_BYTES: u32 = 26 * 4;

/// EXC_RETURN bit 4: set for a basic frame, clear when the core stacked the
/// FPU context.
pub const EXC_RETURN_STD_FRAME: u32 = 1 << 4;

/// Stacked xPSR bit set when the core padded the frame for 8-byte alignment.
pub const XPSR_STACK_ALIGN: u32 = 1 << 9;

/// Register index of the stack pointer in the captured file.
pub const SP: usize = 13;
/// Register index of the link register in the captured file.
pub const LR: usize = 14;
/// Register index of the program counter in the captured file.
pub const PC: usize = 15;

/// The eight words the core pushes automatically on exception entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StackedFrame {
    /// Stacked r0.
    pub r0: u32,
    /// Stacked r1.
    pub r1: u32,
    /// Stacked r2.
    pub r2: u32,
    /// Stacked r3.
    pub r3: u32,
    /// Stacked r12.
    pub r12: u32,
    /// Link register of the interrupted code.
    pub lr: u32,
    /// Address of the interrupted (or faulting) instruction.
    pub pc: u32,
    /// Program status register at the time of the exception.
    pub xpsr: u32,
}

impl StackedFrame {
    /// Build a frame from the eight raw stacked words, in push order.
    pub const fn from_words(words: [u32; 8]) -> Self {
        let [r0, r1, r2, r3, r12, lr, pc, xpsr] = words;
        Self {
            r0,
            r1,
            r2,
            r3,
            r12,
            lr,
            pc,
            xpsr,
        }
    }
}

/// Register context handed to the fault engine by the exception trampoline.
///
/// `registers` is the full r0–r15 file of the interrupted code. `registers[14]`
/// holds the interrupted code's own link register (the value the unwinder
/// calls the *preserved* link register), and `registers[13]` is the stack
/// pointer as it was before the core pushed the exception frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CapturedContext {
    /// Exception number that was active (VECTACTIVE); never 0 for a real capture.
    pub vector: u32,
    /// r0–r15 of the interrupted code.
    pub registers: [u32; REGISTER_COUNT],
    /// Stacked xPSR.
    pub xpsr: u32,
}

impl CapturedContext {
    /// Assemble the register file from an exception frame.
    ///
    /// - `vector`: active exception number read from ICSR.VECTACTIVE
    /// - `frame`: the eight words pushed by the core
    /// - `callee_saved`: r4–r11 as preserved by the trampoline (zero if the
    ///   trampoline does not preserve them)
    /// - `frame_address`: address of the stacked r0 word
    /// - `extended_frame`: `true` when EXC_RETURN bit 4 is clear (FPU frame)
    pub fn from_exception_entry(
        vector: u32,
        frame: &StackedFrame,
        callee_saved: &[u32; CALLEE_SAVED_COUNT],
        frame_address: u32,
        extended_frame: bool,
    ) -> Self {
        let mut frame_bytes = if extended_frame {
            EXTENDED_FRAME_BYTES
        } else {
            BASIC_FRAME_BYTES
        };
        if frame.xpsr & XPSR_STACK_ALIGN != 0 {
            frame_bytes = frame_bytes.wrapping_add(4);
        }
        let [r4, r5, r6, r7, r8, r9, r10, r11] = *callee_saved;
        Self {
            vector,
            registers: [
                frame.r0,
                frame.r1,
                frame.r2,
                frame.r3,
                r4,
                r5,
                r6,
                r7,
                r8,
                r9,
                r10,
                r11,
                frame.r12,
                frame_address.wrapping_add(frame_bytes),
                frame.lr,
                frame.pc,
            ],
            xpsr: frame.xpsr,
        }
    }

    /// Assemble the register file from what an assembly trampoline hands
    /// over: the stacked words, the EXC_RETURN value it was entered with and
    /// the r4–r11 block it pushed.
    pub fn from_trampoline(
        vector: u32,
        frame_words: [u32; 8],
        exc_return: u32,
        callee_saved: &[u32; CALLEE_SAVED_COUNT],
        frame_address: u32,
    ) -> Self {
        Self::from_exception_entry(
            vector,
            &StackedFrame::from_words(frame_words),
            callee_saved,
            frame_address,
            exc_return & EXC_RETURN_STD_FRAME == 0,
        )
    }

    /// Program counter of the interrupted code.
    pub fn pc(&self) -> u32 {
        self.registers[PC]
    }

    /// Link register of the interrupted code (the preserved link register).
    pub fn lr(&self) -> u32 {
        self.registers[LR]
    }

    /// Stack pointer of the interrupted code, before the exception frame.
    pub fn sp(&self) -> u32 {
        self.registers[SP]
    }
}
