//! Core system control seams used during fault capture.

/// Processor-level operations the fault path needs.
///
/// On Cortex-M these map to ICSR.VECTACTIVE, `cpsid i` and
/// AIRCR.SYSRESETREQ respectively.
pub trait SystemControl {
    /// Exception number currently being serviced, 0 in thread mode.
    fn active_vector(&self) -> u32;

    /// Mask all maskable interrupts. Idempotent.
    fn disable_interrupts(&mut self);

    /// Request a full system reset. Never returns.
    fn system_reset(&mut self) -> !;
}

/// Free-memory measurement for heap/stack collision detection.
pub trait MemoryProbe {
    /// Bytes between the top of the heap (or static data) and the current
    /// stack pointer. Negative when the stack has already crossed into them.
    fn free_memory(&self) -> i32;
}
