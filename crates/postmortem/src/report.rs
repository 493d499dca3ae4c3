//! Human-readable fault report.
//!
//! Output is plain text into any [`core::fmt::Write`] sink (a defmt/RTT
//! buffer on target, a `String` on the host).

use core::fmt::Write;

use crate::cause::FaultCause;
use crate::record::FaultRecord;

const REGISTER_NAMES: [&str; 16] = [
    "R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7", "R8", "R9", "R10", "R11", "R12", "SP", "LR",
    "PC",
];

/// Render `record` into `sink`.
///
/// # Errors
///
/// Propagates the sink's write error.
pub fn render_report<W: Write + ?Sized>(record: &FaultRecord, sink: &mut W) -> core::fmt::Result {
    if record.cause == FaultCause::None {
        return writeln!(sink, "No fault");
    }
    writeln!(sink, "Fault! Cause: {}", record.cause)?;
    writeln!(
        sink,
        "Fault during recording: {}",
        if record.is_corrupted { "Yes" } else { "No" }
    )?;
    writeln!(sink, "Line: {}", record.line)?;
    writeln!(sink, "File: {}", record.source_name.as_str())?;
    writeln!(sink, "Interrupt type: {}", record.interrupt_context)?;

    write!(sink, "Stacktrace: ")?;
    for (i, addr) in record.trace().iter().enumerate() {
        if i > 0 {
            write!(sink, ", ")?;
        }
        write!(sink, "{addr:#010x}")?;
    }
    writeln!(sink)?;

    if record.has_register_context() {
        writeln!(sink, "Registers:")?;
        for (name, value) in REGISTER_NAMES.iter().zip(record.registers.iter()) {
            writeln!(sink, "  {name:<4}{value:#010x}")?;
        }
        writeln!(sink, "  xPSR{:#010x}", record.status_register)?;
    }
    writeln!(sink, "Failures since upload: {}", record.failure_count)
}
