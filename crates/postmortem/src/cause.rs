//! Fault cause taxonomy.

/// Why the device went down.
///
/// Codes are part of the persisted layout and never change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum FaultCause {
    /// No fault recorded.
    #[default]
    None = 0,
    /// Fault in a context the classifier could not attribute.
    Unknown = 1,
    /// Liveness timeout: no checkpoint before the early-warning point.
    Hung = 2,
    /// Illegal instruction or memory access.
    HardFault = 3,
    /// Heap/stack collision detected at a checkpoint.
    OutOfMemory = 4,
    /// Explicit panic from application code.
    User = 5,
}

impl FaultCause {
    /// Persisted code.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Decode a persisted code; `None` for codes this build does not know.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Unknown),
            2 => Some(Self::Hung),
            3 => Some(Self::HardFault),
            4 => Some(Self::OutOfMemory),
            5 => Some(Self::User),
            _ => None,
        }
    }

    /// Short upper-case label used in reports.
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Unknown => "UNKNOWN",
            Self::Hung => "HUNG",
            Self::HardFault => "HARDFAULT",
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::User => "USER",
        }
    }
}

impl core::fmt::Display for FaultCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}
