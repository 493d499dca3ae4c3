//! Checkpoint ledger: the last place the program reported itself alive.
//!
//! # Access rules
//!
//! | Field               | Writer                       | Reader                 |
//! |---------------------|------------------------------|------------------------|
//! | `line`, `location`  | [`CheckpointLedger::record`] | fault capture (ISR)    |
//! | `write_in_progress` | [`CheckpointLedger::record`] | fault capture (ISR)    |
//!
//! Writers run in normal program flow and are serialised by it. The reader
//! runs in an exception that may preempt a writer at any instruction. Every
//! field is its own atomic, and `write_in_progress` brackets the update:
//! a reader that observes it set must treat `line`/`location` as torn.

use core::sync::atomic::{compiler_fence, AtomicBool, AtomicPtr, AtomicU32, AtomicUsize, Ordering};

/// A rolling snapshot of the most recent checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Checkpoint {
    /// Source line of the last checkpoint (0 before the first one).
    pub line: u32,
    /// Location label of the last checkpoint; empty when torn or unset.
    pub location: &'static str,
    /// The snapshot landed in the middle of an update.
    pub write_in_progress: bool,
}

impl Checkpoint {
    /// Snapshot taken before any checkpoint was recorded.
    pub const EMPTY: Self = Self {
        line: 0,
        location: "",
        write_in_progress: false,
    };
}

/// Interrupt-visible storage for the current checkpoint.
pub struct CheckpointLedger {
    line: AtomicU32,
    location_ptr: AtomicPtr<u8>,
    location_len: AtomicUsize,
    write_in_progress: AtomicBool,
}

impl CheckpointLedger {
    /// Empty ledger, usable in a `static`.
    pub const fn new() -> Self {
        Self {
            line: AtomicU32::new(0),
            location_ptr: AtomicPtr::new(core::ptr::null_mut()),
            location_len: AtomicUsize::new(0),
            write_in_progress: AtomicBool::new(false),
        }
    }

    /// Store a new checkpoint.
    pub fn record(&self, line: u32, location: &'static str) {
        self.write_in_progress.store(true, Ordering::Relaxed);
        // Field stores must not be hoisted above the sentinel.
        compiler_fence(Ordering::SeqCst);
        self.line.store(line, Ordering::Relaxed);
        self.location_ptr
            .store(location.as_ptr().cast_mut(), Ordering::Relaxed);
        self.location_len.store(location.len(), Ordering::Relaxed);
        self.write_in_progress.store(false, Ordering::Release);
    }

    /// Read the current checkpoint.
    ///
    /// When the sentinel is set, `location` is returned empty and the stored
    /// pointer is never dereferenced.
    pub fn snapshot(&self) -> Checkpoint {
        let write_in_progress = self.write_in_progress.load(Ordering::Acquire);
        let line = self.line.load(Ordering::Relaxed);
        if write_in_progress {
            return Checkpoint {
                line,
                location: "",
                write_in_progress,
            };
        }
        let ptr = self.location_ptr.load(Ordering::Relaxed);
        let len = self.location_len.load(Ordering::Relaxed);
        let location = if ptr.is_null() {
            ""
        } else {
            // SAFETY: with the sentinel clear, `ptr`/`len` were stored together
            // by `record` from a `&'static str`, so they describe live,
            // immutable, initialised bytes for the rest of the program.
            let bytes = unsafe { core::slice::from_raw_parts(ptr.cast_const(), len) };
            core::str::from_utf8(bytes).unwrap_or("")
        };
        Checkpoint {
            line,
            location,
            write_in_progress,
        }
    }

    /// Raise the sentinel without completing an update.
    ///
    /// Models a capture landing between the sentinel set and clear in
    /// [`record`](Self::record).
    #[doc(hidden)]
    pub fn begin_torn_write(&self) {
        self.write_in_progress.store(true, Ordering::Release);
    }
}

impl Default for CheckpointLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip directories from a `file!()` path.
pub fn short_file_name(path: &'static str) -> &'static str {
    path.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(path)
}
