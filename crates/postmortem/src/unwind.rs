//! Bounded call-stack unwinding.
//!
//! The walk policy lives here; how a frame is stepped to its caller is the
//! job of a [`ContextProvider`]. A provider may walk unwind tables, frame
//! pointer chains or scan the stack (see [`crate::scan`]). The policy is the
//! same for all of them:
//!
//! - at most [`MAX_FRAMES`] addresses, then stop and flag truncation
//! - the first address is always kept
//! - an address reported twice in a row ends the walk, except once: on the
//!   second frame, if the preserved link register differs from the cursor's
//!   return-address slot, the slot is overwritten and the walk continues
//! - the walk stops at the program entry point
//!
//! Captures from an exception get a second pass seeded from the preserved
//! link register when the first pass only found the faulting frame.

use platform::CapturedContext;

use crate::config::{MAX_FRAMES, MAX_STACKTRACE};

/// Starting point for a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Seed {
    /// Program counter of the innermost frame.
    pub pc: u32,
    /// Link register of the innermost frame (0 if unknown).
    pub lr: u32,
    /// Stack pointer of the innermost frame.
    pub sp: u32,
}

impl Seed {
    /// Seed from a captured exception context.
    pub fn from_context(ctx: &CapturedContext) -> Self {
        Self {
            pc: ctx.pc(),
            lr: ctx.lr(),
            sp: ctx.sp(),
        }
    }
}

/// A position in a call stack.
pub trait UnwindCursor {
    /// Instruction address of the current frame (Thumb bit clear).
    fn ip(&self) -> u32;

    /// Value in the current frame's return-address slot.
    fn return_address(&self) -> u32;

    /// Overwrite the current frame's return-address slot.
    fn set_return_address(&mut self, value: u32);

    /// Whether the current frame is the program entry point.
    fn at_entry_point(&self) -> bool;

    /// Move to the caller. Returns `false` when no caller can be found.
    fn step(&mut self) -> bool;
}

/// Source of unwind cursors.
pub trait ContextProvider {
    /// Cursor type produced by this provider.
    type Cursor: UnwindCursor;

    /// Cursor positioned at `seed`, or `None` if the seed is unusable
    /// (e.g. the pc lies outside executable memory).
    fn cursor_from(&mut self, seed: Seed) -> Option<Self::Cursor>;

    /// Cursor positioned at the caller's own frame.
    fn cursor_here(&mut self) -> Option<Self::Cursor>;
}

/// Return addresses collected by a walk, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Backtrace {
    frames: heapless::Vec<u32, MAX_FRAMES>,
    truncated: bool,
}

impl Backtrace {
    /// Empty backtrace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collected addresses.
    pub fn frames(&self) -> &[u32] {
        &self.frames
    }

    /// Number of collected addresses.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing was collected.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The walk stopped because the capacity was reached.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Zero-padded fixed array, as stored in a record. At least the last
    /// slot is zero.
    pub fn to_padded(&self) -> [u32; MAX_STACKTRACE] {
        let mut out = [0u32; MAX_STACKTRACE];
        for (slot, addr) in out.iter_mut().zip(self.frames.iter()) {
            *slot = *addr;
        }
        out
    }

    fn push(&mut self, addr: u32) -> bool {
        if self.frames.push(addr).is_err() {
            self.truncated = true;
            return false;
        }
        true
    }
}

/// Walk one pass, appending to `trace`.
///
/// `substituted` carries the single link-register substitution across passes.
fn walk<C: UnwindCursor>(
    cursor: &mut C,
    trace: &mut Backtrace,
    preserved_lr: u32,
    substituted: &mut bool,
) {
    let mut last_ip: Option<u32> = None;
    loop {
        let ip = cursor.ip();
        if last_ip == Some(ip) {
            let blind_spot = trace.len() == 1
                && !*substituted
                && preserved_lr != 0
                && preserved_lr != cursor.return_address();
            if !blind_spot {
                break;
            }
            cursor.set_return_address(preserved_lr);
            *substituted = true;
        } else {
            if trace.len() >= MAX_FRAMES {
                trace.truncated = true;
                break;
            }
            if !trace.push(ip) {
                break;
            }
            last_ip = Some(ip);
            if cursor.at_entry_point() {
                break;
            }
        }
        if !cursor.step() {
            break;
        }
    }
}

/// Backtrace of the code interrupted by an exception.
pub fn capture_exception<P: ContextProvider>(provider: &mut P, ctx: &CapturedContext) -> Backtrace {
    let seed = Seed::from_context(ctx);
    let mut trace = Backtrace::new();
    let mut substituted = false;

    if let Some(mut cursor) = provider.cursor_from(seed) {
        walk(&mut cursor, &mut trace, seed.lr, &mut substituted);
    }
    if trace.is_empty() {
        trace.push(seed.pc);
    }
    if trace.len() == 1 && seed.lr != 0 {
        // The faulting function may not have saved its return address yet;
        // retry from the link register.
        let retry = Seed {
            pc: seed.lr,
            lr: seed.lr,
            sp: seed.sp,
        };
        if let Some(mut cursor) = provider.cursor_from(retry) {
            walk(&mut cursor, &mut trace, seed.lr, &mut substituted);
        }
        if trace.len() == 1 {
            trace.push(seed.lr);
        }
    }
    trace
}

/// Backtrace of the calling code.
pub fn capture_current<P: ContextProvider>(provider: &mut P) -> Backtrace {
    let mut trace = Backtrace::new();
    let mut substituted = false;
    if let Some(mut cursor) = provider.cursor_here() {
        walk(&mut cursor, &mut trace, 0, &mut substituted);
    }
    trace
}
