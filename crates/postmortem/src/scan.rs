//! Stack-scanning context provider for Thumb-2 targets.
//!
//! Without unwind tables linked into the image, the caller of a frame is
//! recovered by scanning the stack upward for words that look like return
//! addresses: odd (Thumb bit set), inside `.text`, and directly preceded by a
//! call instruction.
//!
//! Call encodings recognised before a return address `r`:
//!
//! ```text
//! BL  <imm>   32-bit: hw1 @ r-4 = 11110xxx_xxxxxxxx
//!                     hw2 @ r-2 = 11x1xxxx_xxxxxxxx
//! BLX Rm      16-bit: hw  @ r-2 = 01000111_1xxxx000
//! ```
//!
//! The scan may report stale return addresses left in dead stack slots. It is
//! a best-effort source, which is all the walk policy in [`crate::unwind`]
//! assumes.

use core::ops::Range;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::unwind::{ContextProvider, Seed, UnwindCursor};

/// Read-only access to target memory.
pub trait MemoryReader {
    /// Aligned 32-bit read; `None` outside readable memory.
    fn read_word(&self, addr: u32) -> Option<u32>;

    /// Aligned 16-bit read; `None` outside readable memory.
    fn read_halfword(&self, addr: u32) -> Option<u16>;
}

impl<R: MemoryReader + ?Sized> MemoryReader for &R {
    fn read_word(&self, addr: u32) -> Option<u32> {
        (**self).read_word(addr)
    }

    fn read_halfword(&self, addr: u32) -> Option<u16> {
        (**self).read_halfword(addr)
    }
}

/// Memory map the scanner needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLayout {
    /// Executable code (`__stext..__etext`).
    pub text: Range<u32>,
    /// Highest stack address (initial MSP); scanning stops here.
    pub stack_top: u32,
    /// Address range of the program entry function.
    pub entry: Range<u32>,
    /// Upper bound on words inspected per step.
    pub max_scan_words: u32,
}

/// [`ContextProvider`] that scans the stack for return addresses.
///
/// Shared by reference (`&StackScanner` is the provider), so the seed for
/// synchronous captures lives in atomics. A zero pc means no seed.
pub struct StackScanner<R> {
    memory: R,
    layout: ScanLayout,
    here_pc: AtomicU32,
    here_lr: AtomicU32,
    here_sp: AtomicU32,
}

impl<R: MemoryReader> StackScanner<R> {
    /// Scanner over `memory` with the given layout.
    pub fn new(memory: R, layout: ScanLayout) -> Self {
        Self {
            memory,
            layout,
            here_pc: AtomicU32::new(0),
            here_lr: AtomicU32::new(0),
            here_sp: AtomicU32::new(0),
        }
    }

    /// Seed used by [`ContextProvider::cursor_here`].
    ///
    /// Board glue reads pc/lr/sp at the panic site and sets them here before
    /// a synchronous capture.
    pub fn set_current(&self, seed: Seed) {
        self.here_lr.store(seed.lr, Ordering::Relaxed);
        self.here_sp.store(seed.sp, Ordering::Relaxed);
        self.here_pc.store(seed.pc, Ordering::Release);
    }

    fn current(&self) -> Option<Seed> {
        let pc = self.here_pc.load(Ordering::Acquire);
        (pc != 0).then(|| Seed {
            pc,
            lr: self.here_lr.load(Ordering::Relaxed),
            sp: self.here_sp.load(Ordering::Relaxed),
        })
    }

    /// Memory layout.
    pub fn layout(&self) -> &ScanLayout {
        &self.layout
    }

    /// Whether `word` is a plausible Thumb return address.
    pub fn is_return_address(&self, word: u32) -> bool {
        if word & 1 == 0 {
            return false;
        }
        let target = word & !1;
        if !self.layout.text.contains(&target) {
            return false;
        }
        let Some(prev) = target.checked_sub(2) else {
            return false;
        };
        if let Some(hw) = self.memory.read_halfword(prev) {
            if hw & 0xFF87 == 0x4780 {
                return true;
            }
        }
        let Some(first) = target.checked_sub(4) else {
            return false;
        };
        if first < self.layout.text.start {
            return false;
        }
        match (
            self.memory.read_halfword(first),
            self.memory.read_halfword(prev),
        ) {
            (Some(hw1), Some(hw2)) => hw1 & 0xF800 == 0xF000 && hw2 & 0xD000 == 0xD000,
            _ => false,
        }
    }

    fn cursor(&self, seed: Seed) -> Option<ScanCursor<'_, R>> {
        let pc = seed.pc & !1;
        if !self.layout.text.contains(&pc) {
            return None;
        }
        Some(ScanCursor {
            scanner: self,
            ip: pc,
            return_address: seed.lr,
            lr_pending: true,
            skip_once: None,
            sp: seed.sp & !3,
        })
    }
}

impl<'a, R: MemoryReader> ContextProvider for &'a StackScanner<R> {
    type Cursor = ScanCursor<'a, R>;

    fn cursor_from(&mut self, seed: Seed) -> Option<Self::Cursor> {
        let scanner: &'a StackScanner<R> = *self;
        scanner.cursor(seed)
    }

    fn cursor_here(&mut self) -> Option<Self::Cursor> {
        let scanner: &'a StackScanner<R> = *self;
        scanner.cursor(scanner.current()?)
    }
}

/// Cursor produced by [`StackScanner`].
pub struct ScanCursor<'a, R> {
    scanner: &'a StackScanner<R>,
    ip: u32,
    return_address: u32,
    lr_pending: bool,
    skip_once: Option<u32>,
    sp: u32,
}

impl<R: MemoryReader> ScanCursor<'_, R> {
    fn scan(&mut self) -> Option<u32> {
        let layout = &self.scanner.layout;
        let mut inspected = 0u32;
        while self.sp < layout.stack_top && inspected < layout.max_scan_words {
            let addr = self.sp;
            self.sp = self.sp.saturating_add(4);
            inspected = inspected.saturating_add(1);
            let Some(word) = self.scanner.memory.read_word(addr) else {
                return None;
            };
            if !self.scanner.is_return_address(word) {
                continue;
            }
            if self.skip_once == Some(word) {
                // The link register we already followed was spilled here.
                self.skip_once = None;
                continue;
            }
            return Some(word);
        }
        None
    }
}

impl<R: MemoryReader> UnwindCursor for ScanCursor<'_, R> {
    fn ip(&self) -> u32 {
        self.ip
    }

    fn return_address(&self) -> u32 {
        self.return_address
    }

    fn set_return_address(&mut self, value: u32) {
        self.return_address = value;
        self.lr_pending = true;
    }

    fn at_entry_point(&self) -> bool {
        self.scanner.layout.entry.contains(&self.ip)
    }

    fn step(&mut self) -> bool {
        let next = if self.lr_pending && self.scanner.is_return_address(self.return_address) {
            self.lr_pending = false;
            self.skip_once = Some(self.return_address);
            Some(self.return_address)
        } else {
            self.lr_pending = false;
            self.scan()
        };
        match next {
            Some(ret) => {
                self.ip = ret & !1;
                self.return_address = ret;
                true
            }
            None => false,
        }
    }
}
