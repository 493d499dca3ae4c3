//! Postmortem fault capture for single-core Cortex-M firmware
//!
//! On a hardware exception, a liveness timeout or an explicit panic, the
//! engine captures the cause, the register file, a bounded backtrace and the
//! last checkpoint, writes them as a fixed self-describing record into a
//! reserved flash slot, and resets. After reboot [`query::did_fault`] and
//! [`query::get_fault`] read the record back.
//!
//! # Architecture
//!
//! ```text
//! program flow ── mark!() ──▶ FaultContext { ledger, liveness, callback }
//!                                   │
//! exception / early warning / panic │
//!         ──▶ FaultHandler::handle ─┴─▶ unwind ─▶ FaultRecord ─▶ CrashStore ─▶ reset
//!
//! after reboot: query::{did_fault, get_fault} ◀── CrashStore
//! ```
//!
//! Hardware is reached only through [`platform`] traits and
//! [`embedded_storage::nor_flash`], so every module is host-testable.
//!
//! # Features
//!
//! - `std`: re-exports host mocks from `platform`
//! - `defmt`: `defmt::Format` derives and fault-path logging

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(unused_must_use)]
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod cause;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod context;
pub mod liveness;
pub mod query;
pub mod record;
pub mod report;
pub mod scan;
pub mod store;
pub mod unwind;

pub use cause::FaultCause;
pub use checkpoint::{Checkpoint, CheckpointLedger};
pub use classifier::{Capture, FaultEntry, FaultHandler, FaultState};
pub use config::{EngineConfig, MAX_FRAMES, MAX_STACKTRACE, RECORD_VERSION, SOURCE_NAME_CAPACITY};
pub use context::{FaultContext, MemoryExhausted};
pub use liveness::{EarlyWarning, LivenessMonitor};
pub use query::{did_fault, get_fault};
pub use record::{FaultRecord, RecordError, RECORD_MAGIC, RECORD_SIZE};
pub use report::render_report;
pub use scan::{MemoryReader, ScanLayout, StackScanner};
pub use store::{CrashStore, StoreError, SLOT_SIZE};
pub use unwind::{Backtrace, ContextProvider, Seed, UnwindCursor};

#[cfg(feature = "std")]
pub use platform::mocks;
