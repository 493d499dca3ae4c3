//! Hardware Abstraction Layer (HAL) for postmortem fault capture
//!
//! This crate provides the narrow, trait-based seams the fault engine needs
//! from the microcontroller, so the engine itself can be developed and tested
//! on the host without physical hardware.
//!
//! # Architecture Layers
//!
//! ```text
//! Board glue (firmware crate: exception trampolines, SysTick, flash region)
//!         ↓
//! Fault engine (postmortem crate)
//!         ↓
//! Platform HAL (this crate - trait abstractions)
//!         ↓
//! Hardware Layer (cortex-m + Embassy HAL)
//! ```
//!
//! # Abstractions
//!
//! - [`CapturedContext`] - register file produced by the exception trampoline
//! - [`CountdownTimer`] - liveness countdown with an early-warning expiry
//! - [`SystemControl`] - active vector, interrupt masking, system reset
//! - [`MemoryProbe`] - free-memory measurement for heap/stack collision checks
//! - NOR flash is expressed through [`embedded_storage::nor_flash`] directly
//!
//! # Features
//!
//! - `std`: Enable host mocks (for testing)
//! - `hardware`: Physical hardware implementations
//! - `defmt`: Enable defmt logging

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)] // unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)] // prefer defmt over println! in lib code
// Pedantic lints suppressed for this hardware HAL crate:
#![allow(clippy::doc_markdown)] // hex addresses and register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors — callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod countdown;
pub mod exception;
pub mod mocks;
pub mod system;

pub use countdown::{CountdownTimer, WatchdogTimeout};
pub use exception::{CapturedContext, StackedFrame, CALLEE_SAVED_COUNT, REGISTER_COUNT};
pub use system::{MemoryProbe, SystemControl};
