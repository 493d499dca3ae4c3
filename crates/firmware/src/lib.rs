//! STM32H743 board glue for the postmortem fault engine.
//!
//! # Architecture
//!
//! ```text
//! Application (main.rs) ── mark!() ──▶ engine::FAULTS
//!         │
//! Exception entry (exception_handlers)
//!   HardFault ─┐
//!   SysTick  ──┼──▶ engine::{raise, early_warning} ──▶ postmortem::FaultHandler
//!   panic    ──┘                                          │
//!                                 hal::{flash, countdown, system, memory}
//! ```
//!
//! Everything above `hal` that does not touch registers (board constants,
//! the software countdown, memory-map checks) builds on the host and is
//! covered by `cargo test -p firmware`.
//!
//! # Features
//!
//! - `hardware` - Build for STM32H7 target (embassy, cortex-m-rt, defmt-rtt)
//! - `std` - Enable standard library (host testing)
//!
//! # Hardware Target
//!
//! ```bash
//! cargo build --release --target thumbv7em-none-eabihf --features hardware
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
#![warn(clippy::print_stdout)]
#![warn(clippy::dbg_macro)]
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
// Register and linker-symbol addresses are 32-bit on this target.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod boot;
pub mod engine;
pub mod hal;

#[cfg(feature = "hardware")]
pub mod exception_handlers;

pub use postmortem;

pub use boot::{CRASH_SLOT_OFFSET, DEFAULT_TIMEOUT, ENGINE_CONFIG};
pub use engine::FAULTS;
pub use hal::countdown::TickCountdown;
pub use hal::memory::{free_between, MemoryMap};
