//! Hardware adapters behind the `platform` traits.
//!
//! `countdown` and `memory` carry host-testable logic; the register-level
//! parts of every module are gated on `hardware`.

pub mod countdown;
pub mod memory;

#[cfg(feature = "hardware")]
pub mod flash;
#[cfg(feature = "hardware")]
pub mod system;
