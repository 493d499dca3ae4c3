//! Architecture boundary tests — run with `cargo test -p firmware --test arch_boundaries`
// Architecture test file: expect/unwrap/panic are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
//!
//! Layering rules:
//!   Rule 1: postmortem (engine) must not depend on any HAL or runtime crate
//!   Rule 2: platform (traits + mocks) must not depend on the engine
//!   Rule 3: the crash slot is a zero-filled part of the linked image

/// The engine compiles against traits only.
#[test]
fn engine_has_no_hal_dependency() {
    let manifest = include_str!("../../postmortem/Cargo.toml");
    for banned in ["embassy", "cortex-m", "firmware"] {
        assert!(
            !manifest.contains(banned),
            "postmortem must not depend on {banned}"
        );
    }
}

/// platform sits below the engine.
#[test]
fn platform_does_not_depend_on_engine() {
    let manifest = include_str!("../../platform/Cargo.toml");
    assert!(!manifest.contains("postmortem"));
    assert!(!manifest.contains("firmware"));
}

/// No allocator anywhere in the engine source.
#[test]
fn engine_is_allocation_free() {
    let lib = include_str!("../../postmortem/src/lib.rs");
    assert!(lib.contains("no_std"));
    assert!(!lib.contains("extern crate alloc"));
}

/// Value after `key` on a memory.x region line, in bytes.
fn region_field(line: &str, key: &str) -> u32 {
    let raw = line
        .split(key)
        .nth(1)
        .and_then(|rest| rest.trim_start_matches([' ', '=']).split([',', ' ']).next())
        .expect("region field present")
        .trim();
    if let Some(hex) = raw.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).expect("hex origin")
    } else {
        raw.trim_end_matches('K').parse::<u32>().expect("length in K") * 1024
    }
}

fn region(name: &str) -> (u32, u32) {
    let memory_x = include_str!("../../../memory.x");
    let line = memory_x
        .lines()
        .find(|l| l.trim_start().starts_with(name) && l.contains("ORIGIN"))
        .unwrap_or_else(|| panic!("memory.x has a {name} region"));
    (region_field(line, "ORIGIN"), region_field(line, "LENGTH"))
}

/// FLASH ends where the crash slot region begins.
#[test]
fn crash_region_follows_flash() {
    let (flash_origin, flash_len) = region("FLASH");
    let (crash_origin, crash_len) = region("CRASH");
    assert_eq!(flash_origin, firmware::boot::FLASH_BASE);
    assert_eq!(flash_len, firmware::CRASH_SLOT_OFFSET);
    assert_eq!(crash_origin, flash_origin + firmware::CRASH_SLOT_OFFSET);
    assert_eq!(crash_len, firmware::boot::FLASH_SECTOR_SIZE);
}

/// The slot is linked into the image so any reprogram zeroes it.
#[test]
fn crash_slot_is_part_of_the_image() {
    let memory_x = include_str!("../../../memory.x");
    assert!(memory_x.contains("KEEP(*(.crash_slot"));
    assert!(memory_x.contains("} > CRASH"));
    assert!(!memory_x.contains("NOLOAD"));

    let flash_rs = include_str!("../src/hal/flash.rs");
    assert!(flash_rs.contains("#[link_section = \".crash_slot\"]"));
    assert!(flash_rs.contains("[0; SLOT_SIZE]"));
}

/// The exception handlers route every fault source into the engine.
#[test]
fn exception_handlers_cover_all_entries() {
    let src = include_str!("../src/exception_handlers.rs");
    assert!(src.contains(".global HardFault"));
    assert!(src.contains("CapturedContext::from_trampoline"));
    assert!(!src.contains("[0; CALLEE_SAVED_COUNT]"));
    assert!(src.contains(".global SysTick"));
    assert!(src.contains("#[panic_handler]"));
    assert!(src.contains("FaultCause::User"));
}
