//! Board constants for the STM32H743ZI fault engine.
//!
//! Flash layout (2 MiB, two banks of eight 128 KiB sectors):
//!
//! ```text
//! 0x0800_0000 ┌──────────────────────────┐
//!             │ firmware image           │ bank 1 + bank 2 sectors 0..6
//! 0x081E_0000 ├──────────────────────────┤
//!             │ crash slot (512 B used)  │ bank 2 sector 7, `.crash_slot`:
//! 0x0820_0000 └──────────────────────────┘ zeros in the image
//! ```
//!
//! All values are pure data and host-testable.

use platform::WatchdogTimeout;
use postmortem::config::SYSTICK_VECTOR;
use postmortem::EngineConfig;

/// Start of internal flash in the memory map.
pub const FLASH_BASE: u32 = 0x0800_0000;

/// Internal flash size.
pub const FLASH_SIZE: u32 = 2 * 1024 * 1024;

/// Erase granularity of the internal flash (one sector).
pub const FLASH_SECTOR_SIZE: u32 = 128 * 1024;

/// Program granularity: one 256-bit flash word.
pub const FLASH_WRITE_SIZE: u32 = 32;

/// Crash slot offset from [`FLASH_BASE`]: the last sector of bank 2.
///
/// `memory.x` maps this sector as the `CRASH` region holding the zero-filled
/// `.crash_slot` section, so loading any image clears the slot.
pub const CRASH_SLOT_OFFSET: u32 = FLASH_SIZE - FLASH_SECTOR_SIZE;

/// Bytes written per program call while persisting a record.
pub const PROGRAM_CHUNK: usize = 256;

/// Checkpoints that see less free stack than this raise `OutOfMemory`.
pub const LOW_WATER_BYTES: u32 = 1024;

/// Engine configuration: the SysTick countdown is the liveness source.
pub const ENGINE_CONFIG: EngineConfig = EngineConfig::DEFAULT
    .with_watchdog_vector(SYSTICK_VECTOR)
    .with_low_water(LOW_WATER_BYTES)
    .with_program_chunk(PROGRAM_CHUNK);

/// Liveness timeout armed by the demo application.
pub const DEFAULT_TIMEOUT: WatchdogTimeout = WatchdogTimeout::S1;

/// Core clock after `embassy_stm32::init` with [`build_embassy_config`].
pub const CORE_CLOCK_HZ: u32 = 400_000_000;

/// SysTick interrupt rate driving the software countdown.
pub const SYSTICK_HZ: u32 = 1_000;

/// DTCM RAM: `.data`, `.bss` and the main stack.
pub const DTCM_BASE: u32 = 0x2000_0000;
/// DTCM size.
pub const DTCM_SIZE: u32 = 128 * 1024;

/// AXI SRAM (not used by the engine; readable during stack scans).
pub const AXISRAM_BASE: u32 = 0x2400_0000;
/// AXI SRAM size.
pub const AXISRAM_SIZE: u32 = 512 * 1024;

/// SysTick reload for [`SYSTICK_HZ`] at [`CORE_CLOCK_HZ`].
pub const SYSTICK_RELOAD: u32 = match systick_reload(CORE_CLOCK_HZ, SYSTICK_HZ) {
    Some(reload) => reload,
    None => 0x00FF_FFFF,
};

/// Words inspected per unwind step when scanning the stack.
pub const MAX_SCAN_WORDS: u32 = 1024;

/// Bytes past the reset handler's address treated as the program entry.
pub const RESET_HANDLER_SPAN: u32 = 0x100;

/// SysTick RVR value for `tick_hz` interrupts at `core_hz`.
///
/// `None` when the period does not fit the 24-bit reload register or the
/// rate is zero.
pub const fn systick_reload(core_hz: u32, tick_hz: u32) -> Option<u32> {
    match core_hz.checked_div(tick_hz) {
        Some(cycles) if cycles <= 0x0100_0000 => cycles.checked_sub(1),
        _ => None,
    }
}

/// Build the `embassy_stm32::Config` used at boot.
///
/// HSI 64 MHz → PLL1 (÷4 ×50 ÷2) → 400 MHz SYSCLK; TIM2 drives embassy-time,
/// which leaves SysTick free for the liveness countdown.
#[cfg(feature = "hardware")]
pub fn build_embassy_config() -> embassy_stm32::Config {
    use embassy_stm32::rcc::*;

    let mut config = embassy_stm32::Config::default();

    // HSI (64 MHz) / prediv(4) = 16 MHz → × mul(50) = 800 MHz VCO
    // PLL1_P = VCO / divp(2) = 400 MHz  → system clock
    config.rcc.hsi = Some(HSIPrescaler::DIV1);
    config.rcc.pll1 = Some(Pll {
        source: PllSource::HSI,
        prediv: PllPreDiv::DIV4,
        mul: PllMul::MUL50,
        divp: Some(PllDiv::DIV2),
        divq: None,
        divr: None,
    });
    config.rcc.sys = Sysclk::PLL1_P; // 400 MHz
    config.rcc.ahb_pre = AHBPrescaler::DIV2; // 200 MHz
    config.rcc.apb1_pre = APBPrescaler::DIV2;
    config.rcc.apb2_pre = APBPrescaler::DIV2;
    config.rcc.apb3_pre = APBPrescaler::DIV2;
    config.rcc.apb4_pre = APBPrescaler::DIV2;
    config.rcc.voltage_scale = VoltageScale::Scale1;
    config
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use postmortem::SLOT_SIZE;

    #[test]
    fn crash_slot_is_sector_aligned() {
        assert_eq!(CRASH_SLOT_OFFSET % FLASH_SECTOR_SIZE, 0);
        assert_eq!(CRASH_SLOT_OFFSET, 0x1E_0000);
    }

    #[test]
    fn crash_slot_fits_in_flash() {
        let end = CRASH_SLOT_OFFSET + u32::try_from(SLOT_SIZE).unwrap();
        assert!(end <= FLASH_SIZE);
    }

    #[test]
    fn program_chunk_is_whole_flash_words() {
        assert_eq!(PROGRAM_CHUNK as u32 % FLASH_WRITE_SIZE, 0);
        assert!(PROGRAM_CHUNK as u32 >= FLASH_WRITE_SIZE);
    }

    #[test]
    fn engine_watches_systick() {
        assert_eq!(ENGINE_CONFIG.watchdog_vector, SYSTICK_VECTOR);
        assert_eq!(ENGINE_CONFIG.hardfault_vector, 3);
        assert_eq!(ENGINE_CONFIG.low_water_bytes, LOW_WATER_BYTES);
    }

    #[test]
    fn systick_reload_fits_24_bits() {
        assert_eq!(systick_reload(CORE_CLOCK_HZ, SYSTICK_HZ), Some(399_999));
        assert_eq!(systick_reload(CORE_CLOCK_HZ, 1), None);
        assert_eq!(systick_reload(CORE_CLOCK_HZ, 0), None);
        assert_eq!(Some(SYSTICK_RELOAD), systick_reload(CORE_CLOCK_HZ, SYSTICK_HZ));
    }
}
