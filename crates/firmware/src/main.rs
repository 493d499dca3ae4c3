//! Postmortem demo firmware - Main Entry Point
//!
//! Hardware-only entry point for STM32H743ZI. Reports the previous fault (if
//! any) over RTT, then checkpoints from a periodic loop under a 1 s liveness
//! timeout.

#![no_std]
#![no_main]

use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use firmware::{checkpoint, engine, FAULTS};
use postmortem::{did_fault, get_fault, render_report};

/// Checkpoint interval of the demo loop; well inside the early warning.
const LOOP_PERIOD_MS: u64 = 100;

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    defmt::info!("postmortem demo v{=str}", env!("CARGO_PKG_VERSION"));
    let p = embassy_stm32::init(firmware::boot::build_embassy_config());

    let Some(core) = cortex_m::Peripherals::take() else {
        defmt::error!("core peripherals already taken; fault capture disabled");
        return;
    };
    engine::install(p.FLASH, core.SYST);

    let previous = engine::with_store(|store| did_fault(store).then(|| get_fault(store))).flatten();
    if let Some(record) = previous {
        let mut report: heapless::String<1536> = heapless::String::new();
        if render_report(&record, &mut report).is_ok() {
            defmt::warn!("previous fault:\n{=str}", report.as_str());
        } else {
            defmt::warn!("previous fault: {}", record);
        }
    } else {
        defmt::info!("no fault recorded since programming");
    }

    FAULTS.set_fault_callback(on_fault);
    engine::start_liveness(firmware::DEFAULT_TIMEOUT);
    defmt::info!(
        "liveness armed: timeout={=u32}ms",
        firmware::DEFAULT_TIMEOUT.period_ms()
    );

    let mut iterations: u32 = 0;
    loop {
        checkpoint!();
        Timer::after(Duration::from_millis(LOOP_PERIOD_MS)).await;
        iterations = iterations.wrapping_add(1);
        if iterations.trailing_zeros() >= 6 {
            defmt::info!("alive after {=u32} checkpoints", iterations);
        }
    }
}

/// Runs after the record is written, before reset.
fn on_fault() {
    defmt::error!("fault recorded; resetting");
}
