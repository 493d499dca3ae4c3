//! SysTick countdown driving the engine's liveness decisions on the host.
//!
//! Run with: cargo test -p firmware --test liveness_countdown

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::panic::{catch_unwind, AssertUnwindSafe};

use firmware::{TickCountdown, ENGINE_CONFIG};
use platform::mocks::{MockCrashFlash, MockMemory, MockSystem, RESET_PANIC};
use platform::{CapturedContext, WatchdogTimeout};
use postmortem::{
    get_fault, ContextProvider, CrashStore, EarlyWarning, FaultCause, FaultContext, FaultHandler,
    Seed, UnwindCursor,
};

struct NoTables;
struct Never;

impl UnwindCursor for Never {
    fn ip(&self) -> u32 {
        0
    }
    fn return_address(&self) -> u32 {
        0
    }
    fn set_return_address(&mut self, _: u32) {}
    fn at_entry_point(&self) -> bool {
        true
    }
    fn step(&mut self) -> bool {
        false
    }
}

impl ContextProvider for NoTables {
    type Cursor = Never;
    fn cursor_from(&mut self, _: Seed) -> Option<Never> {
        None
    }
    fn cursor_here(&mut self) -> Option<Never> {
        None
    }
}

type Handler = FaultHandler<MockCrashFlash, TickCountdown, NoTables, MockSystem>;

fn handler() -> Handler {
    FaultHandler::new(
        CrashStore::new(MockCrashFlash::new(), 0),
        TickCountdown::new(),
        NoTables,
        MockSystem::in_exception(15),
    )
}

fn systick_context() -> CapturedContext {
    let mut ctx = CapturedContext {
        vector: 15,
        ..CapturedContext::default()
    };
    ctx.registers[15] = 0x0800_2000;
    ctx
}

/// One SysTick interrupt, as `engine::early_warning` runs it.
fn systick(h: &mut Handler, ctx: &FaultContext) -> Option<EarlyWarning> {
    if h.timer_mut().tick() {
        Some(h.on_early_warning(ctx, &systick_context()))
    } else {
        None
    }
}

#[test]
fn regular_checkpoints_are_fed_every_half_period() {
    let ctx = FaultContext::new(ENGINE_CONFIG);
    let mem = MockMemory::default();
    let mut h = handler();
    ctx.start_liveness_monitor(h.timer_mut(), WatchdogTimeout::Ms500);

    let mut fed = 0;
    for ms in 1..=2_000u32 {
        if ms % 100 == 0 {
            ctx.mark(ms, "loop", &mem).unwrap();
        }
        match systick(&mut h, &ctx) {
            Some(EarlyWarning::Fed) => fed += 1,
            Some(other) => panic!("unexpected {other:?} at {ms} ms"),
            None => {}
        }
    }
    // 250 ms early warning over 2 s.
    assert_eq!(fed, 8);
    assert!(!postmortem::did_fault(h.store_mut()));
}

#[test]
fn stalled_loop_hangs_at_first_unfed_warning() {
    let ctx = FaultContext::new(ENGINE_CONFIG);
    let mem = MockMemory::default();
    let mut h = handler();
    ctx.start_liveness_monitor(h.timer_mut(), WatchdogTimeout::Ms250);
    ctx.mark(12, "worker", &mem).unwrap();

    // First warning at 125 ms consumes the checkpoint.
    for _ in 0..124 {
        assert_eq!(systick(&mut h, &ctx), None);
    }
    assert_eq!(systick(&mut h, &ctx), Some(EarlyWarning::Fed));

    // Nothing checkpoints again: the next warning records a hang.
    for _ in 0..124 {
        assert_eq!(systick(&mut h, &ctx), None);
    }
    let err = catch_unwind(AssertUnwindSafe(|| systick(&mut h, &ctx))).unwrap_err();
    assert_eq!(err.downcast_ref::<String>().unwrap(), RESET_PANIC);
    assert!(!h.timer_mut().is_running());

    let rec = get_fault(h.store_mut());
    assert_eq!(rec.cause, FaultCause::Hung);
    assert_eq!(rec.interrupt_context, 15);
    assert_eq!(rec.registers[15], 0x0800_2000);
    assert_eq!(rec.line, 12);
    assert_eq!(rec.source_name, "worker");
}

#[test]
fn stopped_monitor_never_hangs() {
    let ctx = FaultContext::new(ENGINE_CONFIG);
    let mut h = handler();
    ctx.start_liveness_monitor(h.timer_mut(), WatchdogTimeout::Ms8);
    ctx.stop_liveness_monitor(h.timer_mut());
    for _ in 0..100 {
        assert_eq!(systick(&mut h, &ctx), None);
    }
}
