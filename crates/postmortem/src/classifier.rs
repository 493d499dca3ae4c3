//! Fault classification and capture.
//!
//! ```text
//! Idle ──entry──▶ Dispatching ──registers + backtrace──▶ Captured ──persist, callback──▶ Terminal (reset)
//! ```
//!
//! Everything downstream of an entry runs in fault context with interrupts
//! masked and the liveness countdown stopped. [`FaultHandler::handle`] never
//! returns; [`FaultHandler::capture`] stops short of the callback and reset
//! so host tests can inspect the outcome.

use embedded_storage::nor_flash::NorFlash;
use platform::{CapturedContext, CountdownTimer, SystemControl};

use crate::cause::FaultCause;
use crate::context::FaultContext;
use crate::liveness::EarlyWarning;
use crate::record::{bounded_source_name, FaultRecord, SourceName};
use crate::store::{CrashStore, StoreError};
use crate::unwind::{capture_current, capture_exception, ContextProvider};

/// Classifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultState {
    /// No fault in progress.
    #[default]
    Idle,
    /// Entry accepted, liveness stopped; gathering state.
    Dispatching,
    /// Record assembled and handed to the store.
    Captured,
    /// Callback done; reset requested.
    Terminal,
}

/// How the fault path was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultEntry {
    /// Synchronous software panic. `cause: None` lets the active vector decide.
    Panic {
        /// Explicit cause; wins over the vector when present.
        cause: Option<FaultCause>,
    },
    /// Hardware exception with the interrupted code's registers.
    Exception(CapturedContext),
}

impl FaultEntry {
    /// Panic with an explicit cause.
    pub const fn panic(cause: FaultCause) -> Self {
        Self::Panic { cause: Some(cause) }
    }
}

/// Result of a capture that did not reset (host inspection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture<E> {
    /// The assembled record.
    pub record: FaultRecord,
    /// Whether it reached flash.
    pub persisted: Result<(), StoreError<E>>,
}

/// Owns the collaborators the fault path drives.
pub struct FaultHandler<F, T, U, S> {
    store: CrashStore<F>,
    timer: T,
    unwinder: U,
    system: S,
    state: FaultState,
}

impl<F, T, U, S> FaultHandler<F, T, U, S>
where
    F: NorFlash,
    T: CountdownTimer,
    U: ContextProvider,
    S: SystemControl,
{
    /// Assemble a handler.
    pub fn new(store: CrashStore<F>, timer: T, unwinder: U, system: S) -> Self {
        Self {
            store,
            timer,
            unwinder,
            system,
            state: FaultState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> FaultState {
        self.state
    }

    /// Crash store (query after a host-side capture).
    pub fn store_mut(&mut self) -> &mut CrashStore<F> {
        &mut self.store
    }

    /// Liveness countdown.
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Unwind context provider.
    pub fn unwinder(&self) -> &U {
        &self.unwinder
    }

    /// System control.
    pub fn system(&self) -> &S {
        &self.system
    }

    /// Gather, classify and persist a fault without running the callback
    /// or resetting.
    pub fn capture(&mut self, ctx: &FaultContext, entry: FaultEntry) -> Capture<F::Error> {
        // Idle -> Dispatching
        self.system.disable_interrupts();
        ctx.liveness().disarm(&mut self.timer);
        self.state = FaultState::Dispatching;

        let mut record = FaultRecord::default();
        let explicit = match entry {
            FaultEntry::Panic { cause } => {
                record.interrupt_context = self.system.active_vector();
                let trace = capture_current(&mut self.unwinder);
                record.stacktrace = trace.to_padded();
                cause
            }
            FaultEntry::Exception(captured) => {
                record.interrupt_context = captured.vector;
                if captured.vector != 0 {
                    record.registers = captured.registers;
                    record.status_register = captured.xpsr;
                }
                let trace = capture_exception(&mut self.unwinder, &captured);
                record.stacktrace = trace.to_padded();
                None
            }
        };
        record.cause = resolve_cause(ctx, explicit, record.interrupt_context);

        let checkpoint = ctx.checkpoint();
        record.is_corrupted = checkpoint.write_in_progress;
        if record.is_corrupted {
            record.line = 0;
            record.source_name = SourceName::new();
        } else {
            record.line = checkpoint.line;
            record.source_name = bounded_source_name(checkpoint.location);
        }

        record.failure_count = self.store.previous_failure_count().saturating_add(1);

        #[cfg(feature = "defmt")]
        defmt::error!(
            "fault: {} vector {} failure #{}",
            record.cause,
            record.interrupt_context,
            record.failure_count
        );

        let persisted = self.store.persist(&record, ctx.config().program_chunk);
        self.state = FaultState::Captured;
        Capture { record, persisted }
    }

    /// Full fault path: capture, run the callback, reset.
    ///
    /// A fault that arrives while another capture is in progress resets
    /// immediately without touching flash again.
    pub fn handle(&mut self, ctx: &FaultContext, entry: FaultEntry) -> ! {
        if !ctx.begin_capture() {
            #[cfg(feature = "defmt")]
            defmt::error!("fault: reentrant fault during capture, resetting");
            self.system.disable_interrupts();
            self.state = FaultState::Terminal;
            self.system.system_reset();
        }
        let _capture = self.capture(ctx, entry);
        #[cfg(feature = "defmt")]
        {
            if _capture.persisted.is_err() {
                defmt::error!("fault: record not persisted");
            }
        }
        if let Some(callback) = ctx.fault_callback() {
            callback();
        }
        self.state = FaultState::Terminal;
        self.system.system_reset()
    }

    /// Liveness countdown expiry.
    ///
    /// Returns when the program checkpointed in time (or the monitor is not
    /// armed); otherwise captures a `Hung` fault and resets.
    pub fn on_early_warning(&mut self, ctx: &FaultContext, captured: &CapturedContext) -> EarlyWarning {
        match ctx.liveness().on_early_warning(&mut self.timer) {
            EarlyWarning::Hung => self.handle(ctx, FaultEntry::Exception(*captured)),
            outcome => outcome,
        }
    }
}

/// Explicit cause wins; otherwise the active vector decides.
fn resolve_cause(ctx: &FaultContext, explicit: Option<FaultCause>, vector: u32) -> FaultCause {
    match explicit {
        Some(cause) if cause != FaultCause::None => cause,
        _ if vector != 0 && vector == ctx.config().watchdog_vector => FaultCause::Hung,
        _ if vector != 0 && vector == ctx.config().hardfault_vector => FaultCause::HardFault,
        _ => FaultCause::Unknown,
    }
}
