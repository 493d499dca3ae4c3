//! Post-reboot queries.
//!
//! Pure reads of the crash slot. Safe before the liveness monitor or the
//! checkpoint ledger are set up, and at any time afterwards.

use embedded_storage::nor_flash::ReadNorFlash;

use crate::cause::FaultCause;
use crate::record::FaultRecord;
use crate::store::CrashStore;

/// Whether a fault has been persisted since the image was programmed.
///
/// A slot that cannot be read counts as no fault.
pub fn did_fault<F: ReadNorFlash>(store: &mut CrashStore<F>) -> bool {
    get_fault(store).cause != FaultCause::None
}

/// The persisted fault, or an all-zero `None` record.
pub fn get_fault<F: ReadNorFlash>(store: &mut CrashStore<F>) -> FaultRecord {
    match store.load() {
        Ok(Some(record)) => record,
        _ => FaultRecord::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RECORD_SIZE;
    use platform::mocks::MockCrashFlash;

    #[test]
    fn fresh_device_reports_no_fault() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 0);
        assert!(!did_fault(&mut store));
        assert_eq!(get_fault(&mut store), FaultRecord::default());
        assert_eq!(get_fault(&mut store).cause, FaultCause::None);
    }

    #[test]
    fn queries_do_not_touch_flash() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 0);
        let _ = did_fault(&mut store);
        let _ = get_fault(&mut store);
        assert!(store.flash().ops().is_empty());
    }

    #[test]
    fn persisted_fault_is_reported() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 0);
        let record = FaultRecord {
            cause: FaultCause::Hung,
            failure_count: 1,
            ..FaultRecord::default()
        };
        assert!(store.persist(&record, 64).is_ok());
        assert!(did_fault(&mut store));
        assert_eq!(get_fault(&mut store), record);
    }

    #[test]
    fn garbage_slot_reads_as_no_fault() {
        let mut flash = MockCrashFlash::new();
        if let Some(slot) = flash.bytes_mut().get_mut(..RECORD_SIZE) {
            slot.fill(0x5A);
        }
        let mut store = CrashStore::new(flash, 0);
        assert!(!did_fault(&mut store));
    }
}
