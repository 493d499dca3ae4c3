//! Property-based tests for the crash record codec and store.
//! Verifies invariants hold for ALL valid records, not just fixed examples.

#![allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use platform::mocks::MockCrashFlash;
use postmortem::record::bounded_source_name;
use postmortem::{
    CrashStore, FaultCause, FaultRecord, MAX_FRAMES, MAX_STACKTRACE, RECORD_SIZE,
    SOURCE_NAME_CAPACITY,
};
use proptest::prelude::*;

fn any_cause() -> impl Strategy<Value = FaultCause> {
    prop_oneof![
        Just(FaultCause::Unknown),
        Just(FaultCause::Hung),
        Just(FaultCause::HardFault),
        Just(FaultCause::OutOfMemory),
        Just(FaultCause::User),
    ]
}

prop_compose! {
    fn any_record()(
        cause in any_cause(),
        interrupt_context in 0u32..=255,
        registers in proptest::array::uniform16(any::<u32>()),
        status_register in any::<u32>(),
        is_corrupted in any::<bool>(),
        failure_count in any::<u32>(),
        line in any::<u32>(),
        name in "[a-zA-Z0-9_./é]{0,80}",
        depth in 0usize..=MAX_FRAMES,
        addrs in proptest::array::uniform32(1u32..=u32::MAX),
    ) -> FaultRecord {
        let mut stacktrace = [0u32; MAX_STACKTRACE];
        stacktrace[..depth].copy_from_slice(&addrs[..depth]);
        FaultRecord {
            cause,
            interrupt_context,
            registers,
            status_register,
            is_corrupted,
            failure_count,
            line,
            source_name: bounded_source_name(&name),
            stacktrace,
        }
    }
}

proptest! {
    /// decode(encode(r)) == r for every record.
    #[test]
    fn decode_restores_every_field(record in any_record()) {
        let bytes = record.encode();
        prop_assert_eq!(FaultRecord::decode(&bytes).unwrap(), record);
    }

    /// Locations of any length are bounded to 63 bytes of valid UTF-8 and the
    /// terminator byte is always present on disk.
    #[test]
    fn long_locations_are_truncated_with_terminator(name in "\\PC{0,200}") {
        let bounded = bounded_source_name(&name);
        prop_assert!(bounded.len() <= SOURCE_NAME_CAPACITY);
        prop_assert!(name.starts_with(bounded.as_str()));
        let record = FaultRecord {
            cause: FaultCause::User,
            source_name: bounded,
            ..FaultRecord::default()
        };
        let bytes = record.encode();
        prop_assert_eq!(bytes[312 + SOURCE_NAME_CAPACITY], 0);
        prop_assert_eq!(&bytes[376..380], b"End\0");
    }

    /// Corrupting any single byte outside the gating fields (magic, version,
    /// cause) never makes decode fail.
    #[test]
    fn damage_outside_gating_fields_still_decodes(
        record in any_record(),
        offset in 44usize..RECORD_SIZE,
        value in any::<u8>(),
    ) {
        let mut bytes = record.encode();
        bytes[offset] = value;
        prop_assert!(FaultRecord::decode(&bytes).is_ok());
    }

    /// Persisting through the store and loading back yields the same record.
    #[test]
    fn store_round_trip(record in any_record(), chunk in 4usize..=512) {
        let mut store = CrashStore::new(MockCrashFlash::new(), 1024);
        store.persist(&record, chunk).unwrap();
        prop_assert_eq!(store.load().unwrap(), Some(record));
    }
}
