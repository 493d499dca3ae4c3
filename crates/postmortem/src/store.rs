//! Persistent crash-record slot on NOR flash.
//!
//! One record lives at a fixed, erase-aligned offset. Writes follow the NOR
//! discipline: every erase block the record spans is erased, then the
//! record is programmed forward in chunks, each committed by the driver
//! before the next begins. Reads never erase or program.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use crate::cause::FaultCause;
use crate::record::{FaultRecord, RECORD_SIZE};

/// Bytes reserved for the record slot (record plus program-unit padding).
pub const SLOT_SIZE: usize = 512;

/// Program image of the record being persisted. Static so the fault path,
/// which may already be short of stack, does not carry it.
static SCRATCH: Mutex<RefCell<[u8; SLOT_SIZE]>> = Mutex::new(RefCell::new([0xFF; SLOT_SIZE]));

/// Crash store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError<E> {
    /// The flash driver reported an error.
    Flash(E),
    /// Slot offset is not aligned to the erase block size.
    Misaligned,
    /// The slot does not fit inside the device.
    OutOfBounds,
    /// The flash program unit does not fit the slot.
    Geometry,
    /// Another persist is still using the program image.
    Busy,
}

impl<E> From<E> for StoreError<E> {
    fn from(e: E) -> Self {
        Self::Flash(e)
    }
}

impl<E: NorFlashError> core::fmt::Display for StoreError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Flash(e) => match e.kind() {
                NorFlashErrorKind::NotAligned => write!(f, "flash access not aligned"),
                NorFlashErrorKind::OutOfBounds => write!(f, "flash access out of bounds"),
                _ => write!(f, "flash operation failed"),
            },
            Self::Misaligned => write!(f, "crash slot not erase-aligned"),
            Self::OutOfBounds => write!(f, "crash slot exceeds flash capacity"),
            Self::Geometry => write!(f, "flash program unit larger than crash slot"),
            Self::Busy => write!(f, "crash slot program image in use"),
        }
    }
}

/// The crash-record slot.
pub struct CrashStore<F> {
    flash: F,
    offset: u32,
}

impl<F> CrashStore<F> {
    /// Slot at `offset` bytes into `flash`.
    pub const fn new(flash: F, offset: u32) -> Self {
        Self { flash, offset }
    }

    /// Slot offset.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Underlying flash.
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Underlying flash, mutably.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Release the flash.
    pub fn into_inner(self) -> F {
        self.flash
    }
}

impl<F: ReadNorFlash> CrashStore<F> {
    /// Raw slot contents.
    pub fn read_raw(&mut self) -> Result<[u8; RECORD_SIZE], StoreError<F::Error>> {
        let mut buf = [0u8; RECORD_SIZE];
        self.flash.read(self.offset, &mut buf)?;
        Ok(buf)
    }

    /// The persisted fault, if the slot holds a valid one.
    ///
    /// Erased, zeroed, foreign and `None`-cause slots all read as `Ok(None)`.
    pub fn load(&mut self) -> Result<Option<FaultRecord>, StoreError<F::Error>> {
        let raw = self.read_raw()?;
        match FaultRecord::decode(&raw) {
            Ok(record) if record.cause != FaultCause::None => Ok(Some(record)),
            Ok(_) => Ok(None),
            Err(_e) => {
                #[cfg(feature = "defmt")]
                defmt::debug!("crash store: no valid record ({})", _e);
                Ok(None)
            }
        }
    }

    /// Failure count of the persisted record, 0 when there is none.
    pub fn previous_failure_count(&mut self) -> u32 {
        match self.load() {
            Ok(Some(record)) => record.failure_count,
            _ => 0,
        }
    }
}

impl<F: NorFlash> CrashStore<F> {
    /// Overwrite the slot with `record`.
    ///
    /// `program_chunk` is the number of bytes handed to each program call;
    /// it is rounded down to the flash write size (and never below it).
    ///
    /// # Errors
    ///
    /// Geometry errors are reported before the flash is touched. The program
    /// image is built in a static buffer inside a critical section, so a
    /// nested persist gets [`StoreError::Busy`]. A flash error mid-way leaves
    /// the slot partially erased or programmed; it is not retried.
    pub fn persist(
        &mut self,
        record: &FaultRecord,
        program_chunk: usize,
    ) -> Result<(), StoreError<F::Error>> {
        let erase_size = u32::try_from(F::ERASE_SIZE).map_err(|_| StoreError::Geometry)?;
        if self.offset.checked_rem(erase_size) != Some(0) {
            return Err(StoreError::Misaligned);
        }
        let write_size = F::WRITE_SIZE.max(1);
        let image_len = round_up(RECORD_SIZE, write_size).ok_or(StoreError::Geometry)?;
        if image_len > SLOT_SIZE {
            return Err(StoreError::Geometry);
        }
        let image_len_u32 = u32::try_from(image_len).map_err(|_| StoreError::Geometry)?;
        let erase_end = self
            .offset
            .checked_add(image_len_u32)
            .and_then(|end| round_up_u32(end, erase_size))
            .ok_or(StoreError::OutOfBounds)?;
        if usize::try_from(erase_end).map_or(true, |end| end > self.flash.capacity()) {
            return Err(StoreError::OutOfBounds);
        }

        let chunk = program_chunk
            .checked_div(write_size)
            .unwrap_or(1)
            .max(1)
            .saturating_mul(write_size);

        critical_section::with(|cs| -> Result<(), StoreError<F::Error>> {
            let mut scratch = SCRATCH
                .borrow(cs)
                .try_borrow_mut()
                .map_err(|_| StoreError::Busy)?;
            scratch.fill(0xFF);
            let encoded: &mut [u8; RECORD_SIZE] = scratch
                .get_mut(..RECORD_SIZE)
                .and_then(|dst| dst.try_into().ok())
                .ok_or(StoreError::Geometry)?;
            record.encode_into(encoded);
            let image = scratch.get(..image_len).ok_or(StoreError::Geometry)?;

            #[cfg(feature = "defmt")]
            defmt::debug!(
                "crash store: erase {=u32:#x}..{=u32:#x}",
                self.offset,
                erase_end
            );
            self.flash.erase(self.offset, erase_end)?;

            let mut at = self.offset;
            for piece in image.chunks(chunk) {
                self.flash.write(at, piece)?;
                let len = u32::try_from(piece.len()).map_err(|_| StoreError::Geometry)?;
                at = at.checked_add(len).ok_or(StoreError::OutOfBounds)?;
            }
            Ok(())
        })
    }
}

fn round_up(value: usize, unit: usize) -> Option<usize> {
    let rem = value.checked_rem(unit)?;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(unit.checked_sub(rem)?)
    }
}

fn round_up_u32(value: u32, unit: u32) -> Option<u32> {
    let rem = value.checked_rem(unit)?;
    if rem == 0 {
        Some(value)
    } else {
        value.checked_add(unit.checked_sub(rem)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::record::bounded_source_name;
    use platform::mocks::{FlashOp, MockCrashFlash, MockFlash, MockFlashError};

    fn record(count: u32) -> FaultRecord {
        FaultRecord {
            cause: FaultCause::User,
            failure_count: count,
            line: 42,
            source_name: bounded_source_name("main"),
            ..FaultRecord::default()
        }
    }

    #[test]
    fn erased_slot_loads_none() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 1024);
        assert_eq!(store.load().unwrap(), None);
        assert_eq!(store.previous_failure_count(), 0);
    }

    #[test]
    fn zeroed_slot_loads_none() {
        let mut store = CrashStore::new(MockCrashFlash::zeroed(), 0);
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn persist_then_load() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 1024);
        store.persist(&record(3), 256).unwrap();
        assert_eq!(store.load().unwrap(), Some(record(3)));
        assert_eq!(store.previous_failure_count(), 3);
    }

    #[test]
    fn erase_precedes_forward_chunked_program() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 1024);
        store.persist(&record(1), 128).unwrap();
        assert_eq!(
            store.flash().ops(),
            &[
                FlashOp::Erase { from: 1024, to: 2048 },
                FlashOp::Write { offset: 1024, len: 128 },
                FlashOp::Write { offset: 1152, len: 128 },
                FlashOp::Write { offset: 1280, len: 124 },
            ]
        );
    }

    #[test]
    fn overwrite_requires_and_gets_erase() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 0);
        store.persist(&record(1), 256).unwrap();
        store.persist(&record(2), 256).unwrap();
        assert_eq!(store.previous_failure_count(), 2);
        assert_eq!(store.flash().erase_count(), 2);
    }

    #[test]
    fn record_spanning_two_erase_blocks_erases_both() {
        let mut store = CrashStore::new(MockFlash::<1024, 4, 256>::new(), 256);
        store.persist(&record(1), 64).unwrap();
        assert_eq!(store.flash().ops()[0], FlashOp::Erase { from: 256, to: 768 });
    }

    #[test]
    fn wide_program_unit_pads_with_erased_bytes() {
        let mut store = CrashStore::new(MockFlash::<4096, 32, 1024>::new(), 0);
        store.persist(&record(1), 100).unwrap();
        // 380 -> 384 bytes, chunk 100 -> 96
        let lens: Vec<usize> = store
            .flash()
            .ops()
            .iter()
            .filter_map(|op| match op {
                FlashOp::Write { len, .. } => Some(*len),
                FlashOp::Erase { .. } => None,
            })
            .collect();
        assert_eq!(lens, vec![96, 96, 96, 96]);
        assert!(store.flash().bytes()[380..384].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn misaligned_slot_is_rejected_before_erasing() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 100);
        assert_eq!(store.persist(&record(1), 256), Err(StoreError::Misaligned));
        assert!(store.flash().ops().is_empty());
    }

    #[test]
    fn slot_past_end_is_rejected() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 4096);
        assert_eq!(store.persist(&record(1), 256), Err(StoreError::OutOfBounds));
    }

    #[test]
    fn flash_error_is_surfaced() {
        let mut flash = MockCrashFlash::new();
        flash.fail_after_writes(1);
        let mut store = CrashStore::new(flash, 0);
        assert_eq!(
            store.persist(&record(1), 128),
            Err(StoreError::Flash(MockFlashError::Injected))
        );

        // The program image is released on the error path.
        let mut fresh = CrashStore::new(MockCrashFlash::new(), 0);
        fresh.persist(&record(2), 128).unwrap();
        assert_eq!(fresh.previous_failure_count(), 2);
    }

    #[test]
    fn nested_persist_is_busy_and_leaves_flash_alone() {
        let mut store = CrashStore::new(MockCrashFlash::new(), 0);
        critical_section::with(|cs| {
            let _held = SCRATCH.borrow(cs).borrow_mut();
            assert_eq!(store.persist(&record(1), 256), Err(StoreError::Busy));
        });
        assert!(store.flash().ops().is_empty());
        store.persist(&record(1), 256).unwrap();
        assert_eq!(store.load().unwrap(), Some(record(1)));
    }
}
