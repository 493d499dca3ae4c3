//! Crash record and its persisted byte layout.
//!
//! All multi-byte integers are little-endian and 4-byte aligned. Every field
//! group is preceded by a NUL-terminated ASCII marker so a raw hex dump of the
//! slot stays readable even when fields are damaged. Markers are written but
//! not checked on decode; only the magic, version and cause gate a record.
//!
//! Layout (380 bytes):
//! ```text
//! [0..4]     magic            u32 = 0xFEFE2A2A
//! [4..28]    marker           "Postmortem Record Here:\0"
//! [28..32]   version          u32 = 1
//! [32..40]   marker           "Caused:\0"
//! [40..44]   cause            u32 (FaultCause code)
//! [44..52]   marker           "Vector:\0"
//! [52..56]   interrupt ctx    u32 (active exception number, 0 = thread mode)
//! [56..64]   marker           "Traced:\0"
//! [64..192]  stacktrace       [u32; 32], zero-padded
//! [192..200] marker           "Regdmp:\0"
//! [200..264] registers        [u32; 16] (r0..r15)
//! [264..268] xPSR             u32
//! [268..276] marker           "Corrupt\0"
//! [276..280] is_corrupted     u32 (0/1)
//! [280..288] marker           "Fail #:\0"
//! [288..292] failure_count    u32
//! [292..300] marker           "Line #:\0"
//! [300..304] line             u32
//! [304..312] marker           "Source:\0"
//! [312..376] source name      63 bytes + NUL
//! [376..380] marker           "End\0"
//! ```

use crate::cause::FaultCause;
use crate::config::{MAX_STACKTRACE, RECORD_VERSION, SOURCE_NAME_CAPACITY};
use platform::REGISTER_COUNT;

/// Leading magic value of a persisted record.
pub const RECORD_MAGIC: u32 = 0xFEFE_2A2A;

/// Encoded size of a record in bytes.
pub const RECORD_SIZE: usize = 380;

/// Marker following the magic; also used to locate records in raw dumps.
pub const HEADER_MARKER: &[u8; 24] = b"Postmortem Record Here:\0";

const OFF_MAGIC: usize = 0;
const OFF_HEADER: usize = 4;
const OFF_VERSION: usize = 28;
const OFF_CAUSE_MARK: usize = 32;
const OFF_CAUSE: usize = 40;
const OFF_VECTOR_MARK: usize = 44;
const OFF_VECTOR: usize = 52;
const OFF_TRACE_MARK: usize = 56;
const OFF_TRACE: usize = 64;
const OFF_REGS_MARK: usize = 192;
const OFF_REGS: usize = 200;
const OFF_XPSR: usize = 264;
const OFF_CORRUPT_MARK: usize = 268;
const OFF_CORRUPT: usize = 276;
const OFF_FAILS_MARK: usize = 280;
const OFF_FAILS: usize = 288;
const OFF_LINE_MARK: usize = 292;
const OFF_LINE: usize = 300;
const OFF_SOURCE_MARK: usize = 304;
const OFF_SOURCE: usize = 312;
const OFF_END: usize = 376;

const SOURCE_FIELD_BYTES: usize = SOURCE_NAME_CAPACITY + 1;

/// Bounded checkpoint location stored in a record.
pub type SourceName = heapless::String<SOURCE_NAME_CAPACITY>;

/// Why a stored byte image was not accepted as a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecordError {
    /// Buffer shorter than [`RECORD_SIZE`].
    Truncated,
    /// Magic value absent (erased, zeroed or foreign data).
    BadMagic,
    /// Written by an incompatible layout version.
    UnsupportedVersion(u32),
    /// Cause code this build does not know.
    UnknownCause(u32),
}

impl core::fmt::Display for RecordError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "crash record truncated"),
            Self::BadMagic => write!(f, "crash record magic missing"),
            Self::UnsupportedVersion(v) => write!(f, "crash record version {v} unsupported"),
            Self::UnknownCause(c) => write!(f, "crash record cause {c} unknown"),
        }
    }
}

/// Everything captured about one fault.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FaultRecord {
    /// Why the device went down.
    pub cause: FaultCause,
    /// Exception number active at capture, 0 for thread mode.
    pub interrupt_context: u32,
    /// r0–r15 of the interrupted code; zero unless `interrupt_context != 0`.
    pub registers: [u32; REGISTER_COUNT],
    /// xPSR of the interrupted code.
    pub status_register: u32,
    /// The checkpoint was being written when the fault hit.
    pub is_corrupted: bool,
    /// Faults since the image was programmed, including this one.
    pub failure_count: u32,
    /// Last checkpoint line.
    pub line: u32,
    /// Last checkpoint location; empty when corrupted.
    ///
    /// Stored NUL-terminated, so anything from the first NUL on is dropped
    /// by [`encode`](Self::encode). [`bounded_source_name`] never yields one.
    pub source_name: SourceName,
    /// Return addresses, most recent first, zero-padded.
    pub stacktrace: [u32; MAX_STACKTRACE],
}

impl FaultRecord {
    /// Stacktrace entries up to (not including) the first zero.
    pub fn trace(&self) -> &[u32] {
        let end = self
            .stacktrace
            .iter()
            .position(|&a| a == 0)
            .unwrap_or(MAX_STACKTRACE);
        self.stacktrace.get(..end).unwrap_or(&[])
    }

    /// Whether `registers`/`status_register` carry captured state.
    pub fn has_register_context(&self) -> bool {
        self.interrupt_context != 0
    }

    /// Serialise into the persisted layout.
    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Serialise into `buf`, overwriting every byte.
    ///
    /// # Safety (lint allow)
    /// All offsets are layout constants inside `[0, RECORD_SIZE)`.
    #[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
    pub fn encode_into(&self, buf: &mut [u8; RECORD_SIZE]) {
        buf.fill(0);
        put_u32(buf, OFF_MAGIC, RECORD_MAGIC);
        buf[OFF_HEADER..OFF_HEADER + HEADER_MARKER.len()].copy_from_slice(HEADER_MARKER);
        put_u32(buf, OFF_VERSION, RECORD_VERSION);

        put_marker(buf, OFF_CAUSE_MARK, b"Caused:\0");
        put_u32(buf, OFF_CAUSE, self.cause.code());
        put_marker(buf, OFF_VECTOR_MARK, b"Vector:\0");
        put_u32(buf, OFF_VECTOR, self.interrupt_context);

        put_marker(buf, OFF_TRACE_MARK, b"Traced:\0");
        for (i, addr) in self.stacktrace.iter().enumerate() {
            put_u32(buf, OFF_TRACE + i * 4, *addr);
        }

        put_marker(buf, OFF_REGS_MARK, b"Regdmp:\0");
        for (i, reg) in self.registers.iter().enumerate() {
            put_u32(buf, OFF_REGS + i * 4, *reg);
        }
        put_u32(buf, OFF_XPSR, self.status_register);

        put_marker(buf, OFF_CORRUPT_MARK, b"Corrupt\0");
        put_u32(buf, OFF_CORRUPT, u32::from(self.is_corrupted));
        put_marker(buf, OFF_FAILS_MARK, b"Fail #:\0");
        put_u32(buf, OFF_FAILS, self.failure_count);
        put_marker(buf, OFF_LINE_MARK, b"Line #:\0");
        put_u32(buf, OFF_LINE, self.line);

        put_marker(buf, OFF_SOURCE_MARK, b"Source:\0");
        let name = self.source_name.as_bytes();
        let len = name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name.len())
            .min(SOURCE_NAME_CAPACITY);
        buf[OFF_SOURCE..OFF_SOURCE + len].copy_from_slice(&name[..len]);
        // Trailing bytes (including the terminator) are already zero.

        buf[OFF_END..OFF_END + 4].copy_from_slice(b"End\0");
    }

    /// Parse a persisted record.
    ///
    /// Accepts any buffer of at least [`RECORD_SIZE`] bytes; trailing bytes
    /// are ignored.
    ///
    /// # Errors
    ///
    /// [`RecordError::Truncated`] if the buffer is short,
    /// [`RecordError::BadMagic`] if the slot never held a record,
    /// [`RecordError::UnsupportedVersion`] for a foreign layout and
    /// [`RecordError::UnknownCause`] for an unrecognised cause code.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let buf: &[u8; RECORD_SIZE] = bytes
            .get(..RECORD_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or(RecordError::Truncated)?;
        if get_u32(buf, OFF_MAGIC) != RECORD_MAGIC {
            return Err(RecordError::BadMagic);
        }
        let version = get_u32(buf, OFF_VERSION);
        if version != RECORD_VERSION {
            return Err(RecordError::UnsupportedVersion(version));
        }
        let code = get_u32(buf, OFF_CAUSE);
        let cause = FaultCause::from_code(code).ok_or(RecordError::UnknownCause(code))?;

        let mut stacktrace = [0u32; MAX_STACKTRACE];
        for (i, slot) in stacktrace.iter_mut().enumerate() {
            *slot = get_u32(buf, word_offset(OFF_TRACE, i));
        }
        let mut registers = [0u32; REGISTER_COUNT];
        for (i, slot) in registers.iter_mut().enumerate() {
            *slot = get_u32(buf, word_offset(OFF_REGS, i));
        }

        Ok(Self {
            cause,
            interrupt_context: get_u32(buf, OFF_VECTOR),
            registers,
            status_register: get_u32(buf, OFF_XPSR),
            is_corrupted: get_u32(buf, OFF_CORRUPT) != 0,
            failure_count: get_u32(buf, OFF_FAILS),
            line: get_u32(buf, OFF_LINE),
            source_name: decode_source(buf),
            stacktrace,
        })
    }
}

/// Bound a checkpoint location to the record's source-name capacity.
///
/// The result stops at the first NUL and is cut back to a character
/// boundary so it never splits a UTF-8 sequence.
pub fn bounded_source_name(location: &str) -> SourceName {
    let location = location.split('\0').next().unwrap_or("");
    let mut end = location.len().min(SOURCE_NAME_CAPACITY);
    while !location.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    let mut name = SourceName::new();
    let _ = name.push_str(location.get(..end).unwrap_or(""));
    name
}

/// Offset of the first record header in a raw memory dump, if any.
///
/// Records are word-aligned, so only 4-byte aligned offsets are probed.
pub fn find_record(dump: &[u8]) -> Option<usize> {
    let magic = RECORD_MAGIC.to_le_bytes();
    (0..dump.len()).step_by(4).find(|&off| {
        let header = dump.get(off..).unwrap_or(&[]);
        header.get(..4) == Some(&magic[..])
            && header.get(OFF_HEADER..OFF_HEADER.saturating_add(HEADER_MARKER.len()))
                == Some(&HEADER_MARKER[..])
    })
}

fn word_offset(base: usize, index: usize) -> usize {
    base.saturating_add(index.saturating_mul(4))
}

fn put_u32(buf: &mut [u8; RECORD_SIZE], offset: usize, value: u32) {
    if let Some(dst) = buf.get_mut(offset..offset.saturating_add(4)) {
        dst.copy_from_slice(&value.to_le_bytes());
    }
}

fn put_marker(buf: &mut [u8; RECORD_SIZE], offset: usize, marker: &[u8; 8]) {
    if let Some(dst) = buf.get_mut(offset..offset.saturating_add(marker.len())) {
        dst.copy_from_slice(marker);
    }
}

fn get_u32(buf: &[u8; RECORD_SIZE], offset: usize) -> u32 {
    buf.get(offset..offset.saturating_add(4))
        .and_then(|b| b.try_into().ok())
        .map_or(0, u32::from_le_bytes)
}

fn decode_source(buf: &[u8; RECORD_SIZE]) -> SourceName {
    let field = buf
        .get(OFF_SOURCE..OFF_SOURCE.saturating_add(SOURCE_FIELD_BYTES))
        .unwrap_or(&[]);
    let end = field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(SOURCE_NAME_CAPACITY)
        .min(SOURCE_NAME_CAPACITY);
    let raw = field.get(..end).unwrap_or(&[]);
    // A damaged name keeps its longest valid UTF-8 prefix.
    let text = match core::str::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => raw
            .get(..e.valid_up_to())
            .and_then(|p| core::str::from_utf8(p).ok())
            .unwrap_or(""),
    };
    bounded_source_name(text)
}

#[cfg(feature = "defmt")]
impl defmt::Format for FaultRecord {
    fn format(&self, f: defmt::Formatter<'_>) {
        defmt::write!(
            f,
            "fault cause={} vector={} corrupted={} failures={} line={} source={=str}",
            self.cause,
            self.interrupt_context,
            self.is_corrupted,
            self.failure_count,
            self.line,
            self.source_name.as_str()
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn sample() -> FaultRecord {
        let mut stacktrace = [0u32; MAX_STACKTRACE];
        stacktrace[0] = 0x0800_1234;
        stacktrace[1] = 0x0800_0F00;
        FaultRecord {
            cause: FaultCause::HardFault,
            interrupt_context: 3,
            registers: core::array::from_fn(|i| u32::try_from(i).unwrap() * 0x11),
            status_register: 0x6100_0003,
            is_corrupted: false,
            failure_count: 4,
            line: 118,
            source_name: bounded_source_name("sensor.rs"),
            stacktrace,
        }
    }

    #[test]
    fn markers_land_at_their_offsets() {
        let buf = sample().encode();
        assert_eq!(&buf[0..4], &RECORD_MAGIC.to_le_bytes());
        assert_eq!(&buf[4..28], HEADER_MARKER);
        assert_eq!(&buf[32..40], b"Caused:\0");
        assert_eq!(&buf[56..64], b"Traced:\0");
        assert_eq!(&buf[192..200], b"Regdmp:\0");
        assert_eq!(&buf[280..288], b"Fail #:\0");
        assert_eq!(&buf[304..312], b"Source:\0");
        assert_eq!(&buf[376..380], b"End\0");
    }

    #[test]
    fn fields_land_at_their_offsets() {
        let buf = sample().encode();
        assert_eq!(&buf[28..32], &1u32.to_le_bytes());
        assert_eq!(&buf[40..44], &3u32.to_le_bytes());
        assert_eq!(&buf[64..68], &0x0800_1234u32.to_le_bytes());
        assert_eq!(&buf[288..292], &4u32.to_le_bytes());
        assert_eq!(&buf[300..304], &118u32.to_le_bytes());
        assert_eq!(&buf[312..321], b"sensor.rs");
        assert_eq!(buf[321], 0);
    }

    #[test]
    fn decode_restores_record() {
        let rec = sample();
        assert_eq!(FaultRecord::decode(&rec.encode()).unwrap(), rec);
    }

    #[test]
    fn erased_and_zeroed_slots_have_no_magic() {
        assert_eq!(
            FaultRecord::decode(&[0xFF; RECORD_SIZE]),
            Err(RecordError::BadMagic)
        );
        assert_eq!(
            FaultRecord::decode(&[0; RECORD_SIZE]),
            Err(RecordError::BadMagic)
        );
    }

    #[test]
    fn foreign_version_is_rejected() {
        let mut buf = sample().encode();
        buf[28..32].copy_from_slice(&2u32.to_le_bytes());
        assert_eq!(
            FaultRecord::decode(&buf),
            Err(RecordError::UnsupportedVersion(2))
        );
    }

    #[test]
    fn unknown_cause_is_rejected() {
        let mut buf = sample().encode();
        buf[40..44].copy_from_slice(&9u32.to_le_bytes());
        assert_eq!(FaultRecord::decode(&buf), Err(RecordError::UnknownCause(9)));
    }

    #[test]
    fn short_buffer_is_truncated() {
        let buf = sample().encode();
        assert_eq!(
            FaultRecord::decode(&buf[..RECORD_SIZE - 1]),
            Err(RecordError::Truncated)
        );
    }

    #[test]
    fn torn_marker_does_not_reject_record() {
        let mut buf = sample().encode();
        buf[192..200].fill(0xFF);
        assert_eq!(FaultRecord::decode(&buf).unwrap().failure_count, 4);
    }

    #[test]
    fn damaged_source_keeps_valid_prefix() {
        let mut buf = sample().encode();
        buf[315] = 0xFF;
        assert_eq!(FaultRecord::decode(&buf).unwrap().source_name, "sen");
    }

    #[test]
    fn source_without_terminator_is_bounded() {
        let mut buf = sample().encode();
        buf[312..376].fill(b'a');
        let rec = FaultRecord::decode(&buf).unwrap();
        assert_eq!(rec.source_name.len(), SOURCE_NAME_CAPACITY);
    }

    #[test]
    fn bounded_name_cuts_at_nul_and_char_boundary() {
        assert_eq!(bounded_source_name("main\0junk"), "main");
        let long = "é".repeat(40);
        let name = bounded_source_name(&long);
        assert_eq!(name.len(), 62);
        assert!(name.chars().all(|c| c == 'é'));
    }

    #[test]
    fn interior_nul_in_source_is_stored_as_terminator() {
        let mut rec = sample();
        rec.source_name = SourceName::try_from("main\0junk").unwrap();
        let buf = rec.encode();
        assert_eq!(&buf[312..317], b"main\0");
        assert!(buf[317..376].iter().all(|&b| b == 0));
        assert_eq!(FaultRecord::decode(&buf).unwrap().source_name, "main");
    }

    #[test]
    fn encode_into_overwrites_stale_bytes() {
        let mut buf = [0xAA; RECORD_SIZE];
        sample().encode_into(&mut buf);
        assert_eq!(buf, sample().encode());
    }

    #[test]
    fn trace_stops_at_first_zero() {
        let mut rec = sample();
        rec.stacktrace[3] = 0x0800_4444;
        assert_eq!(rec.trace(), &[0x0800_1234, 0x0800_0F00]);
    }

    #[test]
    fn find_record_in_dump() {
        let mut dump = vec![0xAAu8; 1024];
        dump[516..516 + RECORD_SIZE].copy_from_slice(&sample().encode());
        assert_eq!(find_record(&dump), Some(516));
        assert_eq!(find_record(&[0u8; 64]), None);
    }
}
