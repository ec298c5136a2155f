//! Common event packet header
//!
//! Layout on the wire (28 bytes, little-endian):
//! ```text
//! ┌────────┬──────────────────┬──────┐
//! │ offset │ field            │ type │
//! ├────────┼──────────────────┼──────┤
//! │ 0      │ event type       │ i16  │
//! │ 2      │ event source     │ i16  │
//! │ 4      │ event size       │ i32  │
//! │ 8      │ timestamp offset │ i32  │
//! │ 12     │ ts overflow      │ i32  │
//! │ 16     │ event capacity   │ i32  │
//! │ 20     │ event number     │ i32  │
//! │ 24     │ event valid      │ i32  │
//! └────────┴──────────────────┴──────┘
//! ```
//!
//! The two counts live in `Cell`s so that a record handle holding a shared
//! header reference can still validate and invalidate. This makes the header
//! (and every packet) `!Sync`, which matches the single-threaded contract.

use std::cell::Cell;

use bytes::{Buf, BufMut};

use crate::common::{PacketError, PacketResult};

/// Size of the serialized header in bytes
pub const HEADER_SIZE: usize = 28;

/// Width of the in-record timestamp; the overflow counter starts above it
pub const TS_OVERFLOW_SHIFT: u32 = 31;

/// Event packet header shared by all event kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPacketHeader {
    event_type: i16,
    event_source: i16,
    event_size: i32,
    event_ts_offset: i32,
    event_ts_overflow: i32,
    event_capacity: i32,
    event_number: Cell<i32>,
    event_valid: Cell<i32>,
}

impl EventPacketHeader {
    /// Create a header with zeroed counts
    pub(crate) fn new(
        event_type: i16,
        event_source: i16,
        event_size: i32,
        event_ts_offset: i32,
        event_ts_overflow: i32,
        event_capacity: i32,
    ) -> Self {
        Self {
            event_type,
            event_source,
            event_size,
            event_ts_offset,
            event_ts_overflow,
            event_capacity,
            event_number: Cell::new(0),
            event_valid: Cell::new(0),
        }
    }

    pub fn event_type(&self) -> i16 {
        self.event_type
    }

    pub fn event_source(&self) -> i16 {
        self.event_source
    }

    pub fn set_event_source(&mut self, source: i16) {
        self.event_source = source;
    }

    /// Bytes per record
    pub fn event_size(&self) -> i32 {
        self.event_size
    }

    /// Byte offset of the timestamp inside a record
    pub fn event_ts_offset(&self) -> i32 {
        self.event_ts_offset
    }

    pub fn event_ts_overflow(&self) -> i32 {
        self.event_ts_overflow
    }

    /// Set the timestamp overflow counter; negative values are rejected
    pub fn set_event_ts_overflow(&mut self, overflow: i32) -> PacketResult<()> {
        if overflow < 0 {
            return Err(PacketError::invalid_argument(format!(
                "negative timestamp overflow {}",
                overflow
            )));
        }
        self.event_ts_overflow = overflow;
        Ok(())
    }

    /// Maximum number of records, fixed at allocation
    pub fn event_capacity(&self) -> i32 {
        self.event_capacity
    }

    /// Number of leading slots that have ever been validated
    pub fn event_number(&self) -> i32 {
        self.event_number.get()
    }

    /// Number of currently valid records
    pub fn event_valid(&self) -> i32 {
        self.event_valid.get()
    }

    /// Count a newly validated record at `index`
    ///
    /// `event_number` only grows when the record is the first unused slot,
    /// and never past the capacity.
    pub(crate) fn record_validated(&self, index: i32) {
        let number = self.event_number.get();
        if index >= number {
            self.event_number
                .set(index.saturating_add(1).min(self.event_capacity));
        }
        let valid = self.event_valid.get().saturating_add(1);
        self.event_valid.set(valid.min(self.event_number.get()));
    }

    /// Count a newly invalidated record; `event_number` is never decremented
    pub(crate) fn record_invalidated(&self) {
        self.event_valid.set(self.event_valid.get() - 1);
    }

    /// Serialize to the 28-byte wire layout
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_i16_le(self.event_type);
        buf.put_i16_le(self.event_source);
        buf.put_i32_le(self.event_size);
        buf.put_i32_le(self.event_ts_offset);
        buf.put_i32_le(self.event_ts_overflow);
        buf.put_i32_le(self.event_capacity);
        buf.put_i32_le(self.event_number.get());
        buf.put_i32_le(self.event_valid.get());
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut slice = &mut out[..];
        self.write_to(&mut slice);
        out
    }

    /// Deserialize from the wire layout, checking the count invariants
    ///
    /// Record layout fields (type, size, timestamp offset) are checked by the
    /// packet type that owns the header.
    pub fn from_bytes(data: &[u8]) -> PacketResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(PacketError::decode(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                data.len()
            )));
        }

        let mut buf = &data[..HEADER_SIZE];
        let event_type = buf.get_i16_le();
        let event_source = buf.get_i16_le();
        let event_size = buf.get_i32_le();
        let event_ts_offset = buf.get_i32_le();
        let event_ts_overflow = buf.get_i32_le();
        let event_capacity = buf.get_i32_le();
        let event_number = buf.get_i32_le();
        let event_valid = buf.get_i32_le();

        if event_capacity < 0 {
            return Err(PacketError::decode(format!(
                "negative event capacity {}",
                event_capacity
            )));
        }
        if event_ts_overflow < 0 {
            return Err(PacketError::decode(format!(
                "negative timestamp overflow {}",
                event_ts_overflow
            )));
        }
        if event_number < 0 || event_number > event_capacity {
            return Err(PacketError::decode(format!(
                "event number {} outside [0, {}]",
                event_number, event_capacity
            )));
        }
        if event_valid < 0 || event_valid > event_number {
            return Err(PacketError::decode(format!(
                "valid count {} outside [0, {}]",
                event_valid, event_number
            )));
        }

        Ok(Self {
            event_type,
            event_source,
            event_size,
            event_ts_offset,
            event_ts_overflow,
            event_capacity,
            event_number: Cell::new(event_number),
            event_valid: Cell::new(event_valid),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventPacketHeader {
        EventPacketHeader::new(7, 3, 9, 5, 2, 16)
    }

    #[test]
    fn test_new_header_counts_zeroed() {
        let header = sample();
        assert_eq!(header.event_number(), 0);
        assert_eq!(header.event_valid(), 0);
        assert_eq!(header.event_capacity(), 16);
    }

    #[test]
    fn test_validate_invalidate_counts() {
        let header = sample();
        header.record_validated(0);
        header.record_validated(1);
        header.record_invalidated();
        assert_eq!(header.event_number(), 2);
        assert_eq!(header.event_valid(), 1);

        // Re-validating a used slot only restores the valid count
        header.record_validated(0);
        assert_eq!(header.event_number(), 2);
        assert_eq!(header.event_valid(), 2);
    }

    #[test]
    fn test_record_validated_stays_within_capacity() {
        let header = EventPacketHeader::new(7, 3, 9, 5, 2, 1);
        header.record_validated(0);
        header.record_invalidated();
        header.record_validated(0);
        header.record_validated(5);
        assert_eq!(header.event_number(), 1);
        assert_eq!(header.event_valid(), 1);
    }

    #[test]
    fn test_header_layout() {
        let header = sample();
        header.record_validated(0);
        let bytes = header.to_bytes();

        assert_eq!(&bytes[0..2], &7i16.to_le_bytes());
        assert_eq!(&bytes[2..4], &3i16.to_le_bytes());
        assert_eq!(&bytes[4..8], &9i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &5i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &2i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &16i32.to_le_bytes());
        assert_eq!(&bytes[20..24], &1i32.to_le_bytes());
        assert_eq!(&bytes[24..28], &1i32.to_le_bytes());

        let restored = EventPacketHeader::from_bytes(&bytes).unwrap();
        assert_eq!(restored, header);
    }

    #[test]
    fn test_header_too_short() {
        let result = EventPacketHeader::from_bytes(&[0u8; 10]);
        assert!(matches!(result, Err(PacketError::Decode(_))));
    }

    #[test]
    fn test_header_rejects_count_violations() {
        let header = sample();
        let mut bytes = header.to_bytes();

        // event_number > capacity
        bytes[20..24].copy_from_slice(&17i32.to_le_bytes());
        assert!(EventPacketHeader::from_bytes(&bytes).is_err());

        // event_valid > event_number
        bytes[20..24].copy_from_slice(&2i32.to_le_bytes());
        bytes[24..28].copy_from_slice(&3i32.to_le_bytes());
        assert!(EventPacketHeader::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_set_ts_overflow_rejects_negative() {
        let mut header = sample();
        assert!(header.set_event_ts_overflow(-1).is_err());
        assert_eq!(header.event_ts_overflow(), 2);
        header.set_event_ts_overflow(10).unwrap();
        assert_eq!(header.event_ts_overflow(), 10);
    }
}
