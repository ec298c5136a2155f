//! Dynap-se configuration acknowledgement event record
//!
//! Memory layout is packed and matches the wire layout:
//! ```text
//! ┌────────┬───────────┬──────┬──────────────────────────────────────┐
//! │ offset │ field     │ type │ bits                                 │
//! ├────────┼───────────┼──────┼──────────────────────────────────────┤
//! │ 0      │ data      │ u32  │ 0 = valid mark, 1-31 = payload       │
//! │ 4      │ chipid    │ u8   │ 0-3 = chip ID, 4-7 reserved          │
//! │ 5      │ timestamp │ i32  │ microseconds, sign bit reserved      │
//! └────────┴───────────┴──────┴──────────────────────────────────────┘
//! ```
//! Multi-byte fields are stored little-endian in memory as well, so a slice
//! of records is byte-identical to what goes on the wire.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::header::{EventPacketHeader, TS_OVERFLOW_SHIFT};
use crate::common::bits::layout;
use crate::common::{PacketError, PacketResult};

/// Size of one serialized record in bytes
pub const EVENT_SIZE: usize = 9;

/// Byte offset of the timestamp inside a record
pub const EVENT_TS_OFFSET: usize = 5;

/// One configuration acknowledgement event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C, packed)]
pub struct DynapseConfigEvent {
    /// Valid mark and payload, little-endian
    data: u32,
    /// Chip ID in the low nibble
    chipid: u8,
    /// Microsecond timestamp, little-endian
    timestamp: i32,
}

// Compile-time size check: the record must be exactly 9 bytes
const _: () = assert!(
    std::mem::size_of::<DynapseConfigEvent>() == EVENT_SIZE,
    "DynapseConfigEvent must be 9 bytes"
);

impl DynapseConfigEvent {
    /// Build an (invalid) record from field values, truncated to field width
    pub fn new(chip_id: u8, data: u32, timestamp: i32) -> PacketResult<Self> {
        let mut event = Self::default();
        event.set_chip_id(chip_id);
        event.set_data(data);
        event.set_timestamp(timestamp)?;
        Ok(event)
    }

    #[inline]
    fn data_word(&self) -> u32 {
        u32::from_le(self.data)
    }

    #[inline]
    fn set_data_word(&mut self, word: u32) {
        self.data = word.to_le();
    }

    /// True if the valid mark is set
    #[inline]
    pub fn is_valid(&self) -> bool {
        layout::VALID_MARK.get(self.data_word()) == 1
    }

    pub(crate) fn mark_valid(&mut self) {
        self.set_data_word(layout::VALID_MARK.set(self.data_word(), 1));
    }

    pub(crate) fn mark_invalid(&mut self) {
        self.set_data_word(layout::VALID_MARK.clear(self.data_word()));
    }

    /// 32-bit microsecond timestamp
    ///
    /// Wraps around; use [`timestamp64`](Self::timestamp64) for a monotonic value.
    #[inline]
    pub fn timestamp(&self) -> i32 {
        i32::from_le(self.timestamp)
    }

    /// 64-bit microsecond timestamp, using the packet's overflow counter
    pub fn timestamp64(&self, header: &EventPacketHeader) -> i64 {
        let overflow = header.event_ts_overflow() as u32 as u64;
        let timestamp = self.timestamp() as u32 as u64;
        ((overflow << TS_OVERFLOW_SHIFT) | timestamp) as i64
    }

    /// Set the 32-bit timestamp; negative values would use the reserved bit
    ///
    /// On error the stored timestamp is left untouched.
    pub fn set_timestamp(&mut self, timestamp: i32) -> PacketResult<()> {
        if timestamp < 0 {
            return Err(PacketError::NegativeTimestamp(timestamp));
        }
        self.timestamp = timestamp.to_le();
        Ok(())
    }

    /// 31-bit payload; meaning depends on the configuration command
    #[inline]
    pub fn data(&self) -> u32 {
        layout::DATA.get(self.data_word())
    }

    pub fn set_data(&mut self, data: u32) {
        self.set_data_word(layout::DATA.set(self.data_word(), data));
    }

    #[inline]
    pub fn chip_id(&self) -> u8 {
        layout::CHIP_ID.get(self.chipid)
    }

    pub fn set_chip_id(&mut self, chip_id: u8) {
        self.chipid = layout::CHIP_ID.set(self.chipid, chip_id);
    }

    /// Append the wire representation to `buf`
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.data_word());
        buf.put_u8(self.chipid);
        buf.put_i32_le(self.timestamp());
    }

    pub fn to_bytes(&self) -> [u8; EVENT_SIZE] {
        let mut out = [0u8; EVENT_SIZE];
        let mut slice = &mut out[..];
        self.write_to(&mut slice);
        out
    }

    /// Read one record from the front of `buf`
    ///
    /// Bytes are taken verbatim, including reserved bits.
    pub fn read_from<B: Buf>(buf: &mut B) -> PacketResult<Self> {
        if buf.remaining() < EVENT_SIZE {
            return Err(PacketError::decode(format!(
                "event needs {} bytes, got {}",
                EVENT_SIZE,
                buf.remaining()
            )));
        }
        let mut raw = [0u8; EVENT_SIZE];
        buf.copy_to_slice(&mut raw);
        Ok(Self::from_bytes(&raw))
    }

    pub fn from_bytes(data: &[u8; EVENT_SIZE]) -> Self {
        let mut buf = &data[..];
        Self {
            data: buf.get_u32_le().to_le(),
            chipid: buf.get_u8(),
            timestamp: buf.get_i32_le().to_le(),
        }
    }
}

/// Decoded view of one record for display and JSON output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Index within the packet
    pub index: i32,
    pub chip_id: u8,
    pub data: u32,
    /// 32-bit timestamp (µs)
    pub timestamp: i32,
    /// Overflow-corrected timestamp (µs)
    pub timestamp64: i64,
    pub valid: bool,
}

impl EventSummary {
    pub fn new(index: i32, event: &DynapseConfigEvent, header: &EventPacketHeader) -> Self {
        Self {
            index,
            chip_id: event.chip_id(),
            data: event.data(),
            timestamp: event.timestamp(),
            timestamp64: event.timestamp64(header),
            valid: event.is_valid(),
        }
    }

    /// Format for display
    pub fn display(&self) -> String {
        format!(
            "#{:<6} Chip:{:2} Data:0x{:08x} T:{:10}us T64:{:16}us{}",
            self.index,
            self.chip_id,
            self.data,
            self.timestamp,
            self.timestamp64,
            if self.valid { "" } else { " [INVALID]" }
        )
    }
}

impl std::fmt::Display for EventSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_overflow(overflow: i32) -> EventPacketHeader {
        EventPacketHeader::new(0, 0, EVENT_SIZE as i32, EVENT_TS_OFFSET as i32, overflow, 1)
    }

    #[test]
    fn test_default_is_invalid_and_zero() {
        let event = DynapseConfigEvent::default();
        assert!(!event.is_valid());
        assert_eq!(event.data(), 0);
        assert_eq!(event.chip_id(), 0);
        assert_eq!(event.timestamp(), 0);
    }

    #[test]
    fn test_field_accessors() {
        let mut event = DynapseConfigEvent::new(5, 0x1234, 1000).unwrap();
        assert_eq!(event.chip_id(), 5);
        assert_eq!(event.data(), 0x1234);
        assert_eq!(event.timestamp(), 1000);

        event.set_chip_id(0x1A);
        assert_eq!(event.chip_id(), 0x0A);

        event.set_data(0xFFFF_FFFF);
        assert_eq!(event.data(), layout::DATA_MAX);
        assert!(!event.is_valid());
    }

    #[test]
    fn test_mark_does_not_touch_payload() {
        let mut event = DynapseConfigEvent::new(2, 7, 0).unwrap();
        event.mark_valid();
        assert!(event.is_valid());
        assert_eq!(event.data(), 7);
        event.mark_invalid();
        assert!(!event.is_valid());
        assert_eq!(event.data(), 7);
    }

    #[test]
    fn test_set_data_preserves_valid_mark() {
        let mut event = DynapseConfigEvent::default();
        event.mark_valid();
        event.set_data(99);
        assert!(event.is_valid());
        assert_eq!(event.data(), 99);
    }

    #[test]
    fn test_negative_timestamp_rejected() {
        let mut event = DynapseConfigEvent::new(0, 0, 42).unwrap();
        let result = event.set_timestamp(-1);
        assert!(matches!(result, Err(PacketError::NegativeTimestamp(-1))));
        assert_eq!(event.timestamp(), 42);
        assert!(DynapseConfigEvent::new(0, 0, i32::MIN).is_err());
    }

    #[test]
    fn test_timestamp64() {
        let event = DynapseConfigEvent::new(0, 0, 0x7FFF_FFFF).unwrap();
        assert_eq!(event.timestamp64(&header_with_overflow(0)), 0x7FFF_FFFF);
        assert_eq!(event.timestamp64(&header_with_overflow(1)), 0xFFFF_FFFF);

        let event = DynapseConfigEvent::new(0, 0, 5).unwrap();
        assert_eq!(event.timestamp64(&header_with_overflow(3)), (3i64 << 31) | 5);
        assert_eq!(
            event.timestamp64(&header_with_overflow(i32::MAX)),
            ((i32::MAX as i64) << 31) | 5
        );
    }

    #[test]
    fn test_wire_layout() {
        let mut event = DynapseConfigEvent::new(0x0C, 0x0102_0304, 0x0A0B_0C0D).unwrap();
        event.mark_valid();
        let bytes = event.to_bytes();

        let data_word = (0x0102_0304u32 << 1) | 1;
        assert_eq!(&bytes[0..4], &data_word.to_le_bytes());
        assert_eq!(bytes[4], 0x0C);
        assert_eq!(&bytes[EVENT_TS_OFFSET..], &0x0A0B_0C0Di32.to_le_bytes());

        assert_eq!(DynapseConfigEvent::from_bytes(&bytes), event);
    }

    #[test]
    fn test_reserved_chip_bits_survive_decode() {
        let bytes = [0, 0, 0, 0, 0xF3, 0, 0, 0, 0];
        let event = DynapseConfigEvent::from_bytes(&bytes);
        assert_eq!(event.chip_id(), 3);
        assert_eq!(event.to_bytes(), bytes);
    }

    #[test]
    fn test_read_from_short_buffer() {
        let data = [0u8; 4];
        let mut buf = &data[..];
        assert!(DynapseConfigEvent::read_from(&mut buf).is_err());
    }

    #[test]
    fn test_summary_json() {
        let mut event = DynapseConfigEvent::new(2, 7, 100).unwrap();
        event.mark_valid();
        let summary = EventSummary::new(4, &event, &header_with_overflow(1));
        assert_eq!(summary.timestamp64, (1i64 << 31) | 100);

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"chip_id\":2"));
        assert!(json.contains("\"valid\":true"));
        let restored: EventSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, summary);
        assert!(!summary.display().contains("INVALID"));
    }
}
