//! Dynap-se configuration event packet
//!
//! A packet is the common header followed by `capacity` records. The header
//! and the record array are owned together and released together; records
//! are only ever reached through the packet.
//!
//! Producer side: allocate, fill records in index order, validate each one as
//! it is finalized. Consumer side: iterate or search. Header counts change
//! only through validate/invalidate, so they always agree with the marks.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use super::event::{DynapseConfigEvent, EventSummary, EVENT_SIZE, EVENT_TS_OFFSET};
use super::header::{EventPacketHeader, HEADER_SIZE};
use super::iter::{Direction, EventIter, EventIterMut, Filter};
use crate::common::{LogSink, PacketError, PacketResult, Severity, TracingSink};

/// Event type ID written into the header of every packet of this kind
pub const DYNAPSE_CONFIG_EVENT_TYPE: i16 = 14;

/// Component tag used for every log line emitted here
pub const LOG_COMPONENT: &str = "DynapseConfig Event";

/// Packet of Dynap-se configuration events
#[derive(Clone)]
pub struct DynapseConfigPacket {
    header: EventPacketHeader,
    events: Box<[DynapseConfigEvent]>,
    log: Arc<dyn LogSink>,
}

impl fmt::Debug for DynapseConfigPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynapseConfigPacket")
            .field("header", &self.header)
            .field("events", &self.events.len())
            .finish()
    }
}

impl PartialEq for DynapseConfigPacket {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.events == other.events
    }
}

impl DynapseConfigPacket {
    /// Allocate a packet that logs through `tracing`
    ///
    /// All records start zeroed, hence invalid; both counts start at zero.
    pub fn allocate(capacity: i32, source: i16, ts_overflow: i32) -> PacketResult<Self> {
        Self::allocate_with_log(capacity, source, ts_overflow, Arc::new(TracingSink))
    }

    /// Allocate a packet that reports conditions to `log`
    pub fn allocate_with_log(
        capacity: i32,
        source: i16,
        ts_overflow: i32,
        log: Arc<dyn LogSink>,
    ) -> PacketResult<Self> {
        if capacity < 0 {
            let err = PacketError::invalid_argument(format!("negative capacity {}", capacity));
            log.log(Severity::Critical, LOG_COMPONENT, &err.to_string());
            return Err(err);
        }
        if ts_overflow < 0 {
            let err =
                PacketError::invalid_argument(format!("negative timestamp overflow {}", ts_overflow));
            log.log(Severity::Critical, LOG_COMPONENT, &err.to_string());
            return Err(err);
        }

        let mut events: Vec<DynapseConfigEvent> = Vec::new();
        if events.try_reserve_exact(capacity as usize).is_err() {
            let err = PacketError::AllocationFailure { capacity };
            log.log(Severity::Critical, LOG_COMPONENT, &err.to_string());
            return Err(err);
        }
        events.resize(capacity as usize, DynapseConfigEvent::default());

        let header = EventPacketHeader::new(
            DYNAPSE_CONFIG_EVENT_TYPE,
            source,
            EVENT_SIZE as i32,
            EVENT_TS_OFFSET as i32,
            ts_overflow,
            capacity,
        );

        Ok(Self {
            header,
            events: events.into_boxed_slice(),
            log,
        })
    }

    pub fn header(&self) -> &EventPacketHeader {
        &self.header
    }

    /// Mutable header access (source and overflow counter only)
    pub fn header_mut(&mut self) -> &mut EventPacketHeader {
        &mut self.header
    }

    pub fn log_sink(&self) -> &Arc<dyn LogSink> {
        &self.log
    }

    pub fn capacity(&self) -> i32 {
        self.header.event_capacity()
    }

    pub fn event_number(&self) -> i32 {
        self.header.event_number()
    }

    pub fn event_valid(&self) -> i32 {
        self.header.event_valid()
    }

    pub fn is_empty(&self) -> bool {
        self.event_number() == 0
    }

    pub fn is_full(&self) -> bool {
        self.event_number() >= self.capacity()
    }

    /// Serialized size: header plus every slot
    pub fn size_in_bytes(&self) -> usize {
        HEADER_SIZE + EVENT_SIZE * self.events.len()
    }

    fn check_index(&self, n: i32, caller: &str) -> Option<usize> {
        if n < 0 || n >= self.capacity() {
            let err = PacketError::IndexOutOfRange {
                index: n,
                capacity: self.capacity(),
            };
            self.log.log(
                Severity::Critical,
                LOG_COMPONENT,
                &format!("Called {}() with {}.", caller, err),
            );
            return None;
        }
        Some(n as usize)
    }

    /// Mutable handle to the record at `n`, anywhere in `[0, capacity)`
    ///
    /// Logs and returns `None` when `n` is out of range.
    pub fn get_event(&mut self, n: i32) -> Option<EventMut<'_>> {
        let index = self.check_index(n, "get_event")?;
        Some(EventMut::new(
            n,
            &mut self.events[index],
            &self.header,
            self.log.as_ref(),
        ))
    }

    /// Read-only record at `n`; logs and returns `None` when out of range
    pub fn get_event_const(&self, n: i32) -> Option<&DynapseConfigEvent> {
        let index = self.check_index(n, "get_event_const")?;
        Some(&self.events[index])
    }

    /// 64-bit timestamp of a record of this packet
    pub fn timestamp64(&self, event: &DynapseConfigEvent) -> i64 {
        event.timestamp64(&self.header)
    }

    /// Validate the record at `n`
    pub fn validate(&mut self, n: i32) -> PacketResult<()> {
        let capacity = self.capacity();
        match self.get_event(n) {
            Some(mut event) => event.validate(),
            None => Err(PacketError::IndexOutOfRange { index: n, capacity }),
        }
    }

    /// Invalidate the record at `n`
    pub fn invalidate(&mut self, n: i32) -> PacketResult<()> {
        let capacity = self.capacity();
        match self.get_event(n) {
            Some(mut event) => event.invalidate(),
            None => Err(PacketError::IndexOutOfRange { index: n, capacity }),
        }
    }

    /// Fill the next unused slot and validate it, returning its index
    pub fn push_event(&mut self, chip_id: u8, data: u32, timestamp: i32) -> PacketResult<i32> {
        let n = self.event_number();
        let capacity = self.capacity();
        if n >= capacity {
            let err = PacketError::CapacityExhausted(capacity);
            self.log.log(Severity::Error, LOG_COMPONENT, &err.to_string());
            return Err(err);
        }
        let mut event = self
            .get_event(n)
            .ok_or(PacketError::IndexOutOfRange { index: n, capacity })?;
        event.set_timestamp(timestamp)?;
        event.set_chip_id(chip_id);
        event.set_data(data);
        event.validate()?;
        Ok(n)
    }

    /// End of the used range, never past the allocated slots
    fn used_len(&self) -> usize {
        (self.event_number().max(0) as usize).min(self.events.len())
    }

    /// Used slots, `[0, event_number)`
    fn used(&self) -> &[DynapseConfigEvent] {
        &self.events[..self.used_len()]
    }

    /// Read-only traversal in the given order
    pub fn iter(&self, direction: Direction, filter: Filter) -> EventIter<'_> {
        EventIter::new(self.used(), direction, filter)
    }

    /// Mutable traversal in the given order
    pub fn iter_mut(&mut self, direction: Direction, filter: Filter) -> EventIterMut<'_> {
        let number = self.used_len();
        EventIterMut::new(
            &mut self.events[..number],
            &self.header,
            self.log.as_ref(),
            direction,
            filter,
        )
    }

    pub fn iter_all(&self) -> EventIter<'_> {
        self.iter(Direction::Forward, Filter::All)
    }

    pub fn iter_valid(&self) -> EventIter<'_> {
        self.iter(Direction::Forward, Filter::ValidOnly)
    }

    pub fn iter_all_rev(&self) -> EventIter<'_> {
        self.iter(Direction::Reverse, Filter::All)
    }

    pub fn iter_valid_rev(&self) -> EventIter<'_> {
        self.iter(Direction::Reverse, Filter::ValidOnly)
    }

    pub fn iter_all_mut(&mut self) -> EventIterMut<'_> {
        self.iter_mut(Direction::Forward, Filter::All)
    }

    pub fn iter_valid_mut(&mut self) -> EventIterMut<'_> {
        self.iter_mut(Direction::Forward, Filter::ValidOnly)
    }

    pub fn iter_all_rev_mut(&mut self) -> EventIterMut<'_> {
        self.iter_mut(Direction::Reverse, Filter::All)
    }

    pub fn iter_valid_rev_mut(&mut self) -> EventIterMut<'_> {
        self.iter_mut(Direction::Reverse, Filter::ValidOnly)
    }

    /// First record (forward order) with the given chip ID, with its index
    pub fn find_by_chip_id(
        &self,
        chip_id: u8,
        filter: Filter,
    ) -> Option<(i32, &DynapseConfigEvent)> {
        self.iter(Direction::Forward, filter)
            .find(|(_, event)| event.chip_id() == chip_id)
    }

    /// Mutable variant of [`find_by_chip_id`](Self::find_by_chip_id)
    pub fn find_by_chip_id_mut(&mut self, chip_id: u8, filter: Filter) -> Option<EventMut<'_>> {
        self.iter_mut(Direction::Forward, filter)
            .find(|event| event.chip_id() == chip_id)
    }

    /// Decoded views of the selected records
    pub fn summaries(&self, direction: Direction, filter: Filter) -> Vec<EventSummary> {
        self.iter(direction, filter)
            .map(|(index, event)| EventSummary::new(index, event, &self.header))
            .collect()
    }

    /// Append header and every slot to `buf`
    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        self.header.write_to(buf);
        for event in self.events.iter() {
            event.write_to(buf);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size_in_bytes());
        self.write_to(&mut buf);
        buf
    }

    /// Decode a packet that logs through `tracing`
    pub fn from_bytes(data: &[u8]) -> PacketResult<Self> {
        Self::from_bytes_with_log(data, Arc::new(TracingSink))
    }

    /// Decode a packet, checking layout fields and mark-bit consistency
    pub fn from_bytes_with_log(data: &[u8], log: Arc<dyn LogSink>) -> PacketResult<Self> {
        let header = EventPacketHeader::from_bytes(data)?;

        if header.event_type() != DYNAPSE_CONFIG_EVENT_TYPE {
            return Err(PacketError::decode(format!(
                "event type {} is not a Dynap-se configuration packet",
                header.event_type()
            )));
        }
        if header.event_size() != EVENT_SIZE as i32
            || header.event_ts_offset() != EVENT_TS_OFFSET as i32
        {
            return Err(PacketError::decode(format!(
                "unexpected record layout (size {}, timestamp offset {})",
                header.event_size(),
                header.event_ts_offset()
            )));
        }

        let capacity = header.event_capacity() as usize;
        let expected = HEADER_SIZE + EVENT_SIZE * capacity;
        if data.len() < expected {
            return Err(PacketError::decode(format!(
                "packet needs {} bytes, got {}",
                expected,
                data.len()
            )));
        }

        let mut events: Vec<DynapseConfigEvent> = Vec::new();
        if events.try_reserve_exact(capacity).is_err() {
            return Err(PacketError::AllocationFailure {
                capacity: header.event_capacity(),
            });
        }
        let mut buf = &data[HEADER_SIZE..expected];
        while buf.has_remaining() {
            events.push(DynapseConfigEvent::read_from(&mut buf)?);
        }

        let number = header.event_number() as usize;
        let marked = events[..number].iter().filter(|e| e.is_valid()).count();
        if marked != header.event_valid() as usize {
            return Err(PacketError::decode(format!(
                "valid count {} does not match {} marked events",
                header.event_valid(),
                marked
            )));
        }
        if let Some(pos) = events[number..].iter().position(|e| e.is_valid()) {
            return Err(PacketError::decode(format!(
                "event {} beyond event number {} is marked valid",
                number + pos,
                number
            )));
        }
        if let Some(pos) = events[..number].iter().position(|e| e.timestamp() < 0) {
            return Err(PacketError::decode(format!(
                "event {} has a negative timestamp",
                pos
            )));
        }

        Ok(Self {
            header,
            events: events.into_boxed_slice(),
            log,
        })
    }
}

/// Mutable handle to one record of a packet
///
/// Reads go through `Deref`. Writes go through the methods below so that
/// misuse is reported to the packet's log sink.
pub struct EventMut<'a> {
    index: i32,
    event: &'a mut DynapseConfigEvent,
    header: &'a EventPacketHeader,
    log: &'a dyn LogSink,
}

impl<'a> EventMut<'a> {
    pub(crate) fn new(
        index: i32,
        event: &'a mut DynapseConfigEvent,
        header: &'a EventPacketHeader,
        log: &'a dyn LogSink,
    ) -> Self {
        Self {
            index,
            event,
            header,
            log,
        }
    }

    /// Index of this record within its packet
    pub fn index(&self) -> i32 {
        self.index
    }

    /// 64-bit timestamp using the owning packet's overflow counter
    pub fn timestamp64(&self) -> i64 {
        self.event.timestamp64(self.header)
    }

    /// Set the 32-bit timestamp; negative values are logged and skipped
    pub fn set_timestamp(&mut self, timestamp: i32) -> PacketResult<()> {
        let result = self.event.set_timestamp(timestamp);
        if result.is_err() {
            self.log.log(
                Severity::Critical,
                LOG_COMPONENT,
                "Called set_timestamp() with negative value!",
            );
        }
        result
    }

    pub fn set_data(&mut self, data: u32) {
        self.event.set_data(data);
    }

    pub fn set_chip_id(&mut self, chip_id: u8) {
        self.event.set_chip_id(chip_id);
    }

    /// Invalid → Valid
    ///
    /// Validating the first unused slot extends `event_number`; re-validating
    /// a used slot only raises `event_valid`. On an already valid record
    /// nothing changes and `AlreadyValid` is returned. Slots past the first
    /// unused one are refused with `OutOfOrder`, since records fill in order.
    pub fn validate(&mut self) -> PacketResult<()> {
        if self.event.is_valid() {
            self.log.log(
                Severity::Critical,
                LOG_COMPONENT,
                "Called validate() on already valid event.",
            );
            return Err(PacketError::AlreadyValid(self.index));
        }
        let event_number = self.header.event_number();
        if self.index > event_number {
            let err = PacketError::OutOfOrder {
                index: self.index,
                event_number,
            };
            self.log.log(
                Severity::Critical,
                LOG_COMPONENT,
                &format!("Called validate() with {}.", err),
            );
            return Err(err);
        }
        self.event.mark_valid();
        self.header.record_validated(self.index);
        Ok(())
    }

    /// Valid → Invalid, decrementing only the valid count
    ///
    /// On an already invalid record nothing changes and `AlreadyInvalid` is returned.
    pub fn invalidate(&mut self) -> PacketResult<()> {
        if !self.event.is_valid() {
            self.log.log(
                Severity::Critical,
                LOG_COMPONENT,
                "Called invalidate() on already invalid event.",
            );
            return Err(PacketError::AlreadyInvalid(self.index));
        }
        self.event.mark_invalid();
        self.header.record_invalidated();
        Ok(())
    }

    /// Decoded view of this record
    pub fn summary(&self) -> EventSummary {
        EventSummary::new(self.index, self.event, self.header)
    }
}

impl Deref for EventMut<'_> {
    type Target = DynapseConfigEvent;

    fn deref(&self) -> &Self::Target {
        self.event
    }
}
