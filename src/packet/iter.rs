//! Traversal of a packet's active event range
//!
//! One pair of iterator types covers all four orders: forward or reverse,
//! over every used slot or over valid ones only. The range `[0, event_number)`
//! is captured when the iterator is created; filtering happens while walking.

use std::iter::{Enumerate, FusedIterator};
use std::slice::{Iter, IterMut};

use super::dynapse_config::EventMut;
use super::event::DynapseConfigEvent;
use super::header::EventPacketHeader;
use crate::common::LogSink;

/// Traversal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// Which used slots are yielded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    /// Every slot below `event_number`, valid or not
    #[default]
    All,
    /// Only slots whose valid mark is set
    ValidOnly,
}

impl Filter {
    #[inline]
    fn accepts(self, event: &DynapseConfigEvent) -> bool {
        match self {
            Filter::All => true,
            Filter::ValidOnly => event.is_valid(),
        }
    }
}

/// Read-only iterator yielding `(index, &event)`
#[derive(Debug, Clone)]
pub struct EventIter<'a> {
    inner: Enumerate<Iter<'a, DynapseConfigEvent>>,
    direction: Direction,
    filter: Filter,
}

impl<'a> EventIter<'a> {
    pub(crate) fn new(events: &'a [DynapseConfigEvent], direction: Direction, filter: Filter) -> Self {
        Self {
            inner: events.iter().enumerate(),
            direction,
            filter,
        }
    }
}

impl<'a> Iterator for EventIter<'a> {
    type Item = (i32, &'a DynapseConfigEvent);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, event) = match self.direction {
                Direction::Forward => self.inner.next()?,
                Direction::Reverse => self.inner.next_back()?,
            };
            if self.filter.accepts(event) {
                return Some((index as i32, event));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (_, upper) = self.inner.size_hint();
        match self.filter {
            Filter::All => (upper.unwrap_or(0), upper),
            Filter::ValidOnly => (0, upper),
        }
    }
}

impl FusedIterator for EventIter<'_> {}

/// Mutable iterator yielding [`EventMut`] handles
///
/// Each handle can change fields and validate or invalidate its record; the
/// traversal range does not change when it does.
pub struct EventIterMut<'a> {
    inner: Enumerate<IterMut<'a, DynapseConfigEvent>>,
    header: &'a EventPacketHeader,
    log: &'a dyn LogSink,
    direction: Direction,
    filter: Filter,
}

impl<'a> EventIterMut<'a> {
    pub(crate) fn new(
        events: &'a mut [DynapseConfigEvent],
        header: &'a EventPacketHeader,
        log: &'a dyn LogSink,
        direction: Direction,
        filter: Filter,
    ) -> Self {
        Self {
            inner: events.iter_mut().enumerate(),
            header,
            log,
            direction,
            filter,
        }
    }
}

impl<'a> Iterator for EventIterMut<'a> {
    type Item = EventMut<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (index, event) = match self.direction {
                Direction::Forward => self.inner.next()?,
                Direction::Reverse => self.inner.next_back()?,
            };
            if self.filter.accepts(event) {
                return Some(EventMut::new(index as i32, event, self.header, self.log));
            }
        }
    }
}

impl FusedIterator for EventIterMut<'_> {}
