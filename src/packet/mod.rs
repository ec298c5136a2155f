//! Event packet layout and access protocol
//!
//! Converts between the packed wire layout and typed, bounds-checked access.

pub mod dynapse_config;
pub mod event;
pub mod header;
pub mod iter;

pub use dynapse_config::{DynapseConfigPacket, EventMut, DYNAPSE_CONFIG_EVENT_TYPE, LOG_COMPONENT};
pub use event::{DynapseConfigEvent, EventSummary, EVENT_SIZE, EVENT_TS_OFFSET};
pub use header::{EventPacketHeader, HEADER_SIZE, TS_OVERFLOW_SHIFT};
pub use iter::{Direction, EventIter, EventIterMut, Filter};
