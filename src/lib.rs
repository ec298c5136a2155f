//! DYNAPSE-EVENTS: Packed event packets for Dynap-se configuration events
//!
//! This crate provides the binary packet layout shared between the device
//! readout and its consumers: bounds-checked record access, validity
//! bookkeeping, overflow-corrected timestamps and ordered traversal.

pub mod common;
pub mod config;
pub mod emulator;
pub mod packet;
pub mod recorder;

pub use packet::{
    Direction, DynapseConfigEvent, DynapseConfigPacket, EventMut, EventPacketHeader, Filter,
};
