//! Common types shared across components
//!
//! Error taxonomy, the logging sink seam, the bit-field codec and CLI
//! argument definitions.

pub mod bits;
pub mod cli;
pub mod error;
pub mod log;

pub use error::{PacketError, PacketResult};
pub use log::{LogEntry, LogSink, MemorySink, NullSink, Severity, TracingSink};
