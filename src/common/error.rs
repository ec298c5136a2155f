//! Error types for event packet operations
//!
//! # Design Principles (KISS)
//! - Every precondition failure is a typed variant, never a panic
//! - Packet operations log the condition AND return it; callers may ignore it
//! - Use thiserror for ergonomic error handling

use thiserror::Error;

/// Conditions raised by packet, record and stream operations
#[derive(Error, Debug)]
pub enum PacketError {
    /// Index accessor called outside `[0, capacity)`
    #[error("Invalid event offset {index}, while maximum allowed value is {}", .capacity - 1)]
    IndexOutOfRange { index: i32, capacity: i32 },

    /// Timestamps are 31-bit, the sign bit is reserved
    #[error("Negative timestamp {0} not allowed")]
    NegativeTimestamp(i32),

    /// Argument outside its documented domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// validate() called on a record that is already valid
    #[error("Event {0} is already valid")]
    AlreadyValid(i32),

    /// invalidate() called on a record that is already invalid
    #[error("Event {0} is already invalid")]
    AlreadyInvalid(i32),

    /// validate() on a record past the first unused slot
    #[error("Cannot validate event {index} while event number is {event_number}")]
    OutOfOrder { index: i32, event_number: i32 },

    /// Backing memory could not be obtained
    #[error("Failed to allocate packet with capacity {capacity}")]
    AllocationFailure { capacity: i32 },

    /// Every slot of the packet has been used
    #[error("Packet is full (capacity {0})")]
    CapacityExhausted(i32),

    /// Malformed bytes on the wire or in a stream file
    #[error("Decode error: {0}")]
    Decode(String),

    /// Stream checksum does not match the footer
    #[error("Checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    ChecksumMismatch { expected: u64, actual: u64 },

    /// I/O error (stream files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error (event dumps)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PacketError {
    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// True for validity transitions that were refused
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            Self::AlreadyValid(_) | Self::AlreadyInvalid(_) | Self::OutOfOrder { .. }
        )
    }
}

/// Result type alias using PacketError
pub type PacketResult<T> = Result<T, PacketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_out_of_range_message() {
        let err = PacketError::IndexOutOfRange {
            index: 5,
            capacity: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 5"));
        assert!(msg.contains("maximum allowed value is 2"));
    }

    #[test]
    fn test_negative_timestamp_message() {
        let err = PacketError::NegativeTimestamp(-1);
        assert!(err.to_string().contains("-1"));
    }

    #[test]
    fn test_misuse_classification() {
        assert!(PacketError::AlreadyValid(0).is_misuse());
        assert!(PacketError::AlreadyInvalid(0).is_misuse());
        assert!(PacketError::OutOfOrder {
            index: 3,
            event_number: 1
        }
        .is_misuse());
        assert!(!PacketError::CapacityExhausted(4).is_misuse());
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PacketError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_decode_error() {
        let err = PacketError::decode("short header");
        assert!(err.to_string().contains("short header"));
    }
}
