//! Error types for protocol operations

use thiserror::Error;
use crate::PacketType;

/// Protocol-specific errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Response type did not match the request that was sent
    #[error("Unexpected packet type: expected {expected:?}, got {actual:?}")]
    UnexpectedPacketType {
        /// Type the caller was waiting for
        expected: PacketType,
        /// Type that actually arrived
        actual: PacketType,
    },

    /// Declared size disagrees with the data supplied
    #[error("Size mismatch: declared {declared} bytes, got {actual}")]
    SizeMismatch {
        /// Size field value
        declared: i32,
        /// Length of the data buffer
        actual: usize,
    },

    /// Size field is negative or does not fit the wire integer
    #[error("Invalid size: {0}")]
    InvalidSize(i64),

    /// Declared payload exceeds the configured limit
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge {
        /// Declared payload size
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Payload is shorter than its fixed layout requires
    #[error("Short payload: need {needed} bytes, got {actual}")]
    ShortPayload {
        /// Minimum number of bytes required
        needed: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Packet type has no response and cannot be sent as a request
    #[error("Not a request packet type: {0:?}")]
    NotARequest(PacketType),
}
