//! Error types for the memrpc library

use memrpc_proto::ProtocolError;
use memrpc_transport::TransportError;
use thiserror::Error;

/// Main error type for memrpc operations
#[derive(Debug, Error)]
pub enum MemrpcError {
    /// Socket, resolution, or byte transfer failure
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed or mismatched packet
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Server answered a write with an empty payload
    #[error("Write of {size} bytes at {address:#x} in process {process_id} was rejected")]
    WriteRejected {
        /// Target process
        process_id: i32,
        /// Remote start address
        address: u64,
        /// Bytes that were sent
        size: usize,
    },

    /// Server answered a read with no data
    #[error("Read at {address:#x} in process {process_id} returned no data")]
    EmptyRead {
        /// Target process
        process_id: i32,
        /// Remote start address
        address: u64,
    },

    /// Handle is not in the table
    #[error("Unknown process handle: {0}")]
    UnknownHandle(u64),

    /// Handle was invalidated after a connection failure
    #[error("Process handle {0} is no longer valid")]
    InvalidatedHandle(u64),

    /// `offset + size` falls outside the caller's buffer
    #[error("Range {offset}+{size} exceeds buffer of {len} bytes")]
    BufferRange {
        /// Start offset into the buffer
        offset: usize,
        /// Requested length
        size: usize,
        /// Actual buffer length
        len: usize,
    },
}

/// Coarse classification of a [`MemrpcError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Could not establish a connection
    Connection,
    /// Could not move the required number of bytes
    Transport,
    /// Response did not match the request or its layout
    Protocol,
    /// Server processed the request and reported failure
    Remote,
    /// Caller supplied an unusable handle or buffer
    Usage,
}

impl MemrpcError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(
                TransportError::Resolve { .. } | TransportError::Connection(_),
            ) => ErrorKind::Connection,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::WriteRejected { .. } | Self::EmptyRead { .. } => ErrorKind::Remote,
            Self::UnknownHandle(_) | Self::InvalidatedHandle(_) | Self::BufferRange { .. } => {
                ErrorKind::Usage
            }
        }
    }

    /// Check if the byte stream may no longer sit on a packet boundary
    ///
    /// After such an error the connection must be re-established.
    pub fn desynchronizes(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Protocol(ProtocolError::PayloadTooLarge { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memrpc_proto::PacketType;

    #[test]
    fn test_error_kinds() {
        let err = MemrpcError::from(TransportError::Connection("refused".to_string()));
        assert_eq!(err.kind(), ErrorKind::Connection);

        let err = MemrpcError::from(TransportError::PeerClosed { expected: 4, received: 1 });
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.desynchronizes());

        let err = MemrpcError::from(ProtocolError::UnexpectedPacketType {
            expected: PacketType::ReadMemoryRes,
            actual: PacketType::Error,
        });
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(!err.desynchronizes());

        let err = MemrpcError::from(ProtocolError::PayloadTooLarge { size: 10, max: 1 });
        assert!(err.desynchronizes());

        let err = MemrpcError::UnknownHandle(3);
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn test_error_messages() {
        let err = MemrpcError::WriteRejected { process_id: 4, address: 0x10, size: 2 };
        assert_eq!(
            err.to_string(),
            "Write of 2 bytes at 0x10 in process 4 was rejected"
        );
    }
}
