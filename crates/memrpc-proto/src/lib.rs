//! # memrpc Protocol
//!
//! Packet definitions and payload codec for the memrpc remote memory protocol.
//!
//! A packet on the wire is `total_size: i32 | type: i32 | payload`, where
//! `total_size` counts the 8-byte header. Integers are written in the host's
//! native width and byte order, see [`codec::WIRE_INT_SIZE`].

#![warn(missing_docs)]

/// Packet structure and packet type codes
pub mod packet;

/// Payload encoding and decoding
pub mod codec;

/// Error types for protocol operations
pub mod error;

/// TCP port client and server use unless configured otherwise
pub const DEFAULT_PORT: u16 = 27042;

pub use packet::{Packet, PacketType, ProcessInfo, HEADER_SIZE};
pub use codec::{PacketCodec, ReadRequest, WriteRequest};
pub use error::ProtocolError;
