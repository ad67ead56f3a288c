//! Packet structure and packet type codes

use serde::{Deserialize, Serialize};
use bytes::Bytes;
use std::borrow::Cow;
use std::fmt;

/// Size of the packet header: `total_size: i32` followed by `type: i32`
pub const HEADER_SIZE: usize = 8;

/// Operation code carried in every packet header
///
/// Codes outside the known set are kept as [`PacketType::Unknown`] so the
/// framing layer never rejects a packet on its type alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// Server-side failure report
    Error,
    /// Request the remote process list
    GetProcessListReq,
    /// Request a memory read
    ReadMemoryReq,
    /// Request a memory write
    WriteMemoryReq,
    /// Process list response
    GetProcessListRes,
    /// Memory read response
    ReadMemoryRes,
    /// Memory write response
    WriteMemoryRes,
    /// Any code outside the known set
    Unknown(i32),
}

impl PacketType {
    /// Wire code for this packet type
    pub fn code(self) -> i32 {
        match self {
            Self::Error => -1,
            Self::GetProcessListReq => 0,
            Self::ReadMemoryReq => 1,
            Self::WriteMemoryReq => 2,
            Self::GetProcessListRes => 3,
            Self::ReadMemoryRes => 4,
            Self::WriteMemoryRes => 5,
            Self::Unknown(code) => code,
        }
    }

    /// Response type a server answers this request with
    pub fn response_type(self) -> Option<PacketType> {
        match self {
            Self::GetProcessListReq => Some(Self::GetProcessListRes),
            Self::ReadMemoryReq => Some(Self::ReadMemoryRes),
            Self::WriteMemoryReq => Some(Self::WriteMemoryRes),
            _ => None,
        }
    }
}

impl From<i32> for PacketType {
    fn from(code: i32) -> Self {
        match code {
            -1 => Self::Error,
            0 => Self::GetProcessListReq,
            1 => Self::ReadMemoryReq,
            2 => Self::WriteMemoryReq,
            3 => Self::GetProcessListRes,
            4 => Self::ReadMemoryRes,
            5 => Self::WriteMemoryRes,
            other => Self::Unknown(other),
        }
    }
}

impl From<PacketType> for i32 {
    fn from(packet_type: PacketType) -> Self {
        packet_type.code()
    }
}

/// One length-prefixed `(type, payload)` unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Operation code
    pub packet_type: PacketType,
    /// Operation-specific payload, header excluded
    pub payload: Bytes,
}

impl Packet {
    /// Create a new packet
    pub fn new(packet_type: PacketType, payload: Bytes) -> Self {
        Self {
            packet_type,
            payload,
        }
    }

    /// Create a packet with no payload
    pub fn empty(packet_type: PacketType) -> Self {
        Self::new(packet_type, Bytes::new())
    }

    /// Value of the `total_size` header field
    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Check if the payload is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// A process as reported by the remote side
///
/// `name` is raw bytes of declared length. It may contain embedded zero bytes
/// and is not required to be UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    /// Remote process identifier
    pub process_id: i32,
    /// Raw process name bytes
    pub name: Bytes,
}

impl ProcessInfo {
    /// Create a new process record
    pub fn new(process_id: i32, name: impl Into<Bytes>) -> Self {
        Self {
            process_id,
            name: name.into(),
        }
    }

    /// Name decoded as UTF-8, with invalid sequences replaced
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

impl fmt::Display for ProcessInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.process_id, self.name_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_packet_type_codes() {
        assert_eq!(PacketType::Error.code(), -1);
        assert_eq!(PacketType::GetProcessListReq.code(), 0);
        assert_eq!(PacketType::ReadMemoryReq.code(), 1);
        assert_eq!(PacketType::WriteMemoryReq.code(), 2);
        assert_eq!(PacketType::GetProcessListRes.code(), 3);
        assert_eq!(PacketType::ReadMemoryRes.code(), 4);
        assert_eq!(PacketType::WriteMemoryRes.code(), 5);
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        assert_eq!(PacketType::from(42), PacketType::Unknown(42));
        assert_eq!(PacketType::from(-7).code(), -7);
    }

    #[test]
    fn test_response_type_mapping() {
        assert_eq!(
            PacketType::ReadMemoryReq.response_type(),
            Some(PacketType::ReadMemoryRes)
        );
        assert_eq!(PacketType::ReadMemoryRes.response_type(), None);
        assert_eq!(PacketType::Unknown(9).response_type(), None);
    }

    #[test]
    fn test_packet_total_size() {
        let packet = Packet::empty(PacketType::GetProcessListReq);
        assert_eq!(packet.total_size(), 8);
        assert!(packet.is_empty());

        let packet = Packet::new(PacketType::ReadMemoryRes, Bytes::from_static(b"abcd"));
        assert_eq!(packet.total_size(), 12);
    }

    #[test]
    fn test_process_name_lossy() {
        let info = ProcessInfo::new(7, Bytes::from_static(b"a\xffb"));
        assert_eq!(info.name_lossy(), "a\u{fffd}b");
        assert_eq!(info.to_string(), "7 a\u{fffd}b");
    }

    proptest! {
        #[test]
        fn test_packet_type_code_roundtrip(code in any::<i32>()) {
            prop_assert_eq!(PacketType::from(code).code(), code);
        }
    }
}
