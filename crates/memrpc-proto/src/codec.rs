//! Payload encoding and decoding
//!
//! All integers are written with `*_ne` accessors: native width and native
//! byte order, matching the deployed servers. Peers must share endianness.

use crate::{Packet, ProcessInfo, ProtocolError, HEADER_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Width of a wire integer
pub const WIRE_INT_SIZE: usize = std::mem::size_of::<i32>();

/// Size of the `pid | address | size` request header
pub const MEMORY_REQUEST_HEADER_SIZE: usize =
    WIRE_INT_SIZE + std::mem::size_of::<u64>() + WIRE_INT_SIZE;

/// Size of one process record before its name bytes
const PROCESS_RECORD_HEADER_SIZE: usize = WIRE_INT_SIZE * 2;

/// Default maximum payload accepted from a peer (16MB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Decoded `ReadMemoryReq` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Target process
    pub process_id: i32,
    /// Remote start address
    pub address: u64,
    /// Number of bytes requested
    pub size: i32,
}

/// Decoded `WriteMemoryReq` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    /// Target process
    pub process_id: i32,
    /// Remote start address
    pub address: u64,
    /// Bytes to write
    pub data: Bytes,
}

/// Stateless payload codec
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketCodec;

impl PacketCodec {
    /// Encode a `ReadMemoryReq` payload: `pid | address | size`, 16 bytes
    pub fn encode_read_request(
        process_id: i32,
        address: u64,
        size: i32,
    ) -> Result<Bytes, ProtocolError> {
        if size < 0 {
            return Err(ProtocolError::InvalidSize(size.into()));
        }

        let mut buf = BytesMut::with_capacity(MEMORY_REQUEST_HEADER_SIZE);
        put_memory_header(&mut buf, process_id, address, size);
        Ok(buf.freeze())
    }

    /// Encode a `WriteMemoryReq` payload: the read header followed by `size` data bytes
    ///
    /// `size` must equal `data.len()`.
    pub fn encode_write_request(
        process_id: i32,
        address: u64,
        size: i32,
        data: &[u8],
    ) -> Result<Bytes, ProtocolError> {
        if size < 0 {
            return Err(ProtocolError::InvalidSize(size.into()));
        }
        if size as usize != data.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: size,
                actual: data.len(),
            });
        }

        let mut buf = BytesMut::with_capacity(MEMORY_REQUEST_HEADER_SIZE + data.len());
        put_memory_header(&mut buf, process_id, address, size);
        buf.put_slice(data);
        Ok(buf.freeze())
    }

    /// Decode a `GetProcessListRes` payload
    ///
    /// Stops at the first record that does not fit in the remaining bytes and
    /// returns the records parsed so far. A short or malformed payload is not
    /// an error.
    pub fn decode_process_list(data: &[u8]) -> Vec<ProcessInfo> {
        let mut buf = data;
        if buf.remaining() < WIRE_INT_SIZE {
            return Vec::new();
        }

        let count = buf.get_i32_ne();
        if count <= 0 {
            return Vec::new();
        }

        let capacity = (count as usize).min(buf.remaining() / PROCESS_RECORD_HEADER_SIZE);
        let mut processes = Vec::with_capacity(capacity);

        for _ in 0..count {
            if buf.remaining() < PROCESS_RECORD_HEADER_SIZE {
                break;
            }

            let process_id = buf.get_i32_ne();
            let name_len = buf.get_i32_ne();
            if name_len < 0 || name_len as usize > buf.remaining() {
                break;
            }

            let name = buf.copy_to_bytes(name_len as usize);
            processes.push(ProcessInfo { process_id, name });
        }

        processes
    }

    /// Decode a `ReadMemoryRes` payload; the payload is the memory content verbatim
    pub fn decode_memory_data(data: Bytes) -> Bytes {
        data
    }

    /// Encode a `GetProcessListRes` payload
    pub fn encode_process_list(processes: &[ProcessInfo]) -> Result<Bytes, ProtocolError> {
        let count = to_wire_len(processes.len())?;
        let names: usize = processes.iter().map(|p| p.name.len()).sum();

        let mut buf = BytesMut::with_capacity(
            WIRE_INT_SIZE + processes.len() * PROCESS_RECORD_HEADER_SIZE + names,
        );
        buf.put_i32_ne(count);
        for process in processes {
            buf.put_i32_ne(process.process_id);
            buf.put_i32_ne(to_wire_len(process.name.len())?);
            buf.put_slice(&process.name);
        }

        Ok(buf.freeze())
    }

    /// Decode a `ReadMemoryReq` payload
    pub fn decode_read_request(data: &[u8]) -> Result<ReadRequest, ProtocolError> {
        let mut buf = data;
        let (process_id, address, size) = get_memory_header(&mut buf)?;
        if size < 0 {
            return Err(ProtocolError::InvalidSize(size.into()));
        }

        Ok(ReadRequest {
            process_id,
            address,
            size,
        })
    }

    /// Decode a `WriteMemoryReq` payload
    ///
    /// Bytes beyond the declared size are ignored.
    pub fn decode_write_request(mut data: Bytes) -> Result<WriteRequest, ProtocolError> {
        let (process_id, address, size) = get_memory_header(&mut data)?;
        if size < 0 {
            return Err(ProtocolError::InvalidSize(size.into()));
        }
        if data.len() < size as usize {
            return Err(ProtocolError::ShortPayload {
                needed: MEMORY_REQUEST_HEADER_SIZE + size as usize,
                actual: MEMORY_REQUEST_HEADER_SIZE + data.len(),
            });
        }

        Ok(WriteRequest {
            process_id,
            address,
            data: data.split_to(size as usize),
        })
    }

    /// `total_size` header value for a payload of the given length
    pub fn total_size(payload_len: usize) -> Result<i32, ProtocolError> {
        to_wire_len(HEADER_SIZE + payload_len)
    }

    /// Payload length implied by a received `total_size`; zero when not positive
    pub fn payload_size(total_size: i32) -> usize {
        let payload = i64::from(total_size) - HEADER_SIZE as i64;
        if payload > 0 {
            payload as usize
        } else {
            0
        }
    }

    /// Encode a whole packet, header included
    pub fn encode_packet(packet: &Packet) -> Result<Bytes, ProtocolError> {
        let total_size = Self::total_size(packet.payload.len())?;

        let mut buf = BytesMut::with_capacity(packet.total_size());
        buf.put_i32_ne(total_size);
        buf.put_i32_ne(packet.packet_type.code());
        buf.put_slice(&packet.payload);
        Ok(buf.freeze())
    }
}

fn put_memory_header(buf: &mut BytesMut, process_id: i32, address: u64, size: i32) {
    buf.put_i32_ne(process_id);
    buf.put_u64_ne(address);
    buf.put_i32_ne(size);
}

fn get_memory_header<B: Buf>(buf: &mut B) -> Result<(i32, u64, i32), ProtocolError> {
    if buf.remaining() < MEMORY_REQUEST_HEADER_SIZE {
        return Err(ProtocolError::ShortPayload {
            needed: MEMORY_REQUEST_HEADER_SIZE,
            actual: buf.remaining(),
        });
    }

    Ok((buf.get_i32_ne(), buf.get_u64_ne(), buf.get_i32_ne()))
}

fn to_wire_len(len: usize) -> Result<i32, ProtocolError> {
    i32::try_from(len).map_err(|_| ProtocolError::InvalidSize(len as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PacketType;
    use proptest::prelude::*;

    fn record(buf: &mut BytesMut, pid: i32, name: &[u8]) {
        buf.put_i32_ne(pid);
        buf.put_i32_ne(name.len() as i32);
        buf.put_slice(name);
    }

    #[test]
    fn test_read_request_layout() {
        let payload = PacketCodec::encode_read_request(42, 0x1122_3344_5566_7788, 256).unwrap();
        assert_eq!(payload.len(), 16);
        assert_eq!(&payload[0..4], &42i32.to_ne_bytes());
        assert_eq!(&payload[4..12], &0x1122_3344_5566_7788u64.to_ne_bytes());
        assert_eq!(&payload[12..16], &256i32.to_ne_bytes());
    }

    #[test]
    fn test_read_request_rejects_negative_size() {
        let result = PacketCodec::encode_read_request(1, 0, -1);
        assert_eq!(result, Err(ProtocolError::InvalidSize(-1)));
    }

    #[test]
    fn test_write_request_layout() {
        let payload = PacketCodec::encode_write_request(7, 0x1000, 3, b"xyz").unwrap();
        assert_eq!(payload.len(), 19);
        assert_eq!(&payload[12..16], &3i32.to_ne_bytes());
        assert_eq!(&payload[16..], b"xyz");
    }

    #[test]
    fn test_write_request_size_mismatch() {
        let result = PacketCodec::encode_write_request(7, 0x1000, 4, b"xyz");
        assert_eq!(
            result,
            Err(ProtocolError::SizeMismatch { declared: 4, actual: 3 })
        );
    }

    #[test]
    fn test_decode_single_process() {
        let mut buf = BytesMut::new();
        buf.put_i32_ne(1);
        record(&mut buf, 100, b"abc");
        assert_eq!(buf.len(), 15);

        let processes = PacketCodec::decode_process_list(&buf);
        assert_eq!(processes, vec![ProcessInfo::new(100, &b"abc"[..])]);
    }

    #[test]
    fn test_decode_truncated_list_keeps_prefix() {
        let mut buf = BytesMut::new();
        buf.put_i32_ne(5);
        record(&mut buf, 1, b"init");
        record(&mut buf, 2, b"sshd");
        // third record cut off inside its name
        buf.put_i32_ne(3);
        buf.put_i32_ne(10);
        buf.put_slice(b"bash");

        let processes = PacketCodec::decode_process_list(&buf);
        assert_eq!(processes.len(), 2);
        assert_eq!(processes[0], ProcessInfo::new(1, &b"init"[..]));
        assert_eq!(processes[1], ProcessInfo::new(2, &b"sshd"[..]));
    }

    #[test]
    fn test_decode_stops_on_negative_name_len() {
        let mut buf = BytesMut::new();
        buf.put_i32_ne(2);
        record(&mut buf, 1, b"ok");
        buf.put_i32_ne(2);
        buf.put_i32_ne(-4);

        let processes = PacketCodec::decode_process_list(&buf);
        assert_eq!(processes, vec![ProcessInfo::new(1, &b"ok"[..])]);
    }

    #[test]
    fn test_decode_stops_on_partial_record_header() {
        let mut buf = BytesMut::new();
        buf.put_i32_ne(2);
        record(&mut buf, 1, b"");
        buf.put_slice(&[0, 0, 0]);

        let processes = PacketCodec::decode_process_list(&buf);
        assert_eq!(processes, vec![ProcessInfo::new(1, Bytes::new())]);
    }

    #[test]
    fn test_decode_short_or_empty_payload() {
        assert!(PacketCodec::decode_process_list(&[]).is_empty());
        assert!(PacketCodec::decode_process_list(&[1, 0]).is_empty());
        assert!(PacketCodec::decode_process_list(&(-3i32).to_ne_bytes()).is_empty());
        assert!(PacketCodec::decode_process_list(&0i32.to_ne_bytes()).is_empty());
    }

    #[test]
    fn test_decode_ignores_records_beyond_count() {
        let mut buf = BytesMut::new();
        buf.put_i32_ne(1);
        record(&mut buf, 1, b"one");
        record(&mut buf, 2, b"two");

        let processes = PacketCodec::decode_process_list(&buf);
        assert_eq!(processes.len(), 1);
    }

    #[test]
    fn test_memory_data_is_verbatim() {
        let data = Bytes::from_static(b"\x00\x01\x02");
        assert_eq!(PacketCodec::decode_memory_data(data.clone()), data);
        assert!(PacketCodec::decode_memory_data(Bytes::new()).is_empty());
    }

    #[test]
    fn test_decode_write_request() {
        let payload = PacketCodec::encode_write_request(9, 0xdead_beef, 2, b"hi").unwrap();
        let request = PacketCodec::decode_write_request(payload).unwrap();
        assert_eq!(request.process_id, 9);
        assert_eq!(request.address, 0xdead_beef);
        assert_eq!(request.data, Bytes::from_static(b"hi"));
    }

    #[test]
    fn test_decode_write_request_short_data() {
        let mut buf = BytesMut::new();
        put_memory_header(&mut buf, 9, 0, 8);
        buf.put_slice(b"abc");

        let result = PacketCodec::decode_write_request(buf.freeze());
        assert_eq!(
            result,
            Err(ProtocolError::ShortPayload { needed: 24, actual: 19 })
        );
    }

    #[test]
    fn test_decode_read_request_short_header() {
        let result = PacketCodec::decode_read_request(&[0u8; 10]);
        assert_eq!(
            result,
            Err(ProtocolError::ShortPayload { needed: 16, actual: 10 })
        );
    }

    #[test]
    fn test_payload_size() {
        assert_eq!(PacketCodec::payload_size(8), 0);
        assert_eq!(PacketCodec::payload_size(23), 15);
        assert_eq!(PacketCodec::payload_size(3), 0);
        assert_eq!(PacketCodec::payload_size(-100), 0);
        assert_eq!(PacketCodec::payload_size(i32::MIN), 0);
    }

    #[cfg(target_endian = "little")]
    #[test]
    fn test_encode_packet_bytes() {
        let request = PacketCodec::encode_packet(&Packet::empty(PacketType::GetProcessListReq)).unwrap();
        assert_eq!(&request[..], &[0x08, 0, 0, 0, 0, 0, 0, 0]);

        let payload = PacketCodec::encode_process_list(&[ProcessInfo::new(100, &b"abc"[..])]).unwrap();
        let response = PacketCodec::encode_packet(&Packet::new(PacketType::GetProcessListRes, payload)).unwrap();
        assert_eq!(response.len(), 23);
        assert_eq!(&response[..8], &[23, 0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(&response[8..], &[1, 0, 0, 0, 100, 0, 0, 0, 3, 0, 0, 0, b'a', b'b', b'c']);
    }

    proptest! {
        #[test]
        fn test_process_list_roundtrip(
            records in prop::collection::vec(
                (any::<i32>(), prop::collection::vec(any::<u8>(), 0..64)),
                0..32
            )
        ) {
            let processes: Vec<ProcessInfo> = records
                .into_iter()
                .map(|(pid, name)| ProcessInfo::new(pid, name))
                .collect();

            let encoded = PacketCodec::encode_process_list(&processes).unwrap();
            let decoded = PacketCodec::decode_process_list(&encoded);

            prop_assert_eq!(decoded, processes);
        }

        #[test]
        fn test_decode_process_list_never_panics(
            data in prop::collection::vec(any::<u8>(), 0..256)
        ) {
            let processes = PacketCodec::decode_process_list(&data);
            prop_assert!(processes.len() * PROCESS_RECORD_HEADER_SIZE <= data.len());
        }
    }
}
