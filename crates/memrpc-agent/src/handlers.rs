//! Backend trait and request dispatch

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use memrpc_proto::{Packet, PacketCodec, PacketType, ProcessInfo};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Source of process listings and memory contents
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// List the processes visible to the agent
    async fn list_processes(&self) -> Result<Vec<ProcessInfo>>;

    /// Read `size` bytes at `address`
    async fn read_memory(&self, process_id: i32, address: u64, size: usize) -> Result<Bytes>;

    /// Write `data` at `address`
    async fn write_memory(&self, process_id: i32, address: u64, data: &[u8]) -> Result<()>;
}

/// Payload of a successful write response
const WRITE_OK: &[u8] = &[1];

/// Turns request packets into response packets
#[derive(Clone)]
pub struct RequestHandler {
    backend: Arc<dyn MemoryBackend>,
}

impl RequestHandler {
    /// Create a handler over `backend`
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    /// Produce the response for one request
    ///
    /// Failed reads and writes answer with an empty payload of the matching
    /// response type. Anything that is not a request answers with `Error`.
    pub async fn handle(&self, packet: Packet) -> Packet {
        debug!(
            "Handling {:?} packet, payload_size={}",
            packet.packet_type,
            packet.payload.len()
        );

        match packet.packet_type {
            PacketType::GetProcessListReq => self.handle_process_list().await,
            PacketType::ReadMemoryReq => self.handle_read(&packet.payload).await,
            PacketType::WriteMemoryReq => self.handle_write(packet.payload).await,
            other => {
                warn!("Unsupported packet type {:?}", other);
                Packet::empty(PacketType::Error)
            }
        }
    }

    async fn handle_process_list(&self) -> Packet {
        let encoded = match self.backend.list_processes().await {
            Ok(processes) => PacketCodec::encode_process_list(&processes).map_err(Into::into),
            Err(e) => Err(e),
        };

        match encoded {
            Ok(payload) => Packet::new(PacketType::GetProcessListRes, payload),
            Err(e) => {
                error!("Failed to list processes: {}", e);
                Packet::empty(PacketType::Error)
            }
        }
    }

    async fn handle_read(&self, payload: &[u8]) -> Packet {
        let request = match PacketCodec::decode_read_request(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed read request: {}", e);
                return Packet::empty(PacketType::Error);
            }
        };

        match self
            .backend
            .read_memory(request.process_id, request.address, request.size as usize)
            .await
        {
            Ok(data) => Packet::new(PacketType::ReadMemoryRes, data),
            Err(e) => {
                debug!(
                    "Read of {} bytes at {:#x} in {} failed: {}",
                    request.size, request.address, request.process_id, e
                );
                Packet::empty(PacketType::ReadMemoryRes)
            }
        }
    }

    async fn handle_write(&self, payload: Bytes) -> Packet {
        let request = match PacketCodec::decode_write_request(payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed write request: {}", e);
                return Packet::empty(PacketType::Error);
            }
        };

        match self
            .backend
            .write_memory(request.process_id, request.address, &request.data)
            .await
        {
            Ok(()) => Packet::new(PacketType::WriteMemoryRes, Bytes::from_static(WRITE_OK)),
            Err(e) => {
                debug!(
                    "Write of {} bytes at {:#x} in {} failed: {}",
                    request.data.len(),
                    request.address,
                    request.process_id,
                    e
                );
                Packet::empty(PacketType::WriteMemoryRes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedMemory;

    fn handler() -> RequestHandler {
        let memory = SimulatedMemory::new().with_process(42, "game", 0x1000, vec![0u8; 16]);
        RequestHandler::new(Arc::new(memory))
    }

    #[tokio::test]
    async fn test_process_list_response() {
        let response = handler()
            .handle(Packet::empty(PacketType::GetProcessListReq))
            .await;

        assert_eq!(response.packet_type, PacketType::GetProcessListRes);
        let processes = PacketCodec::decode_process_list(&response.payload);
        assert_eq!(processes, vec![ProcessInfo::new(42, &b"game"[..])]);
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let handler = handler();

        let write = PacketCodec::encode_write_request(42, 0x1004, 2, b"hi").unwrap();
        let response = handler
            .handle(Packet::new(PacketType::WriteMemoryReq, write))
            .await;
        assert_eq!(response.packet_type, PacketType::WriteMemoryRes);
        assert_eq!(&response.payload[..], WRITE_OK);

        let read = PacketCodec::encode_read_request(42, 0x1003, 4).unwrap();
        let response = handler
            .handle(Packet::new(PacketType::ReadMemoryReq, read))
            .await;
        assert_eq!(response.packet_type, PacketType::ReadMemoryRes);
        assert_eq!(&response.payload[..], &[0, b'h', b'i', 0]);
    }

    #[tokio::test]
    async fn test_failed_operations_answer_empty() {
        let handler = handler();

        let read = PacketCodec::encode_read_request(42, 0x2000, 4).unwrap();
        let response = handler
            .handle(Packet::new(PacketType::ReadMemoryReq, read))
            .await;
        assert_eq!(response.packet_type, PacketType::ReadMemoryRes);
        assert!(response.is_empty());

        let write = PacketCodec::encode_write_request(7, 0x1000, 1, b"x").unwrap();
        let response = handler
            .handle(Packet::new(PacketType::WriteMemoryReq, write))
            .await;
        assert_eq!(response.packet_type, PacketType::WriteMemoryRes);
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_non_request_answers_error() {
        let handler = handler();

        for packet_type in [PacketType::ReadMemoryRes, PacketType::Unknown(12), PacketType::Error] {
            let response = handler.handle(Packet::empty(packet_type)).await;
            assert_eq!(response.packet_type, PacketType::Error);
            assert!(response.is_empty());
        }
    }

    #[tokio::test]
    async fn test_malformed_read_answers_error() {
        let response = handler()
            .handle(Packet::new(PacketType::ReadMemoryReq, Bytes::from_static(b"short")))
            .await;
        assert_eq!(response.packet_type, PacketType::Error);
    }
}
