//! Packet-level client and remote memory operations

use crate::{MemrpcError, Result};
use bytes::Bytes;
use memrpc_proto::codec::DEFAULT_MAX_PAYLOAD_SIZE;
use memrpc_proto::{Packet, PacketCodec, PacketType, ProcessInfo, ProtocolError};
use memrpc_transport::TransportSocket;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Client for the remote memory protocol over a single connection
///
/// Packets carry no request identifier, so the response to a request must be
/// read before the next request is sent. Every operation takes `&mut self`
/// and completes the full send/receive exchange before returning. Share a
/// client between tasks only behind a lock held for the whole call.
///
/// Each operation comes in two forms. `try_*` methods return a [`Result`]
/// with the failure cause. The plain methods collapse every failure to an
/// empty result or `false`; an empty read is then indistinguishable from a
/// failed one.
#[derive(Debug)]
pub struct ProtocolClient<S = TcpStream> {
    /// Underlying exact-size transport
    transport: TransportSocket<S>,
    /// Largest payload accepted from the server
    max_payload_size: usize,
}

impl Default for ProtocolClient<TcpStream> {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolClient<TcpStream> {
    /// Create a disconnected client
    pub fn new() -> Self {
        Self {
            transport: TransportSocket::new(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Connect to `host:port`, replacing any existing connection
    pub async fn try_connect(&mut self, host: &str, port: u16) -> Result<()> {
        self.transport.connect(host, port).await?;
        Ok(())
    }

    /// Connect to `host:port`; `false` on any failure
    pub async fn connect(&mut self, host: &str, port: u16) -> bool {
        match self.try_connect(host, port).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to connect to {}:{}: {}", host, port, e);
                false
            }
        }
    }
}

impl<S> ProtocolClient<S> {
    /// Create a client over an already-connected stream
    pub fn from_stream(stream: S) -> Self {
        Self {
            transport: TransportSocket::from_stream(stream),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Set the largest response payload accepted
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Close the connection; safe to call when already disconnected
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
    }

    /// Check if the transport holds an open connection
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

impl<S> ProtocolClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Fetch the remote process list
    pub async fn try_get_process_list(&mut self) -> Result<Vec<ProcessInfo>> {
        let response = self
            .call(PacketType::GetProcessListReq, Bytes::new())
            .await?;

        let processes = PacketCodec::decode_process_list(&response.payload);
        debug!("Received {} processes", processes.len());
        Ok(processes)
    }

    /// Fetch the remote process list; empty on any failure
    pub async fn get_process_list(&mut self) -> Vec<ProcessInfo> {
        self.try_get_process_list().await.unwrap_or_else(|e| {
            warn!("get_process_list failed: {}", e);
            Vec::new()
        })
    }

    /// Read `size` bytes at `address` in process `process_id`
    ///
    /// Returns the payload exactly as the server sent it, which may be empty
    /// or shorter than requested.
    pub async fn try_read_memory(
        &mut self,
        process_id: i32,
        address: u64,
        size: i32,
    ) -> Result<Bytes> {
        let payload = PacketCodec::encode_read_request(process_id, address, size)?;
        let response = self
            .call(PacketType::ReadMemoryReq, payload)
            .await?;

        Ok(PacketCodec::decode_memory_data(response.payload))
    }

    /// Read remote memory; empty on any failure
    pub async fn read_memory(&mut self, process_id: i32, address: u64, size: i32) -> Bytes {
        self.try_read_memory(process_id, address, size)
            .await
            .unwrap_or_else(|e| {
                warn!("read_memory({}, {:#x}, {}) failed: {}", process_id, address, size, e);
                Bytes::new()
            })
    }

    /// Write `data` at `address` in process `process_id`
    ///
    /// Succeeds only when the server answers with a non-empty write response.
    pub async fn try_write_memory(
        &mut self,
        process_id: i32,
        address: u64,
        data: &[u8],
    ) -> Result<()> {
        let size = i32::try_from(data.len())
            .map_err(|_| ProtocolError::InvalidSize(data.len() as i64))?;
        let payload = PacketCodec::encode_write_request(process_id, address, size, data)?;
        let response = self
            .call(PacketType::WriteMemoryReq, payload)
            .await?;

        if response.is_empty() {
            return Err(MemrpcError::WriteRejected {
                process_id,
                address,
                size: data.len(),
            });
        }

        Ok(())
    }

    /// Write remote memory; `false` on any failure
    pub async fn write_memory(&mut self, process_id: i32, address: u64, data: &[u8]) -> bool {
        match self.try_write_memory(process_id, address, data).await {
            Ok(()) => true,
            Err(e) => {
                warn!("write_memory({}, {:#x}, {} bytes) failed: {}", process_id, address, data.len(), e);
                false
            }
        }
    }

    /// Send one request and read one response of the expected type
    ///
    /// Drops the connection when the failure leaves the stream off a packet
    /// boundary.
    async fn call(&mut self, request_type: PacketType, payload: Bytes) -> Result<Packet> {
        let expected = request_type
            .response_type()
            .ok_or(ProtocolError::NotARequest(request_type))?;
        let result = self.exchange(request_type, &payload).await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if e.desynchronizes() {
                    warn!("Dropping connection after {:?} failed: {}", request_type, e);
                    self.disconnect();
                }
                return Err(e);
            }
        };

        if response.packet_type != expected {
            return Err(ProtocolError::UnexpectedPacketType {
                expected,
                actual: response.packet_type,
            }
            .into());
        }

        Ok(response)
    }

    async fn exchange(&mut self, request_type: PacketType, payload: &[u8]) -> Result<Packet> {
        self.send_packet(request_type, payload).await?;
        self.recv_packet().await
    }

    /// Frame and send `total_size | type | payload`
    async fn send_packet(&mut self, packet_type: PacketType, payload: &[u8]) -> Result<()> {
        let total_size = PacketCodec::total_size(payload.len())?;
        trace!("Sending {:?} packet, total_size={}", packet_type, total_size);

        self.transport.send_i32(total_size).await?;
        self.transport.send_i32(packet_type.code()).await?;
        if !payload.is_empty() {
            self.transport.send_all(payload).await?;
        }

        Ok(())
    }

    /// Read one `total_size | type | payload` packet
    async fn recv_packet(&mut self) -> Result<Packet> {
        let total_size = self.transport.recv_i32().await?;
        let packet_type = PacketType::from(self.transport.recv_i32().await?);
        let payload_size = PacketCodec::payload_size(total_size);
        trace!("Received {:?} header, total_size={}", packet_type, total_size);

        if payload_size > self.max_payload_size {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size,
                max: self.max_payload_size,
            }
            .into());
        }

        let payload = if payload_size > 0 {
            self.transport.recv_bytes(payload_size).await?
        } else {
            Bytes::new()
        };

        Ok(Packet::new(packet_type, payload))
    }
}
