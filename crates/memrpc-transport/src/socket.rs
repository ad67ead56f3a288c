//! Connection-owning socket with all-or-nothing transfers

use crate::TransportError;
use bytes::{Bytes, BytesMut};
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info, warn};

/// Width of a framing integer on the wire
pub const INT_SIZE: usize = std::mem::size_of::<i32>();

/// Owns at most one connection and moves exact byte counts over it
///
/// State is `Connected` exactly when a stream is held. Dropping the socket
/// closes the stream.
#[derive(Debug)]
pub struct TransportSocket<S = TcpStream> {
    /// Open stream, `None` while disconnected
    stream: Option<S>,
}

impl Default for TransportSocket<TcpStream> {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportSocket<TcpStream> {
    /// Create a disconnected socket
    pub fn new() -> Self {
        Self { stream: None }
    }

    /// Resolve `host` and connect to the first address that accepts
    ///
    /// An existing connection is closed first. On failure the socket is left
    /// disconnected.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.is_connected() {
            debug!("Replacing existing connection");
            self.disconnect();
        }

        let addrs: Vec<_> = lookup_host((host, port))
            .await
            .map_err(|e| {
                debug!("Address lookup for {}:{} failed: {}", host, port, e);
                TransportError::Resolve { host: host.to_string(), port }
            })?
            .collect();

        if addrs.is_empty() {
            return Err(TransportError::Resolve { host: host.to_string(), port });
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY on {}: {}", addr, e);
                    }
                    info!("Connected to {}", addr);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no usable address".to_string());
        Err(TransportError::Connection(format!("{}:{}: {}", host, port, reason)))
    }
}

impl<S> TransportSocket<S> {
    /// Wrap an already-connected stream
    pub fn from_stream(stream: S) -> Self {
        Self { stream: Some(stream) }
    }

    /// Close the stream if open; no-op otherwise
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closing connection");
        }
    }

    /// Check if a stream is held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream_mut(&mut self) -> Result<&mut S, TransportError> {
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

impl<S> TransportSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send every byte of `data`, looping over short writes
    pub async fn send_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream_mut()?;
        let total = data.len();
        let mut sent = 0;

        while sent < total {
            match stream.write(&data[sent..]).await {
                Ok(0) => return Err(TransportError::WriteZero { sent, total }),
                Ok(n) => sent += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        stream.flush().await?;
        Ok(())
    }

    /// Receive exactly `size` bytes, looping over short reads
    ///
    /// The buffer is only returned when complete; a close or error part way
    /// through drops whatever was read.
    pub async fn recv_all(&mut self, size: usize) -> Result<BytesMut, TransportError> {
        let stream = self.stream_mut()?;
        let mut buf = BytesMut::zeroed(size);
        let mut received = 0;

        while received < size {
            match stream.read(&mut buf[received..]).await {
                Ok(0) => {
                    return Err(TransportError::PeerClosed {
                        expected: size,
                        received,
                    })
                }
                Ok(n) => received += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(buf)
    }

    /// Send a 4-byte integer in native byte order
    pub async fn send_i32(&mut self, value: i32) -> Result<(), TransportError> {
        self.send_all(&value.to_ne_bytes()).await
    }

    /// Receive a 4-byte integer in native byte order
    pub async fn recv_i32(&mut self) -> Result<i32, TransportError> {
        let buf = self.recv_all(INT_SIZE).await?;
        let mut raw = [0u8; INT_SIZE];
        raw.copy_from_slice(&buf);
        Ok(i32::from_ne_bytes(raw))
    }

    /// Send a byte buffer
    pub async fn send_bytes(&mut self, data: &Bytes) -> Result<(), TransportError> {
        self.send_all(data).await
    }

    /// Receive exactly `size` bytes as an immutable buffer
    pub async fn recv_bytes(&mut self, size: usize) -> Result<Bytes, TransportError> {
        Ok(self.recv_all(size).await?.freeze())
    }
}
