//! Listener and per-connection packet loop

use crate::{MemoryBackend, RequestHandler};
use anyhow::{bail, Context, Result};
use bytes::BytesMut;
use memrpc_proto::codec::{DEFAULT_MAX_PAYLOAD_SIZE, WIRE_INT_SIZE};
use memrpc_proto::{Packet, PacketCodec, PacketType};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// TCP server accepting memrpc connections
pub struct Agent {
    /// Bound listener
    listener: TcpListener,
    /// Shared request dispatcher
    handler: RequestHandler,
    /// Largest request payload accepted
    max_payload_size: usize,
    /// Shutdown signal receiver
    shutdown_rx: Option<oneshot::Receiver<()>>,
    /// Shutdown signal sender (handed out through `shutdown_sender`)
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Agent {
    /// Bind a listener serving `backend`
    pub async fn bind<A: ToSocketAddrs>(addr: A, backend: Arc<dyn MemoryBackend>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .context("Failed to bind listener")?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        Ok(Self {
            listener,
            handler: RequestHandler::new(backend),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            shutdown_rx: Some(shutdown_rx),
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Set the largest request payload accepted
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Get shutdown sender for graceful shutdown
    pub fn shutdown_sender(&mut self) -> Option<oneshot::Sender<()>> {
        self.shutdown_tx.take()
    }

    /// Accept connections until shutdown is signalled
    ///
    /// Each connection is served on its own task.
    pub async fn run(&mut self) -> Result<()> {
        info!("Listening on {}", self.local_addr()?);

        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .context("Shutdown receiver already taken")?;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Received shutdown signal, stopping agent");
                    break;
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!("Accept failed: {}", e);
                            continue;
                        }
                    };

                    info!("Accepted connection from {}", peer);
                    let connection = ConnectionLoop::new(stream, self.handler.clone())
                        .with_max_payload_size(self.max_payload_size);
                    tokio::spawn(async move {
                        match connection.run().await {
                            Ok(()) => debug!("Connection from {} closed", peer),
                            Err(e) => error!("Connection from {} failed: {}", peer, e),
                        }
                    });
                }
            }
        }

        Ok(())
    }
}

/// Read-dispatch-reply loop over one stream
pub struct ConnectionLoop<S> {
    stream: S,
    handler: RequestHandler,
    max_payload_size: usize,
}

impl<S> ConnectionLoop<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a loop over `stream`
    pub fn new(stream: S, handler: RequestHandler) -> Self {
        Self {
            stream,
            handler,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Set the largest request payload accepted
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Serve requests until the peer closes between packets
    pub async fn run(mut self) -> Result<()> {
        while let Some(request) = self.read_packet().await? {
            let response = self.handler.handle(request).await;
            let encoded = PacketCodec::encode_packet(&response)?;
            self.stream
                .write_all(&encoded)
                .await
                .context("Failed to write response")?;
            self.stream.flush().await?;
        }

        Ok(())
    }

    /// Read one packet; `None` on a clean close before the header
    async fn read_packet(&mut self) -> Result<Option<Packet>> {
        let mut header = [0u8; WIRE_INT_SIZE];
        let mut filled = 0;
        while filled < WIRE_INT_SIZE {
            match self.stream.read(&mut header[filled..]).await {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => bail!(
                    "Connection closed inside packet header after {} of {} bytes",
                    filled,
                    WIRE_INT_SIZE
                ),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let total_size = i32::from_ne_bytes(header);

        self.stream
            .read_exact(&mut header)
            .await
            .context("Connection closed inside packet header")?;
        let packet_type = PacketType::from(i32::from_ne_bytes(header));

        let payload_size = PacketCodec::payload_size(total_size);
        if payload_size > self.max_payload_size {
            bail!(
                "Request payload of {} bytes exceeds limit of {}",
                payload_size,
                self.max_payload_size
            );
        }

        let mut payload = BytesMut::zeroed(payload_size);
        self.stream
            .read_exact(&mut payload)
            .await
            .context("Connection closed inside packet payload")?;

        Ok(Some(Packet::new(packet_type, payload.freeze())))
    }
}
