//! Transport error types

use thiserror::Error;
use std::io;

/// Transport-specific errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Host name did not resolve to any address
    #[error("Failed to resolve {host}:{port}")]
    Resolve {
        /// Host that was looked up
        host: String,
        /// Port that was requested
        port: u16,
    },

    /// TCP connect failed for every resolved address
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation attempted without an open socket
    #[error("Not connected")]
    NotConnected,

    /// Peer closed the stream before the full buffer arrived
    #[error("Peer closed connection after {received} of {expected} bytes")]
    PeerClosed {
        /// Bytes the caller asked for
        expected: usize,
        /// Bytes received before the close
        received: usize,
    },

    /// Socket accepted zero bytes before the buffer was sent
    #[error("Write stalled after {sent} of {total} bytes")]
    WriteZero {
        /// Bytes sent before the stall
        sent: usize,
        /// Bytes the caller asked to send
        total: usize,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
