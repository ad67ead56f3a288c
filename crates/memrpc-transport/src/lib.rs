//! # memrpc Transport
//!
//! Exact-size byte transport over a TCP stream.
//!
//! Every send and receive either moves the full requested byte count or
//! fails; partial transfers are never reported as success.

#![warn(missing_docs)]

/// Connection-owning socket with all-or-nothing transfers
pub mod socket;

/// Transport error types
pub mod error;

pub use socket::TransportSocket;
pub use error::TransportError;
