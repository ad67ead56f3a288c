//! # memrpc
//!
//! Client for enumerating remote processes and reading and writing their
//! memory through a cooperating server.
//!
//! [`ProtocolClient`] speaks the packet protocol over one TCP connection.
//! The protocol carries no request identifiers, so a client handles one
//! request at a time; [`HostContext`] wraps a client behind a lock together
//! with the process handle table a host application needs.

#![warn(missing_docs)]

pub use memrpc_proto as proto;
pub use memrpc_transport as transport;

/// Error types for the memrpc library
pub mod error;

/// Client configuration
pub mod config;

/// Packet-level client and remote memory operations
pub mod client;

/// Host integration context: locked client plus process handle table
pub mod context;

pub use error::{ErrorKind, MemrpcError};
pub use config::ClientConfig;
pub use client::ProtocolClient;
pub use context::{
    ControlAction, DebugEvent, HostContext, ProcessEntry, ProcessHandle, RemoteModule, RemoteSection,
};
pub use memrpc_proto::{PacketType, ProcessInfo};

/// Result type alias for memrpc operations
pub type Result<T> = std::result::Result<T, MemrpcError>;
