//! # memrpc Agent
//!
//! Reference server for the memrpc protocol. Serves process listings and
//! memory access from a pluggable [`MemoryBackend`].

#![warn(missing_docs)]

/// Listener and per-connection packet loop
pub mod agent;

/// Backend trait and request dispatch
pub mod handlers;

/// In-memory simulated processes
pub mod memory;

pub use agent::{Agent, ConnectionLoop};
pub use handlers::{MemoryBackend, RequestHandler};
pub use memory::{ProcessFixture, SimulatedMemory};
