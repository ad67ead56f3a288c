//! Host integration context: locked client plus process handle table
//!
//! A host application (a memory viewer, a debugger front end) works in terms
//! of opaque process handles. [`HostContext`] maps those handles to remote
//! process ids and forwards memory access to a single shared
//! [`ProtocolClient`], serializing every call behind one lock.

use crate::{ClientConfig, MemrpcError, ProtocolClient, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Opaque token standing for an opened remote process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessHandle(u64);

impl ProcessHandle {
    /// Raw handle value
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Rebuild a handle from a raw value previously returned by [`as_raw`](Self::as_raw)
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Process as presented to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Remote process id
    pub id: i32,
    /// Display name
    pub name: String,
    /// Path; the protocol only carries a name, so this repeats it
    pub path: String,
}

#[derive(Debug)]
struct HandleEntry {
    process_id: i32,
    valid: AtomicBool,
}

/// Shared state for host-facing entry points
pub struct HostContext {
    /// Endpoint used whenever a connection has to be (re)established
    config: ClientConfig,
    /// The one client; the lock is held for a full request/response exchange
    client: Mutex<ProtocolClient>,
    /// Open handles
    handles: RwLock<HashMap<ProcessHandle, Arc<HandleEntry>>>,
    /// Next handle value to issue
    next_handle: AtomicU64,
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl HostContext {
    /// Create a context; no connection is made until first use
    pub fn new(config: ClientConfig) -> Self {
        let client = ProtocolClient::new().with_max_payload_size(config.max_payload_size);
        Self {
            config,
            client: Mutex::new(client),
            handles: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Check if the shared client currently holds a connection
    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_connected()
    }

    /// Invoke `callback` once per remote process
    ///
    /// Nothing is reported when the server cannot be reached.
    pub async fn enumerate_processes<F>(&self, mut callback: F)
    where
        F: FnMut(&ProcessEntry),
    {
        let processes = {
            let mut client = self.client.lock().await;
            if let Err(e) = self.ensure_connected(&mut client).await {
                warn!("Cannot enumerate processes: {}", e);
                return;
            }
            client.get_process_list().await
        };

        debug!("Enumerating {} processes", processes.len());
        for process in &processes {
            let name = process.name_lossy().into_owned();
            let entry = ProcessEntry {
                id: process.process_id,
                path: name.clone(),
                name,
            };
            callback(&entry);
        }
    }

    /// Register a handle for `process_id`
    ///
    /// The remote side is not contacted; the handle is valid until closed or
    /// until a connection attempt on its behalf fails.
    pub async fn open_remote_process(&self, process_id: i32) -> ProcessHandle {
        let handle = ProcessHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let entry = Arc::new(HandleEntry {
            process_id,
            valid: AtomicBool::new(true),
        });

        self.handles.write().await.insert(handle, entry);
        debug!("Opened handle {} for process {}", handle, process_id);
        handle
    }

    /// Check if `handle` is open and still valid
    pub async fn is_process_valid(&self, handle: ProcessHandle) -> bool {
        self.handles
            .read()
            .await
            .get(&handle)
            .map(|entry| entry.valid.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Forget `handle`; unknown handles are ignored
    pub async fn close_remote_process(&self, handle: ProcessHandle) {
        if self.handles.write().await.remove(&handle).is_some() {
            debug!("Closed handle {}", handle);
        }
    }

    /// Read `size` bytes at `address` into `buffer[offset..offset + size]`
    ///
    /// Returns the number of bytes copied, which is less than `size` when the
    /// server returns fewer bytes. An empty response is an error.
    pub async fn try_read_remote_memory(
        &self,
        handle: ProcessHandle,
        address: u64,
        buffer: &mut [u8],
        offset: usize,
        size: usize,
    ) -> Result<usize> {
        let range = buffer_range(buffer.len(), offset, size)?;
        let entry = self.lookup(handle).await?;
        let wire_size = i32::try_from(size)
            .map_err(|_| memrpc_proto::ProtocolError::InvalidSize(size as i64))?;

        let data = {
            let mut client = self.client.lock().await;
            self.connect_for(&mut client, handle, &entry).await?;
            client
                .try_read_memory(entry.process_id, address, wire_size)
                .await?
        };

        if data.is_empty() {
            return Err(MemrpcError::EmptyRead {
                process_id: entry.process_id,
                address,
            });
        }
        if data.len() > size {
            warn!(
                "Server returned {} bytes for a {} byte read at {:#x}, truncating",
                data.len(),
                size,
                address
            );
        }

        let copied = data.len().min(size);
        buffer[range.start..range.start + copied].copy_from_slice(&data[..copied]);
        Ok(copied)
    }

    /// Read remote memory into `buffer`; `false` on any failure
    pub async fn read_remote_memory(
        &self,
        handle: ProcessHandle,
        address: u64,
        buffer: &mut [u8],
        offset: usize,
        size: usize,
    ) -> bool {
        match self
            .try_read_remote_memory(handle, address, buffer, offset, size)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!("Read via handle {} at {:#x} failed: {}", handle, address, e);
                false
            }
        }
    }

    /// Write `buffer[offset..offset + size]` to `address`
    pub async fn try_write_remote_memory(
        &self,
        handle: ProcessHandle,
        address: u64,
        buffer: &[u8],
        offset: usize,
        size: usize,
    ) -> Result<()> {
        let range = buffer_range(buffer.len(), offset, size)?;
        let entry = self.lookup(handle).await?;

        let mut client = self.client.lock().await;
        self.connect_for(&mut client, handle, &entry).await?;
        client
            .try_write_memory(entry.process_id, address, &buffer[range])
            .await?;
        Ok(())
    }

    /// Write remote memory from `buffer`; `false` on any failure
    pub async fn write_remote_memory(
        &self,
        handle: ProcessHandle,
        address: u64,
        buffer: &[u8],
        offset: usize,
        size: usize,
    ) -> bool {
        match self
            .try_write_remote_memory(handle, address, buffer, offset, size)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!("Write via handle {} at {:#x} failed: {}", handle, address, e);
                false
            }
        }
    }

    /// Drop the connection; the next call reconnects
    pub async fn shutdown(&self) {
        self.client.lock().await.disconnect();
        info!("Host context shut down");
    }

    async fn lookup(&self, handle: ProcessHandle) -> Result<Arc<HandleEntry>> {
        let entry = self
            .handles
            .read()
            .await
            .get(&handle)
            .cloned()
            .ok_or(MemrpcError::UnknownHandle(handle.as_raw()))?;

        if !entry.valid.load(Ordering::Acquire) {
            return Err(MemrpcError::InvalidatedHandle(handle.as_raw()));
        }
        Ok(entry)
    }

    async fn ensure_connected(&self, client: &mut ProtocolClient) -> Result<()> {
        if client.is_connected() {
            return Ok(());
        }

        debug!("Connecting to {}", self.config.endpoint());
        client.try_connect(&self.config.host, self.config.port).await
    }

    /// Connect on behalf of a handle, invalidating it if that fails
    async fn connect_for(
        &self,
        client: &mut ProtocolClient,
        handle: ProcessHandle,
        entry: &HandleEntry,
    ) -> Result<()> {
        if let Err(e) = self.ensure_connected(client).await {
            warn!("Invalidating handle {}: {}", handle, e);
            entry.valid.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }
}

fn buffer_range(len: usize, offset: usize, size: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(size) {
        Some(end) if end <= len => Ok(offset..end),
        _ => Err(MemrpcError::BufferRange { offset, size, len }),
    }
}

/// Memory section reported by a layout enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSection {
    /// Start address
    pub base: u64,
    /// Length in bytes
    pub size: u64,
    /// Section name
    pub name: String,
}

/// Loaded module reported by a layout enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteModule {
    /// Load address
    pub base: u64,
    /// Image size in bytes
    pub size: u64,
    /// Module path
    pub path: String,
}

/// Execution control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Suspend all threads
    Suspend,
    /// Resume all threads
    Resume,
    /// Terminate the process
    Terminate,
}

/// Debug event delivered to an attached debugger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEvent {
    /// Process the event came from
    pub process_id: i32,
    /// Faulting or breaking address
    pub address: u64,
}

// The wire protocol has no layout or debugging operations. These entry points
// exist so a host can wire them up; they never succeed.
impl HostContext {
    /// Always empty
    pub fn enumerate_remote_sections_and_modules(
        &self,
        _handle: ProcessHandle,
    ) -> (Vec<RemoteSection>, Vec<RemoteModule>) {
        (Vec::new(), Vec::new())
    }

    /// No-op
    pub fn control_remote_process(&self, _handle: ProcessHandle, _action: ControlAction) {}

    /// Always `false`
    pub fn attach_debugger_to_process(&self, _process_id: i32) -> bool {
        false
    }

    /// No-op
    pub fn detach_debugger_from_process(&self, _process_id: i32) {}

    /// Always `None`, without waiting
    pub fn await_debug_event(&self, _timeout: Duration) -> Option<DebugEvent> {
        None
    }

    /// No-op
    pub fn handle_debug_event(&self, _event: &DebugEvent) {}

    /// Always `false`
    pub fn set_hardware_breakpoint(&self, _process_id: i32, _address: u64, _set: bool) -> bool {
        false
    }
}
