//! In-memory simulated processes

use crate::MemoryBackend;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use memrpc_proto::ProcessInfo;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use tokio::sync::RwLock;

/// A process with one flat memory region
#[derive(Debug, Clone)]
struct SimulatedProcess {
    name: Bytes,
    base_address: u64,
    memory: Vec<u8>,
}

impl SimulatedProcess {
    /// Byte range inside `memory` covering `address..address + size`
    fn region(&self, address: u64, size: usize) -> Option<Range<usize>> {
        let start = usize::try_from(address.checked_sub(self.base_address)?).ok()?;
        let end = start.checked_add(size)?;
        (end <= self.memory.len()).then_some(start..end)
    }
}

/// One process entry in a JSON fixture file
///
/// ```json
/// [{ "pid": 1234, "name": "target.exe", "base_address": 4096, "size": 65536 }]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessFixture {
    /// Process id
    pub pid: i32,
    /// Process name
    pub name: String,
    /// Start of the memory region
    #[serde(default)]
    pub base_address: u64,
    /// Region length, zero-filled
    #[serde(default)]
    pub size: usize,
    /// Initial contents; the region grows to fit
    #[serde(default)]
    pub data: Vec<u8>,
}

/// Backend holding processes and their memory in this process
#[derive(Debug, Default)]
pub struct SimulatedMemory {
    processes: RwLock<BTreeMap<i32, SimulatedProcess>>,
}

impl SimulatedMemory {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a process whose memory starts at `base_address`
    pub fn with_process(
        mut self,
        process_id: i32,
        name: impl Into<Bytes>,
        base_address: u64,
        memory: Vec<u8>,
    ) -> Self {
        self.processes.get_mut().insert(
            process_id,
            SimulatedProcess {
                name: name.into(),
                base_address,
                memory,
            },
        );
        self
    }

    /// Build a backend from fixture entries
    pub fn from_fixtures(fixtures: Vec<ProcessFixture>) -> Self {
        fixtures.into_iter().fold(Self::new(), |memory, fixture| {
            let mut contents = fixture.data;
            if contents.len() < fixture.size {
                contents.resize(fixture.size, 0);
            }
            memory.with_process(fixture.pid, fixture.name, fixture.base_address, contents)
        })
    }

    /// Load fixture entries from a JSON file
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let fixtures: Vec<ProcessFixture> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid fixture {}", path.display()))?;
        Ok(Self::from_fixtures(fixtures))
    }

    /// A single 64 KiB process used when no fixture is given
    pub fn demo() -> Self {
        Self::new().with_process(1, "demo", 0x10000, vec![0u8; 64 * 1024])
    }
}

#[async_trait]
impl MemoryBackend for SimulatedMemory {
    async fn list_processes(&self) -> Result<Vec<ProcessInfo>> {
        let processes = self.processes.read().await;
        Ok(processes
            .iter()
            .map(|(pid, process)| ProcessInfo::new(*pid, process.name.clone()))
            .collect())
    }

    async fn read_memory(&self, process_id: i32, address: u64, size: usize) -> Result<Bytes> {
        let processes = self.processes.read().await;
        let process = processes
            .get(&process_id)
            .ok_or_else(|| anyhow!("No such process: {}", process_id))?;
        let Some(range) = process.region(address, size) else {
            bail!("Range {:#x}+{} outside process memory", address, size);
        };

        Ok(Bytes::copy_from_slice(&process.memory[range]))
    }

    async fn write_memory(&self, process_id: i32, address: u64, data: &[u8]) -> Result<()> {
        let mut processes = self.processes.write().await;
        let process = processes
            .get_mut(&process_id)
            .ok_or_else(|| anyhow!("No such process: {}", process_id))?;
        let Some(range) = process.region(address, data.len()) else {
            bail!("Range {:#x}+{} outside process memory", address, data.len());
        };

        process.memory[range].copy_from_slice(data);
        Ok(())
    }
}
