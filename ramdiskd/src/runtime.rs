//! # Host Runtime
//!
//! Boots the device registry and executes host commands against it.
//!
//! The runtime owns all output: each executed command appends lines to an
//! output buffer which the binary prints and tests inspect. A failed
//! command produces an `error:` line and the run carries on.

use crate::command_script::{CommandScript, CommandScriptError, ScriptedCommand};
use crate::commands::{DeviceRef, HostCommand};
use services_ramdisk::{
    BlockRequest, DeviceRegistry, Direction, RamDiskConfig, RamDiskError, Segment,
    KERNEL_SECTOR_SIZE,
};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Longest run list printed for a read
const MAX_SUMMARY_RUNS: usize = 8;

/// Host runtime error types
#[derive(Debug, Error)]
pub enum HostRuntimeError {
    #[error("Device error: {0}")]
    Device(#[from] RamDiskError),

    #[error("Script error: {0}")]
    Script(#[from] CommandScriptError),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Transfer of {0} sectors is too large")]
    TransferTooLarge(u64),

    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Host runtime configuration
#[derive(Debug, Clone, Default)]
pub struct HostRuntimeConfig {
    /// Registry configuration
    pub ramdisk: RamDiskConfig,
    /// Optional command script
    pub script: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostState {
    Running,
    Shutdown,
}

/// Host runtime
pub struct HostRuntime {
    registry: DeviceRegistry,
    script: CommandScript,
    state: HostState,
    steps: usize,
    output: Vec<String>,
}

impl HostRuntime {
    /// Creates the registry and parses the script
    pub fn new(config: HostRuntimeConfig) -> Result<Self, HostRuntimeError> {
        let script = match &config.script {
            Some(text) => CommandScript::from_text(text)?,
            None => CommandScript::new(),
        };
        let registry = DeviceRegistry::create(config.ramdisk)?;

        Ok(Self {
            registry,
            script,
            state: HostState::Running,
            steps: 0,
            output: Vec::new(),
        })
    }

    /// Runs the script until it is exhausted or a `quit` is executed
    pub fn run(&mut self) {
        while self.state == HostState::Running {
            let Some(ScriptedCommand { line, command }) = self.script.next_command() else {
                break;
            };
            log::debug!("script line {}: {:?}", line, command);
            self.step(&command);
        }
    }

    /// Executes one command, recording its output
    pub fn step(&mut self, command: &HostCommand) {
        match self.execute(command) {
            Ok(lines) => self.output.extend(lines),
            Err(err) => {
                log::warn!("command failed: {}", err);
                self.output.push(format!("error: {}", err));
            }
        }
        self.steps += 1;
    }

    /// Executes one command, returning its output lines
    pub fn execute(&mut self, command: &HostCommand) -> Result<Vec<String>, HostRuntimeError> {
        let line = match command {
            HostCommand::Open { device } => {
                let index = self.resolve(device)?;
                let users = self.registry.open(index)?;
                format!("open {} users={}", self.name(index), users)
            }
            HostCommand::Close { device } => {
                let index = self.resolve(device)?;
                let users = self.registry.close(index)?;
                format!("close {} users={}", self.name(index), users)
            }
            HostCommand::Write {
                device,
                sector,
                byte,
                count,
            } => {
                let index = self.resolve(device)?;
                let mut buffer = vec![*byte; self.buffer_len(index, *count)?];
                let request = BlockRequest::new(Direction::Write, *sector)
                    .with_segment(Segment::new(*count, &mut buffer));
                let sectors = self.registry.submit(index, request)?;
                format!("write {} sector={} sectors={}", self.name(index), sector, sectors)
            }
            HostCommand::Read {
                device,
                sector,
                count,
            } => {
                let index = self.resolve(device)?;
                let mut buffer = vec![0u8; self.buffer_len(index, *count)?];
                let request = BlockRequest::new(Direction::Read, *sector)
                    .with_segment(Segment::new(*count, &mut buffer));
                let sectors = self.registry.submit(index, request)?;
                format!(
                    "read {} sector={} sectors={} data={}",
                    self.name(index),
                    sector,
                    sectors,
                    summarize(&buffer)
                )
            }
            HostCommand::PassThrough { device } => {
                let index = self.resolve(device)?;
                self.registry.submit(index, BlockRequest::pass_through())?;
                format!("passthrough {} accepted", self.name(index))
            }
            HostCommand::Geometry { device } => {
                let index = self.resolve(device)?;
                let geometry = self.registry.geometry(index)?;
                format!(
                    "geometry {} {}",
                    self.name(index),
                    serde_json::to_string(&geometry)?
                )
            }
            HostCommand::Info { device } => {
                let infos = match device {
                    Some(device) => vec![self.registry.info(self.resolve(device)?)?],
                    None => self.registry.infos(),
                };
                return infos
                    .iter()
                    .map(|info| Ok(format!("info {}", serde_json::to_string(info)?)))
                    .collect();
            }
            HostCommand::MediaChanged { device } => {
                let index = self.resolve(device)?;
                format!(
                    "media {} changed={}",
                    self.name(index),
                    self.registry.media_changed(index)?
                )
            }
            HostCommand::Expire { device } => {
                let index = self.resolve(device)?;
                self.registry.expire(index)?;
                format!("expire {}", self.name(index))
            }
            HostCommand::Diagnostics => {
                let events = self.registry.diagnostics().events();
                if events.is_empty() {
                    return Ok(vec!["diagnostics: none".to_string()]);
                }
                return Ok(events
                    .iter()
                    .map(|event| format!("diagnostic {}", event))
                    .collect());
            }
            HostCommand::Wait { millis } => {
                thread::sleep(Duration::from_millis(*millis));
                format!("wait {}ms", millis)
            }
            HostCommand::Quit => {
                self.state = HostState::Shutdown;
                "quit".to_string()
            }
        };
        Ok(vec![line])
    }

    fn resolve(&self, device: &DeviceRef) -> Result<usize, HostRuntimeError> {
        match device {
            DeviceRef::Index(index) => Ok(self.registry.device(*index)?.index()),
            DeviceRef::Name(name) => self
                .registry
                .devices()
                .find(|disk| disk.name() == name)
                .map(|disk| disk.index())
                .ok_or_else(|| HostRuntimeError::UnknownDevice(name.clone())),
        }
    }

    fn name(&self, index: usize) -> String {
        self.registry
            .device(index)
            .map(|disk| disk.name().to_string())
            .unwrap_or_else(|_| index.to_string())
    }

    /// Buffer size for a transfer of `count` sectors
    ///
    /// Capped at the device capacity; a longer transfer is out of range
    /// anyway and the device reports it before touching the buffer.
    fn buffer_len(&self, index: usize, count: u64) -> Result<usize, HostRuntimeError> {
        let capacity = self.registry.device(index)?.capacity_bytes();
        let bytes = count
            .checked_mul(KERNEL_SECTOR_SIZE as u64)
            .ok_or(HostRuntimeError::TransferTooLarge(count))?;
        usize::try_from(bytes.min(capacity)).map_err(|_| HostRuntimeError::TransferTooLarge(count))
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Takes the output produced so far
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub fn step_count(&self) -> usize {
        self.steps
    }

    pub fn is_shut_down(&self) -> bool {
        self.state == HostState::Shutdown
    }

    /// Tears down every device
    pub fn shutdown(&mut self) {
        self.state = HostState::Shutdown;
        self.registry.destroy_all();
    }
}

/// Run-length summary of a buffer, e.g. `ab*512 00*512`
fn summarize(data: &[u8]) -> String {
    let mut runs: Vec<(u8, usize)> = Vec::new();
    for &byte in data {
        match runs.last_mut() {
            Some((last, len)) if *last == byte => *len += 1,
            _ => runs.push((byte, 1)),
        }
    }

    let mut parts: Vec<String> = runs
        .iter()
        .take(MAX_SUMMARY_RUNS)
        .map(|(byte, len)| format!("{:02x}*{}", byte, len))
        .collect();
    if runs.len() > MAX_SUMMARY_RUNS {
        parts.push("...".to_string());
    }
    parts.join(" ")
}
