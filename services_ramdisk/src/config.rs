//! # Configuration
//!
//! Startup parameters for the RAM disk registry.
//!
//! All values are fixed once the registry is created. Missing fields take
//! their defaults, so `{}` is a valid configuration.

use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::dispatch::RequestMode;
use hal::KERNEL_SECTOR_SIZE;
use lifecycle::Timeout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Minor numbers reserved per device (one whole disk plus partitions)
pub const MINORS_PER_DEVICE: u32 = 16;

/// Minor numbers available under one major
pub const MINORS_PER_MAJOR: u32 = 256;

/// Upper bound on the device count
pub const MAX_DEVICES: usize = (MINORS_PER_MAJOR / MINORS_PER_DEVICE) as usize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Device count must be between 1 and {max}, got {got}")]
    DeviceCount { got: usize, max: usize },

    #[error("Device size must be at least one sector")]
    EmptyDevice,

    #[error("Logical sector size {0} is not a non-zero multiple of 512")]
    SectorSize(usize),

    #[error("Device capacity overflows: {sectors} sectors of {sector_size} bytes")]
    CapacityOverflow { sectors: u64, sector_size: usize },

    #[error("Device name prefix must not be empty")]
    EmptyNamePrefix,
}

/// Request-mode selector as written in configuration
///
/// Accepts the numeric selector (0 simple, 1 full, 2 noqueue) or a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestModeSelector {
    Index(i64),
    Name(String),
}

impl RequestModeSelector {
    /// Resolves the selector, returning None for unknown values
    pub fn resolve(&self) -> Option<RequestMode> {
        match self {
            Self::Index(0) => Some(RequestMode::Simple),
            Self::Index(1) => Some(RequestMode::Clustered),
            Self::Index(2) => Some(RequestMode::Direct),
            Self::Index(_) => None,
            Self::Name(name) => match name.trim().to_ascii_lowercase().as_str() {
                "simple" => Some(RequestMode::Simple),
                "full" | "clustered" => Some(RequestMode::Clustered),
                "noqueue" | "direct" => Some(RequestMode::Direct),
                _ => None,
            },
        }
    }
}

impl Default for RequestModeSelector {
    fn default() -> Self {
        Self::Index(0)
    }
}

impl fmt::Display for RequestModeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<RequestMode> for RequestModeSelector {
    fn from(mode: RequestMode) -> Self {
        Self::Index(mode as i64)
    }
}

/// RAM disk registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RamDiskConfig {
    /// Number of devices in the registry
    pub device_count: usize,
    /// Size of each device in logical sectors
    pub sectors_per_device: u64,
    /// Logical (hardware) sector size in bytes
    pub logical_sector_size: usize,
    /// Request dispatch strategy
    pub request_mode: RequestModeSelector,
    /// Idle time after the last close before media is flagged as removed
    pub idle_timeout_ms: u64,
    /// Device name prefix; device `i` is `<prefix><'a' + i>`
    pub name_prefix: String,
}

impl Default for RamDiskConfig {
    fn default() -> Self {
        Self {
            device_count: 4,
            sectors_per_device: 1024,
            logical_sector_size: KERNEL_SECTOR_SIZE,
            request_mode: RequestModeSelector::default(),
            idle_timeout_ms: 30_000,
            name_prefix: "rd".to_string(),
        }
    }
}

impl RamDiskConfig {
    /// Parses a JSON configuration
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn with_devices(mut self, device_count: usize) -> Self {
        self.device_count = device_count;
        self
    }

    pub fn with_sectors(mut self, sectors_per_device: u64) -> Self {
        self.sectors_per_device = sectors_per_device;
        self
    }

    pub fn with_sector_size(mut self, logical_sector_size: usize) -> Self {
        self.logical_sector_size = logical_sector_size;
        self
    }

    pub fn with_request_mode(mut self, selector: impl Into<RequestModeSelector>) -> Self {
        self.request_mode = selector.into();
        self
    }

    pub fn with_idle_timeout_ms(mut self, idle_timeout_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    /// Checks every field, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_count == 0 || self.device_count > MAX_DEVICES {
            return Err(ConfigError::DeviceCount {
                got: self.device_count,
                max: MAX_DEVICES,
            });
        }
        if self.sectors_per_device == 0 {
            return Err(ConfigError::EmptyDevice);
        }
        if self.logical_sector_size == 0 || self.logical_sector_size % KERNEL_SECTOR_SIZE != 0 {
            return Err(ConfigError::SectorSize(self.logical_sector_size));
        }
        if self.name_prefix.is_empty() {
            return Err(ConfigError::EmptyNamePrefix);
        }
        self.capacity_bytes()?;
        Ok(())
    }

    /// Capacity of each device in bytes
    pub fn capacity_bytes(&self) -> Result<u64, ConfigError> {
        self.sectors_per_device
            .checked_mul(self.logical_sector_size as u64)
            .ok_or(ConfigError::CapacityOverflow {
                sectors: self.sectors_per_device,
                sector_size: self.logical_sector_size,
            })
    }

    /// Idle timeout as a lifecycle timeout
    pub fn idle_timeout(&self) -> Timeout {
        Timeout::from_millis(self.idle_timeout_ms)
    }

    /// Resolves the request mode, falling back to simple on a bad selector
    pub fn request_mode(&self, diagnostics: &Diagnostics) -> RequestMode {
        match self.request_mode.resolve() {
            Some(mode) => mode,
            None => {
                diagnostics.record(DiagnosticEvent::BadRequestMode {
                    selector: self.request_mode.to_string(),
                });
                RequestMode::Simple
            }
        }
    }

    /// Name of device `index`
    pub fn device_name(&self, index: usize) -> String {
        let suffix = char::from(b'a' + (index % 26) as u8);
        format!("{}{}", self.name_prefix, suffix)
    }
}
