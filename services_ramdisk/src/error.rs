//! Error types for the RAM disk service.

use crate::config::ConfigError;
use hal::BlockError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RamDiskError {
    #[error("Beyond-end transfer on device {device}: sector {sector}, {sectors} sectors (capacity {capacity} bytes)")]
    OutOfRange {
        device: usize,
        sector: u64,
        sectors: u64,
        capacity: u64,
    },

    #[error("Non-storage request rejected by device {device}")]
    Unsupported { device: usize },

    #[error("Allocation failure for device {device} ({bytes} bytes)")]
    AllocationFailure { device: usize, bytes: u64 },

    #[error("Buffer too small on device {device}: {actual} < {required} bytes")]
    BufferTooSmall {
        device: usize,
        required: usize,
        actual: usize,
    },

    #[error("Device not found: {0}")]
    NoSuchDevice(usize),

    #[error("Device {0} is not open")]
    NotOpen(usize),

    #[error("Idle timer failure on device {device}: {reason}")]
    Timer { device: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl RamDiskError {
    /// Lifts a HAL error for a transfer of `sectors` at `sector` on `device`
    pub fn from_block(device: usize, sector: u64, sectors: u64, err: BlockError) -> Self {
        match err {
            BlockError::OutOfRange { capacity, .. } => Self::OutOfRange {
                device,
                sector,
                sectors,
                capacity,
            },
            BlockError::BufferTooSmall { required, actual } => Self::BufferTooSmall {
                device,
                required,
                actual,
            },
            BlockError::AllocationFailed { bytes } => Self::AllocationFailure { device, bytes },
        }
    }

    /// Returns true for errors that complete a request with an I/O failure
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange { .. } | Self::Unsupported { .. } | Self::BufferTooSmall { .. }
        )
    }
}

/// Result alias used across the service
pub type Result<T> = std::result::Result<T, RamDiskError>;
