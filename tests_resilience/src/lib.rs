//! Resilience Test Utilities
//!
//! Shared helpers for the RAM disk integration tests.
//!
//! ## Test Philosophy
//!
//! - **Safety under faults**: bad requests and failed startups leave no partial state
//! - **Deterministic failures**: allocation faults are injected, never provoked
//! - **Mode independence**: every dispatch mode leaves the same bytes behind
//! - **Consistency under concurrency**: open counts and media state never tear

use hal::KERNEL_SECTOR_SIZE;
use services_ramdisk::{
    BlockRequest, Completion, DeviceRegistry, RamDiskConfig, RequestMode,
};

/// Every dispatch mode, in selector order
pub const ALL_MODES: [RequestMode; 3] = [
    RequestMode::Simple,
    RequestMode::Clustered,
    RequestMode::Direct,
];

/// Bootstrap helper for tests
///
/// Creates a default-sized registry using `mode`.
pub fn test_bootstrap(mode: RequestMode) -> DeviceRegistry {
    bootstrap_with(RamDiskConfig::default().with_request_mode(mode))
}

/// Creates a registry from `config`, panicking on failure
pub fn bootstrap_with(config: RamDiskConfig) -> DeviceRegistry {
    DeviceRegistry::create(config).expect("registry creation failed")
}

/// Fills `count` sectors at `sector` with `byte`
pub fn fill(registry: &DeviceRegistry, device: usize, sector: u64, byte: u8, count: usize) -> Completion {
    let mut data = vec![byte; count * KERNEL_SECTOR_SIZE];
    registry.submit(device, BlockRequest::write(sector, &mut data))
}

/// Reads `count` sectors at `sector`
pub fn read_sectors(registry: &DeviceRegistry, device: usize, sector: u64, count: usize) -> Vec<u8> {
    let mut data = vec![0u8; count * KERNEL_SECTOR_SIZE];
    registry
        .submit(device, BlockRequest::read(sector, &mut data))
        .expect("read failed");
    data
}

/// Returns true if every byte of device `device` is zero
pub fn is_zeroed(registry: &DeviceRegistry, device: usize) -> bool {
    registry
        .device(device)
        .map(|disk| disk.snapshot().iter().all(|&b| b == 0))
        .unwrap_or(false)
}
