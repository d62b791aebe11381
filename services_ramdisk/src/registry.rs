//! # Device Registry
//!
//! Owns the fixed set of RAM disks and routes requests and lifecycle calls
//! to them by index.
//!
//! The registry is built all-or-nothing: if any device fails to allocate,
//! every device created so far is torn down and creation fails. Devices are
//! never added or removed afterwards. Teardown disarms each idle timer before
//! releasing the store it guards.

use crate::config::RamDiskConfig;
use crate::device::{DeviceInfo, RamDisk};
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::dispatch::{Completion, Dispatcher, RequestHandler, RequestMode};
use crate::error::{RamDiskError, Result};
use crate::geometry::Geometry;
use crate::request::BlockRequest;
use std::sync::Arc;

/// Startup allocation behaviour
///
/// `FailOnDevice` simulates the allocation of one device's store failing,
/// so the rollback path can be exercised without exhausting memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPolicy {
    #[default]
    Normal,
    FailOnDevice(usize),
}

impl AllocationPolicy {
    fn fails(&self, index: usize) -> bool {
        matches!(self, AllocationPolicy::FailOnDevice(failing) if *failing == index)
    }
}

/// The fixed collection of devices
pub struct DeviceRegistry {
    devices: Vec<RamDisk>,
    dispatcher: Dispatcher,
    config: RamDiskConfig,
    diagnostics: Arc<Diagnostics>,
}

impl DeviceRegistry {
    /// Creates every configured device
    pub fn create(config: RamDiskConfig) -> Result<Self> {
        Self::create_with(config, Arc::new(Diagnostics::new()), AllocationPolicy::Normal)
    }

    /// Creates every configured device, reporting into `diagnostics`
    pub fn create_with(
        config: RamDiskConfig,
        diagnostics: Arc<Diagnostics>,
        policy: AllocationPolicy,
    ) -> Result<Self> {
        config.validate()?;
        let mode = config.request_mode(&diagnostics);

        let mut registry = Self {
            devices: Vec::with_capacity(config.device_count),
            dispatcher: Dispatcher::for_mode(mode),
            config,
            diagnostics,
        };

        for index in 0..registry.config.device_count {
            match registry.create_device(index, policy) {
                Ok(device) => registry.devices.push(device),
                Err(err) => {
                    log::warn!(
                        "ramdisk: device {} failed ({}), releasing {} created devices",
                        index,
                        err,
                        registry.devices.len()
                    );
                    registry.destroy_all();
                    return Err(err);
                }
            }
        }

        log::info!(
            "ramdisk: {} devices of {} bytes, request mode {}",
            registry.devices.len(),
            registry.config.capacity_bytes().unwrap_or(0),
            mode
        );
        Ok(registry)
    }

    fn create_device(&self, index: usize, policy: AllocationPolicy) -> Result<RamDisk> {
        if policy.fails(index) {
            let bytes = self.config.capacity_bytes()?;
            self.diagnostics
                .record(DiagnosticEvent::AllocationFailure { device: index, bytes });
            return Err(RamDiskError::AllocationFailure {
                device: index,
                bytes,
            });
        }
        RamDisk::new(index, &self.config, self.diagnostics.clone())
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn mode(&self) -> RequestMode {
        self.dispatcher.mode()
    }

    pub fn config(&self) -> &RamDiskConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    pub fn device(&self, index: usize) -> Result<&RamDisk> {
        self.devices
            .get(index)
            .ok_or(RamDiskError::NoSuchDevice(index))
    }

    pub fn devices(&self) -> impl Iterator<Item = &RamDisk> {
        self.devices.iter()
    }

    /// Dispatches `request` to device `index` with the configured strategy
    pub fn submit(&self, index: usize, request: BlockRequest<'_>) -> Completion {
        let device = self.device(index)?;
        self.dispatcher.submit(device, request)
    }

    pub fn open(&self, index: usize) -> Result<u32> {
        Ok(self.device(index)?.open())
    }

    pub fn close(&self, index: usize) -> Result<u32> {
        self.device(index)?.close()
    }

    pub fn geometry(&self, index: usize) -> Result<Geometry> {
        Ok(self.device(index)?.geometry())
    }

    pub fn media_changed(&self, index: usize) -> Result<bool> {
        Ok(self.device(index)?.media_changed())
    }

    pub fn info(&self, index: usize) -> Result<DeviceInfo> {
        Ok(self.device(index)?.info())
    }

    pub fn infos(&self) -> Vec<DeviceInfo> {
        self.devices.iter().map(RamDisk::info).collect()
    }

    /// Fires device `index`'s idle timeout now
    pub fn expire(&self, index: usize) -> Result<()> {
        self.device(index)?.idle_timeout_fires();
        Ok(())
    }

    /// Disarms every timer and releases every store
    ///
    /// Idempotent; safe on a partially built registry.
    pub fn destroy_all(&mut self) {
        if self.devices.is_empty() {
            return;
        }
        for device in &self.devices {
            device.shutdown();
        }
        let released = self.devices.len();
        self.devices.clear();
        log::info!("ramdisk: released {} devices", released);
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices)
            .field("mode", &self.dispatcher.mode())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, RequestModeSelector};
    use crate::request::{Direction, Segment};
    use hal::KERNEL_SECTOR_SIZE;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::create(RamDiskConfig::default()).unwrap()
    }

    #[test]
    fn test_create_default_registry() {
        let registry = registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.mode(), RequestMode::Simple);

        let names: Vec<String> = registry.infos().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["rda", "rdb", "rdc", "rdd"]);
        assert!(registry.diagnostics().is_empty());
    }

    #[test]
    fn test_write_then_read_sector_zero() {
        let registry = registry();
        let mut data = vec![0xABu8; KERNEL_SECTOR_SIZE];
        assert_eq!(registry.submit(0, BlockRequest::write(0, &mut data)), Ok(1));

        let mut out = vec![0u8; KERNEL_SECTOR_SIZE];
        assert_eq!(registry.submit(0, BlockRequest::read(0, &mut out)), Ok(1));
        assert_eq!(out, vec![0xAB; KERNEL_SECTOR_SIZE]);
    }

    #[test]
    fn test_devices_are_independent() {
        let registry = registry();
        let mut data = vec![0x42u8; KERNEL_SECTOR_SIZE];
        registry.submit(1, BlockRequest::write(7, &mut data)).unwrap();

        assert!(registry.device(0).unwrap().snapshot().iter().all(|&b| b == 0));
        assert!(registry.device(2).unwrap().snapshot().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_unknown_device() {
        let registry = registry();
        let mut data = vec![0u8; KERNEL_SECTOR_SIZE];
        assert_eq!(
            registry.submit(9, BlockRequest::read(0, &mut data)),
            Err(RamDiskError::NoSuchDevice(9))
        );
        assert_eq!(registry.open(4), Err(RamDiskError::NoSuchDevice(4)));
        assert_eq!(registry.geometry(4), Err(RamDiskError::NoSuchDevice(4)));
    }

    #[test]
    fn test_geometry_query() {
        let registry = registry();
        let geometry = registry.geometry(0).unwrap();
        assert_eq!(geometry.cylinders, 16);
        assert_eq!(geometry.heads, 4);
        assert_eq!(geometry.sectors, 16);
        assert_eq!(geometry.start, 4);
    }

    #[test]
    fn test_bad_mode_falls_back_with_warning() {
        let config = RamDiskConfig::default().with_request_mode(RequestModeSelector::Index(5));
        let registry = DeviceRegistry::create(config).unwrap();

        assert_eq!(registry.mode(), RequestMode::Simple);
        assert_eq!(
            registry.diagnostics().events(),
            vec![DiagnosticEvent::BadRequestMode {
                selector: "5".to_string()
            }]
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RamDiskConfig::default().with_sector_size(700);
        assert_eq!(
            DeviceRegistry::create(config).unwrap_err(),
            RamDiskError::Config(ConfigError::SectorSize(700))
        );
    }

    #[test]
    fn test_allocation_failure_rolls_back() {
        let diagnostics = Arc::new(Diagnostics::new());
        let result = DeviceRegistry::create_with(
            RamDiskConfig::default(),
            diagnostics.clone(),
            AllocationPolicy::FailOnDevice(2),
        );

        assert_eq!(
            result.unwrap_err(),
            RamDiskError::AllocationFailure {
                device: 2,
                bytes: 512 * 1024,
            }
        );
        assert_eq!(
            diagnostics.events(),
            vec![DiagnosticEvent::AllocationFailure {
                device: 2,
                bytes: 512 * 1024,
            }]
        );
        // Devices 0 and 1 and their timer workers released their handles.
        assert_eq!(Arc::strong_count(&diagnostics), 1);
    }

    #[test]
    fn test_destroy_all_is_idempotent() {
        let mut registry = registry();
        registry.open(0).unwrap();
        registry.close(0).unwrap();

        registry.destroy_all();
        assert!(registry.is_empty());
        registry.destroy_all();

        assert_eq!(registry.open(0), Err(RamDiskError::NoSuchDevice(0)));
        assert_eq!(Arc::strong_count(registry.diagnostics()), 1);
    }

    #[test]
    fn test_expire_and_reopen() {
        let registry = registry();
        let mut data = vec![0x99u8; 2 * KERNEL_SECTOR_SIZE];
        registry.open(3).unwrap();
        registry
            .submit(
                3,
                BlockRequest::new(Direction::Write, 0).with_segment(Segment::whole(&mut data)),
            )
            .unwrap();
        registry.close(3).unwrap();

        registry.expire(3).unwrap();
        assert_eq!(registry.media_changed(3), Ok(true));

        registry.open(3).unwrap();
        assert_eq!(registry.media_changed(3), Ok(false));
        assert!(registry.device(3).unwrap().snapshot().iter().all(|&b| b == 0));
    }
}
