//! # RAM Disk Service
//!
//! Emulated block devices backed by process memory.
//!
//! ## Philosophy
//!
//! - **Fixed set**: devices are created together at startup and destroyed together
//! - **All-or-nothing requests**: a request either transfers every segment or none
//! - **Diagnostics, not panics**: bad requests fail with an error and leave a record
//!
//! ## Example
//!
//! ```
//! use services_ramdisk::{BlockRequest, DeviceRegistry, RamDiskConfig};
//!
//! let registry = DeviceRegistry::create(RamDiskConfig::default()).unwrap();
//! let mut data = vec![0xAB; 512];
//! registry.submit(0, BlockRequest::write(0, &mut data)).unwrap();
//!
//! let mut out = vec![0; 512];
//! registry.submit(0, BlockRequest::read(0, &mut out)).unwrap();
//! assert_eq!(out, data);
//! ```

pub mod config;
pub mod device;
pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod geometry;
pub mod registry;
pub mod request;

pub use config::{ConfigError, RamDiskConfig, RequestModeSelector, MAX_DEVICES, MINORS_PER_DEVICE};
pub use device::{DeviceInfo, RamDisk};
pub use diagnostics::{DiagnosticEvent, Diagnostics};
pub use dispatch::{
    ClusteredHandler, Completion, DirectHandler, Dispatcher, RequestHandler, RequestMode,
    SimpleHandler,
};
pub use error::{RamDiskError, Result};
pub use geometry::Geometry;
pub use registry::{AllocationPolicy, DeviceRegistry};
pub use request::{Bio, BlockRequest, Direction, RequestKind, Segment};
pub use hal::KERNEL_SECTOR_SIZE;
