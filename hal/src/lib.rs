//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the storage-medium abstraction for the RAM disk.
//!
//! ## Philosophy
//!
//! **The medium is dumb; policy lives above it.**
//!
//! The HAL knows how to move whole sectors between a caller buffer and the
//! backing bytes. It knows nothing about open counts, media changes or
//! request queues.
//!
//! ## Design Principles
//!
//! 1. **All-or-nothing transfers**: a rejected transfer changes no bytes
//! 2. **Trait-based**: the dispatcher only sees `BlockDevice`
//! 3. **No unsafe**: the store is a plain `Vec<u8>`
//! 4. **Testable**: every error path is reachable from safe code

pub mod block_device;

pub use block_device::{sector_range, BackingStore, BlockDevice, BlockError, KERNEL_SECTOR_SIZE};
