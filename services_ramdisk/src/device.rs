//! # RAM Disk Device
//!
//! Per-device state and the lifecycle controller.
//!
//! ## State machine
//!
//! ```text
//!            open                     open / close (count > 1)
//!   Closed ─────────▶ Open(count) ◀──────────────┐
//!     ▲                  │  └────────────────────┘
//!     │   close (→ 0)    │
//!     └──────────────────┘   arms the idle timer
//! ```
//!
//! The idle timer only does something in `Closed`: it flags the media as
//! removed. The next `open` sees the flag and zeroes the store before
//! counting the user in. `open_count` and `media_present` are only touched
//! under the device lock, and zeroing completes before that lock is released.

use crate::config::{RamDiskConfig, MINORS_PER_DEVICE};
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::error::{RamDiskError, Result};
use crate::geometry::Geometry;
use crate::request::Direction;
use hal::{sector_range, BackingStore, BlockDevice, BlockError, KERNEL_SECTOR_SIZE};
use lifecycle::{DeferredTimer, LifecycleError, Timeout};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;

/// Lock-protected media state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MediaState {
    open_count: u32,
    media_present: bool,
}

/// Snapshot of a device for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub first_minor: u32,
    pub minors: u32,
    pub capacity_bytes: u64,
    /// Capacity in 512-byte kernel sectors
    pub kernel_sectors: u64,
    pub logical_sector_size: usize,
    pub open_count: u32,
    pub media_present: bool,
}

/// One RAM-backed block device
pub struct RamDisk {
    index: usize,
    name: String,
    logical_sector_size: usize,
    capacity_bytes: u64,
    store: RwLock<BackingStore>,
    state: Arc<Mutex<MediaState>>,
    idle_timer: DeferredTimer,
    idle_timeout: Timeout,
    diagnostics: Arc<Diagnostics>,
}

impl RamDisk {
    /// Allocates the store and starts the idle timer for device `index`
    ///
    /// Failures are recorded as `AllocationFailure` diagnostics.
    pub fn new(index: usize, config: &RamDiskConfig, diagnostics: Arc<Diagnostics>) -> Result<Self> {
        let capacity_bytes = config.capacity_bytes()?;
        let allocation_failure = |diagnostics: &Diagnostics| {
            diagnostics.record(DiagnosticEvent::AllocationFailure {
                device: index,
                bytes: capacity_bytes,
            });
            RamDiskError::AllocationFailure {
                device: index,
                bytes: capacity_bytes,
            }
        };

        let store = match BackingStore::new(capacity_bytes) {
            Ok(store) => store,
            Err(BlockError::AllocationFailed { .. }) => return Err(allocation_failure(&diagnostics)),
            Err(err) => return Err(RamDiskError::from_block(index, 0, 0, err)),
        };

        let name = config.device_name(index);
        let state = Arc::new(Mutex::new(MediaState {
            open_count: 0,
            media_present: true,
        }));

        let timer_state = state.clone();
        let timer_diagnostics = diagnostics.clone();
        let idle_timer = DeferredTimer::spawn(name.clone(), move || {
            invalidate(index, &timer_state, &timer_diagnostics)
        })
        .map_err(|err| {
            log::error!("dev={} cannot start idle timer: {}", index, err);
            allocation_failure(&diagnostics)
        })?;

        log::debug!(
            "dev={} name={} capacity={} bytes sector_size={}",
            index,
            name,
            capacity_bytes,
            config.logical_sector_size
        );

        Ok(Self {
            index,
            name,
            logical_sector_size: config.logical_sector_size,
            capacity_bytes,
            store: RwLock::new(store),
            state,
            idle_timer,
            idle_timeout: config.idle_timeout(),
            diagnostics,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn logical_sector_size(&self) -> usize {
        self.logical_sector_size
    }

    /// Capacity in 512-byte kernel sectors
    pub fn kernel_sectors(&self) -> u64 {
        self.capacity_bytes / KERNEL_SECTOR_SIZE as u64
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Checks that a transfer fits the device and the caller buffer
    ///
    /// Out-of-range requests are recorded as diagnostics.
    pub fn check_transfer(&self, sector: u64, count: u64, buffer_len: usize) -> Result<()> {
        let range = sector_range(sector, count, self.capacity_bytes)
            .map_err(|err| self.reject(sector, count, err))?;
        if buffer_len < range.len() {
            return Err(RamDiskError::BufferTooSmall {
                device: self.index,
                required: range.len(),
                actual: buffer_len,
            });
        }
        Ok(())
    }

    /// Copies `count` sectors at `sector` between the store and `buffer`
    ///
    /// Either the whole range is copied or nothing is.
    pub fn transfer(
        &self,
        sector: u64,
        count: u64,
        buffer: &mut [u8],
        direction: Direction,
    ) -> Result<()> {
        log::trace!(
            "req dev={} dir={} sec={} nr={}",
            self.index,
            direction,
            sector,
            count
        );

        let outcome = match direction {
            Direction::Read => self.store.read().read_sectors(sector, count, buffer),
            Direction::Write => self.store.write().write_sectors(sector, count, buffer),
        };
        outcome.map_err(|err| self.reject(sector, count, err))
    }

    fn reject(&self, sector: u64, count: u64, err: BlockError) -> RamDiskError {
        if let BlockError::OutOfRange {
            offset,
            length,
            capacity,
        } = err
        {
            self.diagnostics.record(DiagnosticEvent::OutOfRange {
                device: self.index,
                offset,
                length,
                capacity,
            });
        }
        RamDiskError::from_block(self.index, sector, count, err)
    }

    /// Counts a user in, revalidating ejected media first
    ///
    /// Returns the new open count.
    pub fn open(&self) -> u32 {
        // Wait out an in-flight invalidation before taking the lock it needs.
        self.idle_timer.cancel();

        let mut state = self.state.lock();
        if state.open_count == 0 && !state.media_present {
            self.revalidate(&mut state);
        }
        state.open_count += 1;

        log::debug!("dev={} open users={}", self.index, state.open_count);
        state.open_count
    }

    /// Counts a user out, arming the idle timer when the last one leaves
    ///
    /// Returns the new open count.
    pub fn close(&self) -> Result<u32> {
        let mut state = self.state.lock();
        if state.open_count == 0 {
            return Err(RamDiskError::NotOpen(self.index));
        }
        state.open_count -= 1;

        if state.open_count == 0 {
            if let Err(err) = self.idle_timer.arm(self.idle_timeout) {
                log::warn!("dev={} idle timer not armed: {}", self.index, err);
                return Err(timer_error(self.index, err));
            }
        }

        log::debug!("dev={} release users={}", self.index, state.open_count);
        Ok(state.open_count)
    }

    /// Runs the idle-timeout action immediately
    ///
    /// Same effect as the idle timer firing.
    pub fn idle_timeout_fires(&self) {
        invalidate(self.index, &self.state, &self.diagnostics);
    }

    fn revalidate(&self, state: &mut MediaState) {
        self.store.write().zero();
        state.media_present = true;
        log::info!("dev={} media changed, store revalidated", self.index);
    }

    pub fn open_count(&self) -> u32 {
        self.state.lock().open_count
    }

    pub fn is_media_present(&self) -> bool {
        self.state.lock().media_present
    }

    /// Returns true while the media is flagged as removed
    pub fn media_changed(&self) -> bool {
        !self.is_media_present()
    }

    /// Returns true while the idle timer is pending
    pub fn idle_timer_armed(&self) -> bool {
        self.idle_timer.is_armed()
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::from_capacity(self.capacity_bytes, self.logical_sector_size)
    }

    pub fn info(&self) -> DeviceInfo {
        let state = *self.state.lock();
        DeviceInfo {
            index: self.index,
            name: self.name.clone(),
            first_minor: self.index as u32 * MINORS_PER_DEVICE,
            minors: MINORS_PER_DEVICE,
            capacity_bytes: self.capacity_bytes,
            kernel_sectors: self.kernel_sectors(),
            logical_sector_size: self.logical_sector_size,
            open_count: state.open_count,
            media_present: state.media_present,
        }
    }

    /// Copies the whole store
    pub fn snapshot(&self) -> Vec<u8> {
        self.store.read().as_bytes().to_vec()
    }

    /// Disarms the idle timer and joins its worker
    pub fn shutdown(&self) {
        self.idle_timer.shutdown();
    }
}

impl std::fmt::Debug for RamDisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RamDisk")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("capacity_bytes", &self.capacity_bytes)
            .field("state", &*self.state.lock())
            .finish()
    }
}

fn timer_error(device: usize, err: LifecycleError) -> RamDiskError {
    RamDiskError::Timer {
        device,
        reason: err.to_string(),
    }
}

/// Idle-timer action: flag the media as removed if nobody holds the device
fn invalidate(device: usize, state: &Mutex<MediaState>, diagnostics: &Diagnostics) {
    let mut state = state.lock();
    if state.open_count != 0 {
        diagnostics.record(DiagnosticEvent::LifecycleInvariantViolation {
            device,
            open_count: state.open_count,
        });
        return;
    }
    state.media_present = false;
    log::debug!("dev={} idle timeout, media flagged as removed", device);
}
