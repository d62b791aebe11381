/// Block device abstraction for RAM-backed storage
///
/// Provides sector-addressed reads and writes over a fixed-size, contiguous
/// in-memory byte store. Callers always address the device in kernel sectors
/// (512 bytes), regardless of the logical sector size the device advertises.
use core::fmt;
use core::ops::Range;

/// Size of the addressing unit used by every request (512 bytes)
pub const KERNEL_SECTOR_SIZE: usize = 512;

/// Block device errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    /// Byte range extends beyond the device capacity
    OutOfRange {
        offset: u64,
        length: u64,
        capacity: u64,
    },
    /// Caller buffer is shorter than the requested transfer
    BufferTooSmall { required: usize, actual: usize },
    /// Backing memory could not be allocated
    AllocationFailed { bytes: u64 },
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange {
                offset,
                length,
                capacity,
            } => write!(
                f,
                "beyond-end transfer (offset {} length {} capacity {})",
                offset, length, capacity
            ),
            Self::BufferTooSmall { required, actual } => {
                write!(f, "buffer too small ({} < {} bytes)", actual, required)
            }
            Self::AllocationFailed { bytes } => {
                write!(f, "failed to allocate {} bytes of backing store", bytes)
            }
        }
    }
}

impl std::error::Error for BlockError {}

/// Block device trait
///
/// Implementers provide sector-level read/write operations. A transfer is
/// either applied in full or not at all.
pub trait BlockDevice {
    /// Total capacity in bytes
    fn capacity_bytes(&self) -> u64;

    /// Total capacity in kernel sectors
    fn sector_count(&self) -> u64 {
        self.capacity_bytes() / KERNEL_SECTOR_SIZE as u64
    }

    /// Read `count` sectors starting at `sector` into `buffer`
    ///
    /// # Errors
    /// Returns `BlockError::OutOfRange` if the range ends past capacity.
    /// Returns `BlockError::BufferTooSmall` if `buffer` cannot hold the range.
    fn read_sectors(&self, sector: u64, count: u64, buffer: &mut [u8]) -> Result<(), BlockError>;

    /// Write `count` sectors starting at `sector` from `buffer`
    ///
    /// # Errors
    /// Returns `BlockError::OutOfRange` if the range ends past capacity.
    /// Returns `BlockError::BufferTooSmall` if `buffer` is shorter than the range.
    fn write_sectors(&mut self, sector: u64, count: u64, buffer: &[u8])
        -> Result<(), BlockError>;
}

/// Computes the byte range covered by `count` sectors starting at `sector`
///
/// Fails with `OutOfRange` when the range ends past `capacity`, including
/// when the arithmetic itself would overflow.
pub fn sector_range(sector: u64, count: u64, capacity: u64) -> Result<Range<usize>, BlockError> {
    let unit = KERNEL_SECTOR_SIZE as u64;
    let out_of_range = BlockError::OutOfRange {
        offset: sector.saturating_mul(unit),
        length: count.saturating_mul(unit),
        capacity,
    };

    let offset = sector.checked_mul(unit).ok_or(out_of_range)?;
    let length = count.checked_mul(unit).ok_or(out_of_range)?;
    let end = offset.checked_add(length).ok_or(out_of_range)?;
    if end > capacity {
        return Err(out_of_range);
    }

    Ok(offset as usize..end as usize)
}

/// Backing store - a zero-initialized, contiguous byte array
///
/// Volatile: contents are lost when the store is dropped.
pub struct BackingStore {
    data: Vec<u8>,
}

impl BackingStore {
    /// Allocates a zero-filled store of `capacity_bytes`
    ///
    /// # Errors
    /// Returns `BlockError::AllocationFailed` if the memory cannot be reserved.
    pub fn new(capacity_bytes: u64) -> Result<Self, BlockError> {
        let failed = BlockError::AllocationFailed {
            bytes: capacity_bytes,
        };
        let len = usize::try_from(capacity_bytes).map_err(|_| failed)?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|_| failed)?;
        data.resize(len, 0);

        Ok(Self { data })
    }

    /// Fills the whole store with zeroes
    pub fn zero(&mut self) {
        self.data.fill(0);
    }

    /// Returns the raw contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackingStore")
            .field("capacity_bytes", &self.data.len())
            .finish()
    }
}

impl BlockDevice for BackingStore {
    fn capacity_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_sectors(&self, sector: u64, count: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        let range = sector_range(sector, count, self.capacity_bytes())?;
        let length = range.len();
        if buffer.len() < length {
            return Err(BlockError::BufferTooSmall {
                required: length,
                actual: buffer.len(),
            });
        }

        buffer[..length].copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_sectors(
        &mut self,
        sector: u64,
        count: u64,
        buffer: &[u8],
    ) -> Result<(), BlockError> {
        let range = sector_range(sector, count, self.capacity_bytes())?;
        let length = range.len();
        if buffer.len() < length {
            return Err(BlockError::BufferTooSmall {
                required: length,
                actual: buffer.len(),
            });
        }

        self.data[range].copy_from_slice(&buffer[..length]);
        Ok(())
    }
}
