//! Synthetic legacy geometry.
//!
//! A RAM disk has no platters, so it claims four heads of sixteen sectors
//! each, puts the start of data at sector four, and derives the cylinder
//! count from the capacity.

use serde::Serialize;

pub const HEADS: u8 = 4;
pub const SECTORS_PER_TRACK: u8 = 16;
pub const START_SECTOR: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub cylinders: u64,
    pub heads: u8,
    pub sectors: u8,
    pub start: u64,
}

impl Geometry {
    /// Derives geometry from capacity and logical sector size
    pub fn from_capacity(capacity_bytes: u64, logical_sector_size: usize) -> Self {
        let total_sectors = match logical_sector_size {
            0 => 0,
            size => capacity_bytes / size as u64,
        };
        Self {
            cylinders: (total_sectors & !0x3F) >> 6,
            heads: HEADS,
            sectors: SECTORS_PER_TRACK,
            start: START_SECTOR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_geometry() {
        let geometry = Geometry::from_capacity(1024 * 512, 512);
        assert_eq!(
            geometry,
            Geometry {
                cylinders: 16,
                heads: 4,
                sectors: 16,
                start: 4,
            }
        );
    }

    #[test]
    fn test_partial_cylinder_is_dropped() {
        assert_eq!(Geometry::from_capacity(127 * 512, 512).cylinders, 1);
        assert_eq!(Geometry::from_capacity(63 * 512, 512).cylinders, 0);
    }

    #[test]
    fn test_large_logical_sectors() {
        // 1024 sectors of 4 KiB each still count as 1024 addressable sectors.
        assert_eq!(Geometry::from_capacity(1024 * 4096, 4096).cylinders, 16);
    }

    #[test]
    fn test_zero_sector_size() {
        assert_eq!(Geometry::from_capacity(4096, 0).cylinders, 0);
    }
}
