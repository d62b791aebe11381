//! Dispatch Consistency Tests
//!
//! Validates that the three dispatch modes are interchangeable: the same
//! requests leave the same bytes on the device, fail the same way, and
//! report the same number of sectors.

use hal::KERNEL_SECTOR_SIZE;
use services_ramdisk::{
    BlockRequest, DiagnosticEvent, Direction, RamDiskConfig, RamDiskError, RequestMode, Segment,
};
use tests_resilience::{bootstrap_with, fill, is_zeroed, read_sectors, test_bootstrap, ALL_MODES};

/// A scattered write: three segments of 1, 2 and 3 sectors
fn scattered_write(registry: &services_ramdisk::DeviceRegistry, device: usize, start: u64) {
    let mut a = vec![0xA1u8; KERNEL_SECTOR_SIZE];
    let mut b = vec![0xB2u8; 2 * KERNEL_SECTOR_SIZE];
    let mut c = vec![0xC3u8; 3 * KERNEL_SECTOR_SIZE];
    let request = BlockRequest::new(Direction::Write, start)
        .with_segment(Segment::whole(&mut a))
        .with_segment(Segment::whole(&mut b))
        .with_segment(Segment::whole(&mut c));
    assert_eq!(registry.submit(device, request), Ok(6));
}

#[test]
fn test_modes_leave_identical_contents() {
    let snapshots: Vec<Vec<u8>> = ALL_MODES
        .into_iter()
        .map(|mode| {
            let registry = test_bootstrap(mode);
            scattered_write(&registry, 0, 10);
            fill(&registry, 0, 12, 0xEE, 1).unwrap();
            fill(&registry, 0, 1023, 0x01, 1).unwrap();
            registry.device(0).unwrap().snapshot()
        })
        .collect();

    assert_eq!(snapshots[0], snapshots[1]);
    assert_eq!(snapshots[1], snapshots[2]);

    let snapshot = &snapshots[0];
    let sector = |n: usize| &snapshot[n * KERNEL_SECTOR_SIZE..(n + 1) * KERNEL_SECTOR_SIZE];
    assert!(sector(10).iter().all(|&b| b == 0xA1));
    assert!(sector(11).iter().all(|&b| b == 0xB2));
    assert!(sector(12).iter().all(|&b| b == 0xEE));
    assert!(sector(13).iter().all(|&b| b == 0xC3));
    assert!(sector(15).iter().all(|&b| b == 0xC3));
    assert!(sector(16).iter().all(|&b| b == 0));
    assert!(sector(1023).iter().all(|&b| b == 0x01));
}

#[test]
fn test_scattered_read_matches_contiguous_read() {
    for mode in ALL_MODES {
        let registry = test_bootstrap(mode);
        scattered_write(&registry, 2, 0);

        let mut first = vec![0u8; 3 * KERNEL_SECTOR_SIZE];
        let mut second = vec![0u8; 3 * KERNEL_SECTOR_SIZE];
        let request = BlockRequest::new(Direction::Read, 0)
            .with_segment(Segment::whole(&mut first))
            .with_segment(Segment::whole(&mut second));
        assert_eq!(registry.submit(2, request), Ok(6));

        let contiguous = read_sectors(&registry, 2, 0, 6);
        assert_eq!([first, second].concat(), contiguous);
    }
}

#[test]
fn test_out_of_range_request_has_no_effect_in_any_mode() {
    for mode in ALL_MODES {
        let registry = test_bootstrap(mode);

        let mut head = vec![0x11u8; 2 * KERNEL_SECTOR_SIZE];
        let mut tail = vec![0x22u8; 4 * KERNEL_SECTOR_SIZE];
        let request = BlockRequest::new(Direction::Write, 1020)
            .with_segment(Segment::whole(&mut head))
            .with_segment(Segment::whole(&mut tail));

        assert_eq!(
            registry.submit(0, request),
            Err(RamDiskError::OutOfRange {
                device: 0,
                sector: 1022,
                sectors: 4,
                capacity: 512 * 1024,
            }),
            "mode {}",
            mode
        );
        assert!(is_zeroed(&registry, 0), "mode {}", mode);
        assert_eq!(
            registry.diagnostics().count(|e| matches!(e, DiagnosticEvent::OutOfRange { .. })),
            1
        );
    }
}

#[test]
fn test_exactly_full_device_transfer() {
    for mode in ALL_MODES {
        let registry = test_bootstrap(mode);
        assert_eq!(fill(&registry, 1, 0, 0xFF, 1024), Ok(1024));
        assert!(registry
            .device(1)
            .unwrap()
            .snapshot()
            .iter()
            .all(|&b| b == 0xFF));
        assert!(fill(&registry, 1, 1, 0xFF, 1024).unwrap_err().is_io_error());
    }
}

#[test]
fn test_pass_through_rejected_in_every_mode() {
    for mode in ALL_MODES {
        let registry = test_bootstrap(mode);
        assert_eq!(
            registry.submit(3, BlockRequest::pass_through()),
            Err(RamDiskError::Unsupported { device: 3 })
        );
        assert_eq!(
            registry.diagnostics().events(),
            vec![DiagnosticEvent::PassThroughRejected { device: 3 }]
        );
        assert!(is_zeroed(&registry, 3));
    }
}

#[test]
fn test_large_logical_sectors_still_use_kernel_addressing() {
    for mode in ALL_MODES {
        let config = RamDiskConfig::default()
            .with_request_mode(mode)
            .with_sectors(64)
            .with_sector_size(4096);
        let registry = bootstrap_with(config);
        let disk = registry.device(0).unwrap();

        assert_eq!(disk.kernel_sectors(), 512);
        assert_eq!(registry.geometry(0).unwrap().cylinders, 1);

        fill(&registry, 0, 511, 0x3C, 1).unwrap();
        assert_eq!(read_sectors(&registry, 0, 511, 1), vec![0x3C; 512]);
        assert!(fill(&registry, 0, 512, 0x3C, 1).is_err());
    }
}

#[test]
fn test_mode_selected_from_json() {
    for (selector, expected) in [
        ("0", RequestMode::Simple),
        ("1", RequestMode::Clustered),
        ("2", RequestMode::Direct),
        (r#""full""#, RequestMode::Clustered),
        (r#""noqueue""#, RequestMode::Direct),
    ] {
        let config =
            RamDiskConfig::from_json(&format!(r#"{{ "request_mode": {} }}"#, selector)).unwrap();
        assert_eq!(bootstrap_with(config).mode(), expected);
    }
}
