//! # Block Requests
//!
//! Request descriptors handed to the dispatcher.
//!
//! A request borrows its segment buffers for the duration of one dispatch
//! call and is consumed by it, so no buffer outlives the call that fills or
//! drains it.

use crate::error::RamDiskError;
use hal::KERNEL_SECTOR_SIZE;
use std::fmt;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub fn is_write(self) -> bool {
        self == Direction::Write
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// What a request is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Regular read/write of the storage medium
    Storage,
    /// Diagnostic or driver-private command, never addressed to the medium
    PassThrough,
}

/// A contiguous run of sectors paired with the buffer it moves through
pub struct Segment<'a> {
    sectors: u64,
    buffer: &'a mut [u8],
}

impl<'a> Segment<'a> {
    /// Creates a segment of `sectors` kernel sectors backed by `buffer`
    pub fn new(sectors: u64, buffer: &'a mut [u8]) -> Self {
        Self { sectors, buffer }
    }

    /// Creates a segment covering every whole sector of `buffer`
    pub fn whole(buffer: &'a mut [u8]) -> Self {
        let sectors = (buffer.len() / KERNEL_SECTOR_SIZE) as u64;
        Self { sectors, buffer }
    }

    pub fn sectors(&self) -> u64 {
        self.sectors
    }

    pub fn buffer(&self) -> &[u8] {
        &*self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut *self.buffer
    }
}

impl fmt::Debug for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("sectors", &self.sectors)
            .field("buffer_len", &self.buffer.len())
            .finish()
    }
}

/// A queued block request: direction, start sector and ordered segments
#[derive(Debug)]
pub struct BlockRequest<'a> {
    direction: Direction,
    kind: RequestKind,
    start_sector: u64,
    segments: Vec<Segment<'a>>,
}

impl<'a> BlockRequest<'a> {
    /// Creates an empty storage request
    pub fn new(direction: Direction, start_sector: u64) -> Self {
        Self {
            direction,
            kind: RequestKind::Storage,
            start_sector,
            segments: Vec::new(),
        }
    }

    /// Creates a single-segment read
    pub fn read(start_sector: u64, buffer: &'a mut [u8]) -> Self {
        Self::new(Direction::Read, start_sector).with_segment(Segment::whole(buffer))
    }

    /// Creates a single-segment write
    ///
    /// The buffer is only read from, but segments are uniformly mutable.
    pub fn write(start_sector: u64, buffer: &'a mut [u8]) -> Self {
        Self::new(Direction::Write, start_sector).with_segment(Segment::whole(buffer))
    }

    /// Creates a pass-through request with no data
    pub fn pass_through() -> Self {
        Self {
            direction: Direction::Read,
            kind: RequestKind::PassThrough,
            start_sector: 0,
            segments: Vec::new(),
        }
    }

    /// Appends a segment
    pub fn with_segment(mut self, segment: Segment<'a>) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn push_segment(&mut self, segment: Segment<'a>) {
        self.segments.push(segment);
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn is_pass_through(&self) -> bool {
        self.kind == RequestKind::PassThrough
    }

    pub fn start_sector(&self) -> u64 {
        self.start_sector
    }

    pub fn segments(&self) -> &[Segment<'a>] {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut [Segment<'a>] {
        &mut self.segments
    }

    /// Total sectors across every segment
    pub fn total_sectors(&self) -> u64 {
        self.segments.iter().map(Segment::sectors).sum()
    }

    /// Strips the queue entry, leaving the raw segment list
    ///
    /// Pass-through requests have no storage payload and cannot become a bio.
    pub fn into_bio(self, device: usize) -> Result<Bio<'a>, RamDiskError> {
        if self.is_pass_through() {
            return Err(RamDiskError::Unsupported { device });
        }
        Ok(Bio {
            direction: self.direction,
            sector: self.start_sector,
            segments: self.segments,
        })
    }
}

/// A raw segment list submitted without an enclosing queue entry
#[derive(Debug)]
pub struct Bio<'a> {
    direction: Direction,
    sector: u64,
    segments: Vec<Segment<'a>>,
}

impl<'a> Bio<'a> {
    pub fn new(direction: Direction, sector: u64) -> Self {
        Self {
            direction,
            sector,
            segments: Vec::new(),
        }
    }

    pub fn with_segment(mut self, segment: Segment<'a>) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn sector(&self) -> u64 {
        self.sector
    }

    pub fn segments(&self) -> &[Segment<'a>] {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut [Segment<'a>] {
        &mut self.segments
    }

    pub fn total_sectors(&self) -> u64 {
        self.segments.iter().map(Segment::sectors).sum()
    }
}
