//! # Request Dispatch
//!
//! The three request-handling strategies.
//!
//! - **Simple**: the queue hands the handler one segment per invocation
//! - **Clustered**: one invocation walks every segment of the request
//! - **Direct**: no queue entry at all; a raw bio is transferred and
//!   completed synchronously
//!
//! Every strategy applies segments in order to consecutive sector ranges and
//! yields exactly one completion per request. The whole request is range
//! checked before the first byte moves, so a rejected request leaves the
//! device untouched. Nothing here retries.

use crate::device::RamDisk;
use crate::diagnostics::DiagnosticEvent;
use crate::error::RamDiskError;
use crate::request::{Bio, BlockRequest, Direction, Segment};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome of one request: sectors transferred, or the I/O error
pub type Completion = Result<u64, RamDiskError>;

/// Request dispatch strategy, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    Simple = 0,
    Clustered = 1,
    Direct = 2,
}

impl RequestMode {
    pub fn name(self) -> &'static str {
        match self {
            RequestMode::Simple => "simple",
            RequestMode::Clustered => "clustered",
            RequestMode::Direct => "direct",
        }
    }
}

impl fmt::Display for RequestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A strategy for driving a request through the sector transfer primitive
pub trait RequestHandler: Send + Sync {
    /// The strategy this handler implements
    fn mode(&self) -> RequestMode;

    /// Applies every segment of `request` to `disk` and completes it
    fn submit(&self, disk: &RamDisk, request: BlockRequest<'_>) -> Completion;
}

fn reject_pass_through(disk: &RamDisk) -> RamDiskError {
    disk.diagnostics()
        .record(DiagnosticEvent::PassThroughRejected {
            device: disk.index(),
        });
    RamDiskError::Unsupported {
        device: disk.index(),
    }
}

/// Range-checks every segment before any of them is applied
fn validate_segments(disk: &RamDisk, start_sector: u64, segments: &[Segment<'_>]) -> Completion {
    let mut sector = start_sector;
    for segment in segments {
        disk.check_transfer(sector, segment.sectors(), segment.buffer().len())?;
        sector += segment.sectors();
    }
    Ok(sector - start_sector)
}

fn transfer_segments(
    disk: &RamDisk,
    direction: Direction,
    start_sector: u64,
    segments: &mut [Segment<'_>],
) -> Completion {
    let mut sector = start_sector;
    let mut transferred = 0;
    for segment in segments {
        let count = segment.sectors();
        disk.transfer(sector, count, segment.buffer_mut(), direction)?;
        sector += count;
        transferred += count;
    }
    Ok(transferred)
}

/// A request being worked through one segment at a time
#[derive(Debug)]
pub struct QueuedRequest<'a> {
    request: BlockRequest<'a>,
    next: usize,
    sector: u64,
    transferred: u64,
}

impl<'a> QueuedRequest<'a> {
    pub fn new(request: BlockRequest<'a>) -> Self {
        let sector = request.start_sector();
        Self {
            request,
            next: 0,
            sector,
            transferred: 0,
        }
    }

    /// Returns true once every segment has been handled
    pub fn is_done(&self) -> bool {
        self.next >= self.request.segments().len()
    }

    /// Sector the current segment starts at
    pub fn current_sector(&self) -> u64 {
        self.sector
    }

    /// Sectors of the current segment, if any remain
    pub fn current_sectors(&self) -> Option<u64> {
        self.request.segments().get(self.next).map(Segment::sectors)
    }

    /// Sectors handled so far
    pub fn transferred(&self) -> u64 {
        self.transferred
    }
}

/// Handles one segment per invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleHandler;

impl SimpleHandler {
    /// Transfers the current segment of `queued` and advances past it
    ///
    /// Returns true while segments remain.
    pub fn handle_current(
        &self,
        disk: &RamDisk,
        queued: &mut QueuedRequest<'_>,
    ) -> Result<bool, RamDiskError> {
        let direction = queued.request.direction();
        let sector = queued.sector;
        let Some(segment) = queued.request.segments_mut().get_mut(queued.next) else {
            return Ok(false);
        };

        let count = segment.sectors();
        disk.transfer(sector, count, segment.buffer_mut(), direction)?;

        queued.sector += count;
        queued.transferred += count;
        queued.next += 1;
        Ok(!queued.is_done())
    }
}

impl RequestHandler for SimpleHandler {
    fn mode(&self) -> RequestMode {
        RequestMode::Simple
    }

    fn submit(&self, disk: &RamDisk, request: BlockRequest<'_>) -> Completion {
        if request.is_pass_through() {
            return Err(reject_pass_through(disk));
        }
        validate_segments(disk, request.start_sector(), request.segments())?;

        let mut queued = QueuedRequest::new(request);
        while self.handle_current(disk, &mut queued)? {}
        Ok(queued.transferred())
    }
}

/// Walks every segment of a request in a single invocation
#[derive(Debug, Clone, Copy, Default)]
pub struct ClusteredHandler;

impl ClusteredHandler {
    /// Transfers the whole request, returning the sectors moved
    pub fn transfer_request(&self, disk: &RamDisk, request: &mut BlockRequest<'_>) -> Completion {
        let direction = request.direction();
        let start_sector = request.start_sector();
        transfer_segments(disk, direction, start_sector, request.segments_mut())
    }
}

impl RequestHandler for ClusteredHandler {
    fn mode(&self) -> RequestMode {
        RequestMode::Clustered
    }

    fn submit(&self, disk: &RamDisk, mut request: BlockRequest<'_>) -> Completion {
        if request.is_pass_through() {
            return Err(reject_pass_through(disk));
        }
        validate_segments(disk, request.start_sector(), request.segments())?;

        self.transfer_request(disk, &mut request)
    }
}

/// Transfers raw bios with no intermediate queue
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectHandler;

impl DirectHandler {
    /// Transfers `bio` immediately and runs `end_io` with the completion
    /// before returning it
    pub fn make_request<F>(&self, disk: &RamDisk, mut bio: Bio<'_>, end_io: F) -> Completion
    where
        F: FnOnce(&Completion),
    {
        let completion = validate_segments(disk, bio.sector(), bio.segments()).and_then(|_| {
            let direction = bio.direction();
            let sector = bio.sector();
            transfer_segments(disk, direction, sector, bio.segments_mut())
        });
        end_io(&completion);
        completion
    }
}

impl RequestHandler for DirectHandler {
    fn mode(&self) -> RequestMode {
        RequestMode::Direct
    }

    fn submit(&self, disk: &RamDisk, request: BlockRequest<'_>) -> Completion {
        if request.is_pass_through() {
            return Err(reject_pass_through(disk));
        }
        let bio = request.into_bio(disk.index())?;
        self.make_request(disk, bio, |_| {})
    }
}

/// The configured strategy, chosen once at startup
#[derive(Debug, Clone, Copy)]
pub enum Dispatcher {
    Simple(SimpleHandler),
    Clustered(ClusteredHandler),
    Direct(DirectHandler),
}

impl Dispatcher {
    pub fn for_mode(mode: RequestMode) -> Self {
        match mode {
            RequestMode::Simple => Dispatcher::Simple(SimpleHandler),
            RequestMode::Clustered => Dispatcher::Clustered(ClusteredHandler),
            RequestMode::Direct => Dispatcher::Direct(DirectHandler),
        }
    }
}

impl RequestHandler for Dispatcher {
    fn mode(&self) -> RequestMode {
        match self {
            Dispatcher::Simple(handler) => handler.mode(),
            Dispatcher::Clustered(handler) => handler.mode(),
            Dispatcher::Direct(handler) => handler.mode(),
        }
    }

    fn submit(&self, disk: &RamDisk, request: BlockRequest<'_>) -> Completion {
        let completion = match self {
            Dispatcher::Simple(handler) => handler.submit(disk, request),
            Dispatcher::Clustered(handler) => handler.submit(disk, request),
            Dispatcher::Direct(handler) => handler.submit(disk, request),
        };
        if let Err(err) = &completion {
            log::debug!("dev={} request failed: {}", disk.index(), err);
        }
        completion
    }
}
