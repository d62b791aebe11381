//! # Diagnostics
//!
//! Structured diagnostic events emitted by the RAM disk.
//!
//! Every event goes out through the `log` facade with `key=value` fields and
//! is also retained in a bounded in-memory history, so a host or a test can
//! ask what was reported without scraping log output.

use log::Level;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;

/// Number of events kept in the in-memory history
pub const DIAGNOSTIC_HISTORY: usize = 256;

/// A diagnostic event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    /// A transfer addressed bytes past the end of the device
    OutOfRange {
        device: usize,
        offset: u64,
        length: u64,
        capacity: u64,
    },
    /// A pass-through (non-storage) request reached the dispatcher
    PassThroughRejected { device: usize },
    /// Backing memory or a device worker could not be allocated at startup
    AllocationFailure { device: usize, bytes: u64 },
    /// The idle timer fired while the device was still open
    LifecycleInvariantViolation { device: usize, open_count: u32 },
    /// The configured request mode was not recognised
    BadRequestMode { selector: String },
}

impl DiagnosticEvent {
    /// Log level the event is emitted at
    pub fn level(&self) -> Level {
        match self {
            Self::OutOfRange { .. } | Self::PassThroughRejected { .. } => Level::Info,
            Self::BadRequestMode { .. } | Self::LifecycleInvariantViolation { .. } => Level::Warn,
            Self::AllocationFailure { .. } => Level::Error,
        }
    }

    /// Device the event refers to, if any
    pub fn device(&self) -> Option<usize> {
        match self {
            Self::OutOfRange { device, .. }
            | Self::PassThroughRejected { device }
            | Self::AllocationFailure { device, .. }
            | Self::LifecycleInvariantViolation { device, .. } => Some(*device),
            Self::BadRequestMode { .. } => None,
        }
    }
}

impl fmt::Display for DiagnosticEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange {
                device,
                offset,
                length,
                capacity,
            } => write!(
                f,
                "beyond-end transfer dev={} offset={} length={} capacity={}",
                device, offset, length, capacity
            ),
            Self::PassThroughRejected { device } => {
                write!(f, "skip non-fs request dev={}", device)
            }
            Self::AllocationFailure { device, bytes } => {
                write!(f, "allocation failure dev={} bytes={}", device, bytes)
            }
            Self::LifecycleInvariantViolation { device, open_count } => write!(
                f,
                "timer sanity check failed dev={} users={}",
                device, open_count
            ),
            Self::BadRequestMode { selector } => {
                write!(f, "bad request mode selector={}, using simple", selector)
            }
        }
    }
}

/// Diagnostic sink shared by the registry and its devices
#[derive(Debug, Default)]
pub struct Diagnostics {
    events: Mutex<VecDeque<DiagnosticEvent>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs the event and appends it to the history
    pub fn record(&self, event: DiagnosticEvent) {
        log::log!(target: "ramdisk", event.level(), "{}", event);

        let mut events = self.events.lock();
        if events.len() == DIAGNOSTIC_HISTORY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Returns a snapshot of the retained events, oldest first
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Counts retained events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&DiagnosticEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drops the retained history and returns it
    pub fn drain(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());

        diagnostics.record(DiagnosticEvent::PassThroughRejected { device: 1 });
        diagnostics.record(DiagnosticEvent::BadRequestMode {
            selector: "7".to_string(),
        });

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics.events()[0],
            DiagnosticEvent::PassThroughRejected { device: 1 }
        );
        assert_eq!(
            diagnostics.count(|e| matches!(e, DiagnosticEvent::BadRequestMode { .. })),
            1
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let diagnostics = Diagnostics::new();
        for device in 0..DIAGNOSTIC_HISTORY + 10 {
            diagnostics.record(DiagnosticEvent::PassThroughRejected { device });
        }

        let events = diagnostics.events();
        assert_eq!(events.len(), DIAGNOSTIC_HISTORY);
        assert_eq!(events[0].device(), Some(10));
    }

    #[test]
    fn test_drain_empties_history() {
        let diagnostics = Diagnostics::new();
        diagnostics.record(DiagnosticEvent::AllocationFailure {
            device: 0,
            bytes: 4096,
        });

        assert_eq!(diagnostics.drain().len(), 1);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_event_levels() {
        assert_eq!(
            DiagnosticEvent::AllocationFailure { device: 0, bytes: 1 }.level(),
            Level::Error
        );
        assert_eq!(
            DiagnosticEvent::LifecycleInvariantViolation {
                device: 0,
                open_count: 1
            }
            .level(),
            Level::Warn
        );
        assert_eq!(
            DiagnosticEvent::PassThroughRejected { device: 0 }.level(),
            Level::Info
        );
    }

    #[test]
    fn test_event_display() {
        let event = DiagnosticEvent::OutOfRange {
            device: 0,
            offset: 523264,
            length: 2048,
            capacity: 524288,
        };
        assert_eq!(
            event.to_string(),
            "beyond-end transfer dev=0 offset=523264 length=2048 capacity=524288"
        );
        assert_eq!(
            DiagnosticEvent::BadRequestMode {
                selector: "9".to_string()
            }
            .to_string(),
            "bad request mode selector=9, using simple"
        );
    }
}
