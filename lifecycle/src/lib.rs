//! # Lifecycle
//!
//! Timeout and deferred-action primitives for the RAM disk.
//!
//! ## Philosophy
//!
//! - **Explicit over implicit**: Timers are armed and disarmed explicitly
//! - **Synchronous cancellation**: Disarming waits for an in-flight callback
//! - **Mechanism not policy**: Provides primitives, services decide policies
//! - **No async runtime required**: One parked worker thread per timer
//!
//! ## Core Concepts
//!
//! - `Deadline`: Point in time when a deferred action becomes due
//! - `Timeout`: Duration-based timeout, converted to a deadline when armed
//! - `DeferredTimer`: Cancellable, reschedulable deferred action

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// A deadline represents a point in time when a deferred action is due
///
/// Deadlines are absolute times, making them suitable for passing through
/// multiple layers without duration confusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline {
    instant: Instant,
}

impl Deadline {
    /// Creates a deadline at the specified instant
    pub fn at(instant: Instant) -> Self {
        Self { instant }
    }

    /// Returns the instant of this deadline
    pub fn instant(&self) -> Instant {
        self.instant
    }

    /// Checks if the deadline has passed
    pub fn has_passed(&self, now: Instant) -> bool {
        now >= self.instant
    }

    /// Returns time remaining until deadline
    ///
    /// Returns None if deadline has passed.
    pub fn time_remaining(&self, now: Instant) -> Option<Duration> {
        if now < self.instant {
            Some(self.instant.duration_since(now))
        } else {
            None
        }
    }
}

/// Timeout specifies a duration-based timeout
///
/// Unlike Deadline, Timeout is relative and needs to be converted to a
/// Deadline for actual use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Creates a timeout with the specified duration
    pub fn after(duration: Duration) -> Self {
        Self { duration }
    }

    /// Creates a timeout from milliseconds
    pub fn from_millis(millis: u64) -> Self {
        Self {
            duration: Duration::from_millis(millis),
        }
    }

    /// Creates a timeout from seconds
    pub fn from_secs(secs: u64) -> Self {
        Self {
            duration: Duration::from_secs(secs),
        }
    }

    /// Returns the duration of this timeout
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Converts this timeout to a deadline starting from now
    pub fn to_deadline(&self, now: Instant) -> Deadline {
        Deadline::at(now + self.duration)
    }
}

/// Errors related to lifecycle operations
#[derive(Debug)]
pub enum LifecycleError {
    /// The timer worker thread could not be started
    Spawn(io::Error),

    /// The timer was shut down and can no longer be armed
    ShutDown,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::Spawn(err) => write!(f, "Failed to start timer worker: {}", err),
            LifecycleError::ShutDown => write!(f, "Timer has been shut down"),
        }
    }
}

impl std::error::Error for LifecycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LifecycleError::Spawn(err) => Some(err),
            LifecycleError::ShutDown => None,
        }
    }
}

#[derive(Debug, Default)]
struct TimerState {
    deadline: Option<Deadline>,
    in_flight: bool,
    shutdown: bool,
    fired: u64,
}

#[derive(Debug, Default)]
struct TimerShared {
    state: Mutex<TimerState>,
    changed: Condvar,
}

/// A cancellable, reschedulable deferred action
///
/// Each timer owns one worker thread that sleeps until the armed deadline
/// and then runs the action once. Arming never blocks on the action;
/// cancelling does.
///
/// ## Example
///
/// ```
/// use lifecycle::{DeferredTimer, Timeout};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// let timer = DeferredTimer::spawn("doc", move || flag.store(true, Ordering::SeqCst)).unwrap();
///
/// timer.arm(Timeout::from_secs(60)).unwrap();
/// assert!(timer.is_armed());
///
/// assert!(timer.cancel());
/// assert!(!fired.load(Ordering::SeqCst));
/// ```
pub struct DeferredTimer {
    name: String,
    shared: Arc<TimerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl DeferredTimer {
    /// Starts a timer whose worker runs `action` each time an armed deadline passes
    pub fn spawn<F>(name: impl Into<String>, action: F) -> Result<Self, LifecycleError>
    where
        F: Fn() + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(TimerShared::default());
        let worker_shared = shared.clone();
        let worker_name = name.clone();

        let handle = thread::Builder::new()
            .name(format!("timer-{}", name))
            .spawn(move || run_worker(&worker_name, &worker_shared, action))
            .map_err(LifecycleError::Spawn)?;
        let worker_id = handle.thread().id();

        Ok(Self {
            name,
            shared,
            worker: Mutex::new(Some(handle)),
            worker_id,
        })
    }

    /// Returns the timer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arms (or re-arms) the timer to fire once after `timeout`
    ///
    /// Never waits for an in-flight callback, so it is safe to call while
    /// holding a lock the callback also takes.
    pub fn arm(&self, timeout: Timeout) -> Result<(), LifecycleError> {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return Err(LifecycleError::ShutDown);
        }
        state.deadline = Some(timeout.to_deadline(Instant::now()));
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Disarms the timer and waits for an in-flight callback to finish
    ///
    /// Returns true if a pending firing was disarmed. Called from inside the
    /// callback it only disarms, since waiting on itself would never end.
    pub fn cancel(&self) -> bool {
        let mut state = self.shared.state.lock();
        let was_armed = state.deadline.take().is_some();
        if thread::current().id() != self.worker_id {
            self.wait_idle(&mut state);
        }
        self.shared.changed.notify_all();
        was_armed
    }

    /// Returns true while a firing is pending
    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().deadline.is_some()
    }

    /// Returns the pending deadline, if armed
    pub fn deadline(&self) -> Option<Deadline> {
        self.shared.state.lock().deadline
    }

    /// Returns how many times the action has run
    pub fn fired_count(&self) -> u64 {
        self.shared.state.lock().fired
    }

    /// Returns true once the timer has been shut down
    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    /// Disarms the timer and joins its worker
    ///
    /// Idempotent. After shutdown the timer can no longer be armed.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.deadline = None;
            self.shared.changed.notify_all();
        }

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("timer={} worker terminated abnormally", self.name);
            }
        }
    }

    fn wait_idle(&self, state: &mut MutexGuard<'_, TimerState>) {
        while state.in_flight {
            self.shared.changed.wait(state);
        }
    }
}

impl fmt::Debug for DeferredTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("DeferredTimer")
            .field("name", &self.name)
            .field("deadline", &state.deadline)
            .field("in_flight", &state.in_flight)
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

impl Drop for DeferredTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<F: Fn()>(name: &str, shared: &TimerShared, action: F) {
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            break;
        }

        let Some(deadline) = state.deadline else {
            shared.changed.wait(&mut state);
            continue;
        };

        if !deadline.has_passed(Instant::now()) {
            shared.changed.wait_until(&mut state, deadline.instant());
            continue;
        }

        state.deadline = None;
        state.in_flight = true;
        let outcome = MutexGuard::unlocked(&mut state, || {
            panic::catch_unwind(AssertUnwindSafe(&action))
        });
        if outcome.is_err() {
            log::error!("timer={} action panicked", name);
        }
        state.in_flight = false;
        state.fired += 1;
        shared.changed.notify_all();
    }
    log::trace!("timer={} worker exiting", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_timer(name: &str) -> (DeferredTimer, Arc<AtomicU64>) {
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let timer = DeferredTimer::spawn(name, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        (timer, hits)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let give_up = Instant::now() + Duration::from_secs(5);
        while Instant::now() < give_up {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn test_deadline_basic() {
        let now = Instant::now();
        let future = now + Duration::from_millis(1000);
        let deadline = Deadline::at(future);

        assert!(!deadline.has_passed(now));
        assert_eq!(deadline.instant(), future);
        assert!(deadline.has_passed(future));
        assert!(deadline.has_passed(future + Duration::from_millis(1)));
    }

    #[test]
    fn test_deadline_time_remaining() {
        let now = Instant::now();
        let deadline = Deadline::at(now + Duration::from_nanos(1000));

        assert_eq!(deadline.time_remaining(now), Some(Duration::from_nanos(1000)));
        assert_eq!(deadline.time_remaining(deadline.instant()), None);
        assert_eq!(
            deadline.time_remaining(deadline.instant() + Duration::from_nanos(1)),
            None
        );
    }

    #[test]
    fn test_timeout_basic() {
        assert_eq!(Timeout::from_millis(100).duration(), Duration::from_millis(100));
        assert_eq!(Timeout::from_secs(5).duration(), Duration::from_secs(5));
        assert_eq!(
            Timeout::after(Duration::from_millis(500)).duration(),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_timeout_to_deadline() {
        let now = Instant::now();
        let deadline = Timeout::from_millis(100).to_deadline(now);

        assert_eq!(deadline.instant(), now + Duration::from_millis(100));
        assert!(!deadline.has_passed(now));
        assert!(deadline.has_passed(now + Duration::from_millis(100)));
    }

    #[test]
    fn test_timer_fires_once_after_delay() {
        let (timer, hits) = counting_timer("fires");
        timer.arm(Timeout::from_millis(5)).unwrap();

        assert!(wait_for(|| hits.load(Ordering::SeqCst) == 1));
        assert!(!timer.is_armed());

        thread::sleep(Duration::from_millis(30));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(timer.fired_count(), 1);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let (timer, hits) = counting_timer("cancel");
        timer.arm(Timeout::from_millis(100)).unwrap();

        assert!(timer.cancel());
        assert!(!timer.is_armed());
        assert!(!timer.cancel());

        thread::sleep(Duration::from_millis(200));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rearm_moves_deadline() {
        let (timer, hits) = counting_timer("rearm");
        timer.arm(Timeout::from_secs(60)).unwrap();
        let first = timer.deadline().unwrap();

        timer.arm(Timeout::from_millis(5)).unwrap();
        let second = timer.deadline();
        assert!(second.map_or(true, |d| d < first));

        assert!(wait_for(|| hits.load(Ordering::SeqCst) == 1));
    }

    #[test]
    fn test_cancel_waits_for_in_flight_action() {
        let started = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicU64::new(0));
        let (s, f) = (started.clone(), finished.clone());
        let timer = DeferredTimer::spawn("slow", move || {
            s.store(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(50));
            f.store(1, Ordering::SeqCst);
        })
        .unwrap();

        timer.arm(Timeout::from_millis(1)).unwrap();
        assert!(wait_for(|| started.load(Ordering::SeqCst) == 1));

        timer.cancel();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let (timer, hits) = counting_timer("shutdown");
        timer.arm(Timeout::from_millis(50)).unwrap();

        timer.shutdown();
        timer.shutdown();
        assert!(timer.is_shut_down());
        assert!(matches!(
            timer.arm(Timeout::from_millis(1)),
            Err(LifecycleError::ShutDown)
        ));

        thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_action_does_not_wedge_cancel() {
        let timer = DeferredTimer::spawn("panics", || panic!("boom")).unwrap();
        timer.arm(Timeout::from_millis(1)).unwrap();

        assert!(wait_for(|| timer.fired_count() == 1));
        timer.cancel();
        timer.arm(Timeout::from_millis(1)).unwrap();
        assert!(wait_for(|| timer.fired_count() == 2));
    }

    #[test]
    fn test_lifecycle_error_display() {
        assert_eq!(LifecycleError::ShutDown.to_string(), "Timer has been shut down");
    }
}
