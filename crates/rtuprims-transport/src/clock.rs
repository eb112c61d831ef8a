//! Timer services: a virtual clock for deterministic runs and a monotonic
//! wall clock for real lines.

use std::time::{Duration, Instant};

use tracing::trace;

use crate::traits::{TimerHandle, TimerService};

/// Pending expiries ordered by deadline, then by start order.
#[derive(Debug)]
struct TimerQueue<T> {
    next_id: u64,
    pending: Vec<(T, TimerHandle)>,
}

impl<T: Ord + Copy> TimerQueue<T> {
    fn new() -> Self {
        Self {
            next_id: 1,
            pending: Vec::new(),
        }
    }

    fn schedule(&mut self, deadline: T) -> TimerHandle {
        let handle = TimerHandle::new(self.next_id);
        self.next_id += 1;
        let at = self
            .pending
            .partition_point(|(existing, h)| (*existing, *h) <= (deadline, handle));
        self.pending.insert(at, (deadline, handle));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.pending.len();
        self.pending.retain(|(_, h)| *h != handle);
        before != self.pending.len()
    }

    fn next_deadline(&self) -> Option<T> {
        self.pending.first().map(|(deadline, _)| *deadline)
    }

    fn take_expired(&mut self, now: T) -> Vec<TimerHandle> {
        let split = self.pending.partition_point(|(deadline, _)| *deadline <= now);
        self.pending.drain(..split).map(|(_, h)| h).collect()
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Timer service driven by an explicitly advanced virtual clock.
///
/// Time only moves when the owner calls [`VirtualTimers::advance`] or
/// [`VirtualTimers::advance_to_next`], which makes protocol timing fully
/// reproducible in tests.
#[derive(Debug)]
pub struct VirtualTimers {
    now: Duration,
    queue: TimerQueue<Duration>,
}

impl VirtualTimers {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            queue: TimerQueue::new(),
        }
    }

    /// Elapsed virtual time since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Absolute virtual time of the earliest pending expiry.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.next_deadline()
    }

    /// Number of timers still pending.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Advance the clock by `by`, returning every handle that expired, earliest first.
    pub fn advance(&mut self, by: Duration) -> Vec<TimerHandle> {
        self.now += by;
        self.queue.take_expired(self.now)
    }

    /// Jump to the earliest deadline and return the handles expiring there.
    ///
    /// Returns an empty list when nothing is pending.
    pub fn advance_to_next(&mut self) -> Vec<TimerHandle> {
        match self.queue.next_deadline() {
            Some(deadline) => {
                self.now = self.now.max(deadline);
                self.queue.take_expired(self.now)
            }
            None => Vec::new(),
        }
    }
}

impl Default for VirtualTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for VirtualTimers {
    fn start(&mut self, duration: Duration) -> TimerHandle {
        let handle = self.queue.schedule(self.now + duration);
        trace!(%handle, ?duration, "virtual timer started");
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if self.queue.cancel(handle) {
            trace!(%handle, "virtual timer cancelled");
        }
    }
}

/// Timer service backed by [`Instant`].
///
/// The owning loop sleeps or polls until [`MonotonicTimers::next_deadline`]
/// and then collects [`MonotonicTimers::expired`] handles.
#[derive(Debug)]
pub struct MonotonicTimers {
    queue: TimerQueue<Instant>,
}

impl MonotonicTimers {
    pub fn new() -> Self {
        Self {
            queue: TimerQueue::new(),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.next_deadline()
    }

    /// Time remaining until the earliest deadline, saturating at zero.
    pub fn time_to_next(&self, now: Instant) -> Option<Duration> {
        self.queue
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    pub fn expired(&mut self, now: Instant) -> Vec<TimerHandle> {
        self.queue.take_expired(now)
    }
}

impl Default for MonotonicTimers {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for MonotonicTimers {
    fn start(&mut self, duration: Duration) -> TimerHandle {
        self.queue.schedule(Instant::now() + duration)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.queue.cancel(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_timers_fire_in_deadline_order() {
        let mut timers = VirtualTimers::new();
        let late = timers.start(Duration::from_millis(30));
        let early = timers.start(Duration::from_millis(10));

        assert_eq!(timers.next_deadline(), Some(Duration::from_millis(10)));
        assert_eq!(timers.advance(Duration::from_millis(50)), vec![early, late]);
        assert_eq!(timers.pending(), 0);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut timers = VirtualTimers::new();
        let handle = timers.start(Duration::from_millis(5));
        timers.cancel(handle);

        assert!(timers.advance(Duration::from_secs(1)).is_empty());
    }

    #[test]
    fn advance_to_next_moves_clock_to_deadline() {
        let mut timers = VirtualTimers::new();
        timers.advance(Duration::from_millis(3));
        let handle = timers.start(Duration::from_millis(7));

        assert_eq!(timers.advance_to_next(), vec![handle]);
        assert_eq!(timers.now(), Duration::from_millis(10));
        assert!(timers.advance_to_next().is_empty());
    }

    #[test]
    fn handles_are_not_reused() {
        let mut timers = VirtualTimers::new();
        let first = timers.start(Duration::from_millis(1));
        timers.cancel(first);
        let second = timers.start(Duration::from_millis(1));
        assert_ne!(first, second);
    }

    #[test]
    fn equal_deadlines_keep_start_order() {
        let mut timers = VirtualTimers::new();
        let a = timers.start(Duration::from_millis(4));
        let b = timers.start(Duration::from_millis(4));
        assert_eq!(timers.advance_to_next(), vec![a, b]);
    }

    #[test]
    fn monotonic_timers_expire_after_deadline() {
        let mut timers = MonotonicTimers::new();
        let handle = timers.start(Duration::ZERO);
        let now = Instant::now();

        assert_eq!(timers.time_to_next(now), Some(Duration::ZERO));
        assert_eq!(timers.expired(now), vec![handle]);
        assert!(timers.next_deadline().is_none());
    }
}
