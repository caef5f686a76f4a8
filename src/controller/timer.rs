//! Cancellable one-shot timers for the event loop.
//!
//! Nothing here sleeps. The owner asks for [`TimerQueue::next_deadline`],
//! waits however it likes, then drains [`TimerQueue::pop_due`]. A cancelled
//! timer is removed from the queue, so it can never fire late.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::model::types::Pane;

/// Time source; swapped for [`ManualClock`] in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock(Arc<Mutex<Instant>>);

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Upstream settled; rebuild the pane's universe.
    Debounce,
    /// Rebuild done early; release the held `SearchFinished`.
    Budget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    pub id: TimerId,
    pub pane: Pane,
    pub kind: TimerKind,
    pub deadline: Instant,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    queue: BTreeMap<(Instant, TimerId), (Pane, TimerKind)>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, pane: Pane, kind: TimerKind, deadline: Instant) -> Timer {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.queue.insert((deadline, id), (pane, kind));
        Timer {
            id,
            pane,
            kind,
            deadline,
        }
    }

    /// Returns false when the timer already fired or was cancelled.
    pub fn cancel(&mut self, timer: &Timer) -> bool {
        self.queue.remove(&(timer.deadline, timer.id)).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Remove and return the earliest timer due at `now`, if any.
    pub fn pop_due(&mut self, now: Instant) -> Option<Timer> {
        let entry = self.queue.first_entry()?;
        let (deadline, id) = *entry.key();
        if deadline > now {
            return None;
        }
        let (pane, kind) = entry.remove();
        Some(Timer {
            id,
            pane,
            kind,
            deadline,
        })
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_deadline_order() {
        let clock = ManualClock::new();
        let start = clock.now();
        let mut timers = TimerQueue::new();
        timers.schedule(Pane::Third, TimerKind::Budget, start + Duration::from_millis(300));
        timers.schedule(Pane::Second, TimerKind::Debounce, start + Duration::from_millis(200));

        assert_eq!(timers.next_deadline(), Some(start + Duration::from_millis(200)));
        assert!(timers.pop_due(clock.now()).is_none());

        clock.advance(Duration::from_millis(300));
        let first = timers.pop_due(clock.now()).unwrap();
        let second = timers.pop_due(clock.now()).unwrap();
        assert_eq!((first.pane, first.kind), (Pane::Second, TimerKind::Debounce));
        assert_eq!((second.pane, second.kind), (Pane::Third, TimerKind::Budget));
        assert!(timers.is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let clock = ManualClock::new();
        let mut timers = TimerQueue::new();
        let t = timers.schedule(Pane::Second, TimerKind::Debounce, clock.now());
        assert!(timers.cancel(&t));
        assert!(!timers.cancel(&t));
        assert!(timers.pop_due(clock.now()).is_none());
        assert_eq!(timers.next_deadline(), None);
    }
}
