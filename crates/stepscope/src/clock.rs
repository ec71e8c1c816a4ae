//! Virtual time clock for deterministic playback.
//!
//! `VirtualClock` is a [`TickScheduler`] whose time only moves when
//! `advance_by()` is called, so autoplay can be tested (and driven
//! headlessly) without real waiting.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Duration;

use crate::playback::{TickScheduler, TickToken};

/// Entry for a pending timer.
#[derive(Debug, Clone)]
struct TimerEntry {
    /// When the timer should fire (virtual time in ms)
    fire_at_ms: u64,
    /// Registration order, breaks ties between timers due at the same time
    seq: u64,
    token: TickToken,
    interval_ms: u64,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at_ms == other.fire_at_ms && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest fire time first, then registration order
        other
            .fire_at_ms
            .cmp(&self.fire_at_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct ClockState {
    current_time_ms: u64,
    next_seq: u64,
    pending_timers: BinaryHeap<TimerEntry>,
}

/// Shared handle to a virtual clock. Clones observe the same time.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    state: Rc<RefCell<ClockState>>,
}

impl VirtualClock {
    /// Create a new clock starting at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in milliseconds.
    pub fn now_ms(&self) -> u64 {
        self.state.borrow().current_time_ms
    }

    /// Advance virtual time by `ms`.
    ///
    /// Returns the tokens of every timer that fired, in firing order.
    /// Repeating timers are re-scheduled immediately, so one long advance
    /// can fire the same timer several times.
    pub fn advance_by(&self, ms: u64) -> Vec<TickToken> {
        let mut state = self.state.borrow_mut();
        let target_time = state.current_time_ms + ms;
        let mut fired = Vec::new();

        while let Some(entry) = state.pending_timers.peek() {
            if entry.fire_at_ms > target_time {
                break;
            }
            let Some(entry) = state.pending_timers.pop() else {
                break;
            };
            fired.push(entry.token);

            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending_timers.push(TimerEntry {
                fire_at_ms: entry.fire_at_ms + entry.interval_ms,
                seq,
                ..entry
            });
        }

        state.current_time_ms = target_time;
        fired
    }

    pub fn has_pending_timers(&self) -> bool {
        !self.state.borrow().pending_timers.is_empty()
    }

    pub fn pending_timer_count(&self) -> usize {
        self.state.borrow().pending_timers.len()
    }

    /// Time until the next timer fires (if any).
    pub fn time_to_next_timer(&self) -> Option<u64> {
        let state = self.state.borrow();
        state
            .pending_timers
            .peek()
            .map(|entry| entry.fire_at_ms.saturating_sub(state.current_time_ms))
    }

    fn register(&self, interval_ms: u64, token: TickToken) {
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq;
        state.next_seq += 1;
        let fire_at_ms = state.current_time_ms + interval_ms;
        state.pending_timers.push(TimerEntry {
            fire_at_ms,
            seq,
            token,
            interval_ms,
        });
    }

    fn cancel(&self, token: TickToken) {
        self.state
            .borrow_mut()
            .pending_timers
            .retain(|entry| entry.token != token);
    }
}

/// A repeating timer on a [`VirtualClock`]. Dropping it cancels the timer.
#[derive(Debug)]
pub struct VirtualTimer {
    clock: VirtualClock,
    token: TickToken,
}

impl VirtualTimer {
    pub fn token(&self) -> TickToken {
        self.token
    }
}

impl Drop for VirtualTimer {
    fn drop(&mut self) {
        self.clock.cancel(self.token);
    }
}

impl TickScheduler for VirtualClock {
    type Handle = VirtualTimer;

    fn start(&mut self, interval: Duration, token: TickToken) -> VirtualTimer {
        // A zero interval would fire forever within one advance
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        self.register(interval_ms, token);
        VirtualTimer {
            clock: self.clone(),
            token,
        }
    }
}
