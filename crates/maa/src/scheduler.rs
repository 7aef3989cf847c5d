//! A minimal discrete-event scheduler owning the one logical thread of
//! control: there are no blocking waits and no parallel threads inside
//! the core, only events posted for a future tick and drained in order.
//!
//! The full simulator kernel is an external collaborator; this
//! binary-heap-backed scheduler lets the crate run and be tested
//! standalone, and a host simulator can substitute its own by driving
//! [`Controller::drain_due`](crate::controller::Controller::drain_due)
//! instead. It plays the same role as `emu_core`'s [`emu_core::MasterClock`]
//! — owning "now" and deciding what runs next — generalized from a fixed
//! per-chip tick callback to an arbitrary-payload event queue.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use emu_core::Ticks;

#[derive(Debug, PartialEq, Eq)]
struct Event<E> {
    at: Ticks,
    /// Insertion sequence, used to break ties in FIFO order
    seq: u64,
    payload: E,
}

impl<E: PartialEq> PartialOrd for Event<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<E: Eq> Ord for Event<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.seq).cmp(&(other.at, other.seq))
    }
}

/// Orders events earliest-`at`-first, ties broken by insertion order,
/// using a max-heap of `Reverse` keys underneath.
pub struct Scheduler<E: Eq> {
    now: Ticks,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Event<E>>>,
}

impl<E: Eq> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Eq> Scheduler<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Ticks::ZERO,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }

    #[must_use]
    pub fn now(&self) -> Ticks {
        self.now
    }

    pub fn schedule(&mut self, at: Ticks, payload: E) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Reverse(Event { at, seq, payload }));
    }

    /// Schedule `payload` `delta` ticks from now.
    pub fn schedule_after(&mut self, delta: Ticks, payload: E) {
        self.schedule(self.now + delta, payload);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn next_due(&self) -> Option<Ticks> {
        self.queue.peek().map(|Reverse(e)| e.at)
    }

    /// Pop and return every event due at or before `up_to`, advancing
    /// `now` to the latest popped tick (or leaving it unchanged if
    /// nothing was due). Caller processes them in the returned order,
    /// which is earliest-first, insertion-order-stable.
    pub fn drain_due(&mut self, up_to: Ticks) -> Vec<E> {
        let mut out = Vec::new();
        while let Some(Reverse(event)) = self.queue.peek() {
            if event.at > up_to {
                break;
            }
            let Reverse(event) = self.queue.pop().expect("peeked Some above");
            self.now = event.at;
            out.push(event.payload);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_tick_order_regardless_of_schedule_order() {
        let mut s = Scheduler::new();
        s.schedule(Ticks::new(5), "late");
        s.schedule(Ticks::new(1), "early");
        s.schedule(Ticks::new(3), "mid");
        assert_eq!(s.drain_due(Ticks::new(10)), vec!["early", "mid", "late"]);
        assert_eq!(s.now(), Ticks::new(5));
    }

    #[test]
    fn same_tick_events_are_fifo() {
        let mut s = Scheduler::new();
        s.schedule(Ticks::new(1), "first");
        s.schedule(Ticks::new(1), "second");
        assert_eq!(s.drain_due(Ticks::new(1)), vec!["first", "second"]);
    }

    #[test]
    fn drain_due_leaves_future_events_queued() {
        let mut s = Scheduler::new();
        s.schedule(Ticks::new(10), "future");
        assert!(s.drain_due(Ticks::new(5)).is_empty());
        assert_eq!(s.next_due(), Some(Ticks::new(10)));
    }
}
