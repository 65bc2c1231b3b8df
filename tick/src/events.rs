//! Tick-ordered scheduled event delivery.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::Tick;

/// A queue of events that must not fire before their tick becomes current.
///
/// Remote observers render in the past (at the delay tick), so an event
/// stamped "fire at tick T" may arrive while the observer is still rendering
/// T - n. Such events are held here and released once the observer's
/// reference tick reaches them. Events with equal ticks are released in the
/// order they were scheduled.
#[derive(Debug)]
pub struct EventQueue<E> {
    heap: BinaryHeap<Reverse<Scheduled<E>>>,
    seq: u64,
}

#[derive(Debug)]
struct Scheduled<E> {
    tick: Tick,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tick
            .cmp(&other.tick)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl<E> EventQueue<E> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seq: 0,
        }
    }

    /// Schedules `event` to fire once `tick` becomes current.
    pub fn schedule(&mut self, tick: Tick, event: E) {
        let seq = self.seq;
        self.seq += 1;
        self.heap.push(Reverse(Scheduled { tick, seq, event }));
    }

    /// The tick of the earliest pending event, if any.
    #[must_use]
    pub fn peek_tick(&self) -> Option<Tick> {
        self.heap.peek().map(|entry| entry.0.tick)
    }

    /// Releases every event whose tick is at or before `now`, in ascending
    /// tick order.
    pub fn drain_due(&mut self, now: Tick) -> impl Iterator<Item = (Tick, E)> + '_ {
        std::iter::from_fn(move || {
            if self.heap.peek().is_some_and(|entry| entry.0.tick <= now) {
                self.heap
                    .pop()
                    .map(|entry| (entry.0.tick, entry.0.event))
            } else {
                None
            }
        })
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if no events are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn releases_only_due_events() {
        let mut queue = EventQueue::new();
        queue.schedule(Tick::new(5), "fire");
        queue.schedule(Tick::new(10), "death");

        let due: Vec<_> = queue.drain_due(Tick::new(7)).collect();
        assert_eq!(due, vec![(Tick::new(5), "fire")]);
        assert_eq!(queue.len(), 1);

        let due: Vec<_> = queue.drain_due(Tick::new(10)).collect();
        assert_eq!(due, vec![(Tick::new(10), "death")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn ascending_tick_order() {
        let mut queue = EventQueue::new();
        queue.schedule(Tick::new(9), 'c');
        queue.schedule(Tick::new(3), 'a');
        queue.schedule(Tick::new(6), 'b');

        let ticks: Vec<_> = queue.drain_due(Tick::new(100)).map(|(t, _)| t).collect();
        assert_eq!(ticks, vec![Tick::new(3), Tick::new(6), Tick::new(9)]);
    }

    #[test]
    fn equal_ticks_release_fifo() {
        let mut queue = EventQueue::new();
        queue.schedule(Tick::new(4), 1);
        queue.schedule(Tick::new(4), 2);
        queue.schedule(Tick::new(4), 3);

        let events: Vec<_> = queue.drain_due(Tick::new(4)).map(|(_, e)| e).collect();
        assert_eq!(events, vec![1, 2, 3]);
    }

    #[test]
    fn nothing_due_yields_nothing() {
        let mut queue = EventQueue::new();
        queue.schedule(Tick::new(50), ());
        assert_eq!(queue.drain_due(Tick::new(49)).count(), 0);
        assert_eq!(queue.peek_tick(), Some(Tick::new(50)));
    }

    #[test]
    fn drain_partway_keeps_remainder_ordered() {
        let mut queue = EventQueue::new();
        for tick in [8u32, 2, 5, 11] {
            queue.schedule(Tick::new(tick), tick);
        }
        let first: Vec<_> = queue.drain_due(Tick::new(5)).map(|(_, e)| e).collect();
        assert_eq!(first, vec![2, 5]);
        let rest: Vec<_> = queue.drain_due(Tick::new(20)).map(|(_, e)| e).collect();
        assert_eq!(rest, vec![8, 11]);
    }
}
