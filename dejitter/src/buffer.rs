//! The tick-indexed ring buffer.

use std::num::{NonZeroU32, NonZeroUsize};

use tick::Tick;

/// A value stamped with the tick it was produced on.
pub trait Timestamped {
    /// The tick this value belongs to.
    fn tick(&self) -> Tick;
}

/// The pair of stored values bracketing a query tick.
///
/// `current` is the greatest stored tick at or before the query; `next` is
/// the smallest stored tick after it. Interpolation renders between the two.
#[derive(Debug, PartialEq, Eq)]
pub struct Bracket<'a, T> {
    pub current: Option<&'a T>,
    pub next: Option<&'a T>,
}

/// Pre-allocated random-access buffer for dejittering tick-stamped values.
///
/// Values live in the slot `(tick / divisor) % capacity`, so a buffer of
/// capacity C retains at most the last `C * divisor` ticks of history;
/// anything older is overwritten and unrecoverable. The divisor exists for
/// snapshot streams slower than the tick rate (one update every N ticks)
/// so slots are not wasted on ticks that never carry data.
///
/// Storing is structurally infallible: no operation here returns an error,
/// and queries for missing or [`Tick::BAD`] ticks come back empty rather
/// than failing.
#[derive(Debug, Clone)]
pub struct DejitterBuffer<T> {
    slots: Vec<Option<T>>,
    divisor: u32,
    latest_idx: Option<usize>,
    len: usize,
}

impl<T: Timestamped + Clone> DejitterBuffer<T> {
    /// Creates a buffer with one slot per tick.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self::with_divisor(capacity, NonZeroU32::new(1).expect("1 is non-zero"))
    }

    /// Creates a buffer whose slots each cover `divisor` ticks.
    #[must_use]
    pub fn with_divisor(capacity: NonZeroUsize, divisor: NonZeroU32) -> Self {
        let cap = capacity.get();
        let mut slots = Vec::with_capacity(cap);
        slots.resize_with(cap, || None);
        Self {
            slots,
            divisor: divisor.get(),
            latest_idx: None,
            len: 0,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Ticks per slot.
    #[must_use]
    pub const fn divisor(&self) -> u32 {
        self.divisor
    }

    /// Number of occupied slots.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no slot is occupied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The most recent value stored.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.latest_idx.and_then(|idx| self.slots[idx].as_ref())
    }

    /// The oldest value still retained.
    ///
    /// Slot aliasing means retention is not ordered by tick (a late value
    /// can sit in the slot right after `latest`), so this scans every
    /// occupied slot for the minimum, like the other lookups.
    #[must_use]
    pub fn oldest(&self) -> Option<&T> {
        self.iter().min_by_key(|value| value.tick())
    }

    /// Stores a value, overwriting whatever occupied its slot.
    ///
    /// Returns `true` and moves `latest` iff the buffer was empty or the
    /// value's tick is at or past the current latest. An older value is
    /// still written into its slot (late arrivals are useful for
    /// random-access lookups) but never moves `latest` backward, and never
    /// displaces a strictly newer occupant under slot aliasing.
    ///
    /// Values stamped [`Tick::BAD`] are rejected outright.
    pub fn store(&mut self, value: T) -> bool {
        let value_tick = value.tick();
        if value_tick.is_bad() {
            return false;
        }

        let idx = self.index_of(value_tick);
        let advances = match self.latest() {
            None => true,
            Some(latest) => value_tick >= latest.tick(),
        };

        if advances {
            self.write(idx, value);
            self.latest_idx = Some(idx);
            return true;
        }

        // Late arrival: keep it for random access unless the slot already
        // holds newer data.
        let can_write = self.slots[idx]
            .as_ref()
            .map_or(true, |occupant| occupant.tick() <= value_tick);
        if can_write {
            self.write(idx, value);
        }
        false
    }

    /// Overwrites the slot for `value.tick()` iff the slot is empty or its
    /// occupant carries exactly that tick. Used for authoritative correction
    /// of a previously speculative value; never moves `latest`.
    pub fn replace(&mut self, value: T) -> bool {
        let value_tick = value.tick();
        if value_tick.is_bad() {
            return false;
        }

        let idx = self.index_of(value_tick);
        let matches = self.slots[idx]
            .as_ref()
            .map_or(true, |occupant| occupant.tick() == value_tick);
        if matches {
            self.write(idx, value);
        }
        matches
    }

    /// O(1) point lookup: the value stored for exactly `tick`, if any.
    #[must_use]
    pub fn get(&self, tick: Tick) -> Option<&T> {
        if tick.is_bad() {
            return None;
        }
        self.slots[self.index_of(tick)]
            .as_ref()
            .filter(|value| value.tick() == tick)
    }

    /// Exact-match probe.
    #[must_use]
    pub fn contains(&self, tick: Tick) -> bool {
        self.get(tick).is_some()
    }

    /// The value with the greatest stored tick at or before `tick`.
    ///
    /// Exact matches return in O(1); otherwise this is an O(capacity) scan.
    #[must_use]
    pub fn get_latest_at(&self, tick: Tick) -> Option<&T> {
        if tick.is_bad() {
            return None;
        }
        if let Some(exact) = self.get(tick) {
            return Some(exact);
        }

        let mut best: Option<&T> = None;
        for value in self.iter() {
            if value.tick() <= tick && best.map_or(true, |b| b.tick() < value.tick()) {
                best = Some(value);
            }
        }
        best
    }

    /// Single O(capacity) scan producing the interpolation bracket around
    /// `tick`: the greatest stored tick at or before it and the smallest
    /// stored tick after it.
    #[must_use]
    pub fn first_after(&self, tick: Tick) -> Bracket<'_, T> {
        let mut bracket = Bracket {
            current: None,
            next: None,
        };
        if tick.is_bad() {
            return bracket;
        }

        for value in self.iter() {
            if value.tick() > tick {
                if bracket.next.map_or(true, |n| value.tick() < n.tick()) {
                    bracket.next = Some(value);
                }
            } else if bracket.current.map_or(true, |c| value.tick() > c.tick()) {
                bracket.current = Some(value);
            }
        }
        bracket
    }

    /// All stored values with tick at or after `start`, ascending by tick.
    /// Used for replay.
    #[must_use]
    pub fn range_from(&self, start: Tick) -> Vec<T> {
        if start.is_bad() {
            return Vec::new();
        }
        let mut values: Vec<T> = self
            .iter()
            .filter(|value| value.tick() >= start)
            .cloned()
            .collect();
        values.sort_by_key(Timestamped::tick);
        values
    }

    /// All stored values with ticks in `[start, end]`, ascending, plus the
    /// first value after `end` if one exists.
    #[must_use]
    pub fn range_and_next(&self, start: Tick, end: Tick) -> (Vec<T>, Option<T>) {
        if start.is_bad() {
            return (Vec::new(), None);
        }

        let mut values = Vec::new();
        let mut next: Option<&T> = None;
        for value in self.iter() {
            let value_tick = value.tick();
            if value_tick >= start && value_tick <= end {
                values.push(value.clone());
            } else if value_tick > end && next.map_or(true, |n| value_tick < n.tick()) {
                next = Some(value);
            }
        }
        values.sort_by_key(Timestamped::tick);
        (values, next.cloned())
    }

    /// Iterates occupied slots in arbitrary (slot) order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.latest_idx = None;
        self.len = 0;
    }

    fn index_of(&self, tick: Tick) -> usize {
        ((tick.raw() / self.divisor) as usize) % self.slots.len()
    }

    fn write(&mut self, idx: usize, value: T) {
        if self.slots[idx].is_none() {
            self.len += 1;
        }
        self.slots[idx] = Some(value);
    }
}
