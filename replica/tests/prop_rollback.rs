//! Rollback properties over arbitrary recording and rewind patterns.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use dejitter::{DejitterBuffer, Timestamped};
use proptest::prelude::*;
use replica::{Registry, RollbackWorld, Tracker};
use tick::Tick;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snap {
    tick: u32,
    pos: f32,
}

impl Snap {
    fn at(tick: u32) -> Self {
        Self {
            tick,
            pos: tick as f32,
        }
    }
}

impl Timestamped for Snap {
    fn tick(&self) -> Tick {
        Tick::new(self.tick)
    }
}

fn capacity() -> NonZeroUsize {
    NonZeroUsize::new(8).unwrap()
}

// 1D entities with a live state and a tracker each, keyed 0..6. Histories
// are offset per key so a wrong restore is visible.
struct World {
    entities: HashMap<u32, (Snap, Tracker<Snap>)>,
    now: Tick,
}

impl World {
    fn new(now: u32) -> Self {
        Self {
            entities: HashMap::new(),
            now: Tick::new(now),
        }
    }

    fn spawn(&mut self, key: u32) {
        let mut tracker = Tracker::new(capacity());
        for tick in 20..=25 {
            tracker.record(Snap::at(tick + key));
        }
        self.entities.insert(key, (Snap::at(25 + key), tracker));
    }

    fn pos(&self, key: u32) -> f32 {
        self.entities[&key].0.pos
    }
}

impl RollbackWorld<u32> for World {
    fn rollback(&mut self, key: &u32, tick: Tick) {
        let now = self.now;
        if let Some((live, tracker)) = self.entities.get_mut(key) {
            if let Some(historical) = tracker.rollback(tick, now, *live) {
                *live = historical;
            }
        }
    }

    fn restore(&mut self, key: &u32) {
        if let Some((live, tracker)) = self.entities.get_mut(key) {
            if let Some(saved) = tracker.restore() {
                *live = saved;
            }
        }
    }
}

proptest! {
    // The tracker's fallback ladder resolves exactly like lookups against
    // an identically-fed buffer: exact hit, else oldest when the request
    // precedes all history, else nearest earlier. And whenever a rollback
    // succeeds, a second one is refused until restore hands back the
    // parked live state.
    #[test]
    fn rollback_resolves_like_the_history_and_restore_round_trips(
        ticks in proptest::collection::vec(1u32..200, 0..24),
        target in 1u32..220,
    ) {
        let mut tracker = Tracker::new(capacity());
        let mut model: DejitterBuffer<Snap> = DejitterBuffer::new(capacity());
        for &tick in &ticks {
            prop_assert_eq!(tracker.record(Snap::at(tick)), model.store(Snap::at(tick)));
        }

        let live = Snap { tick: 250, pos: -1.0 };
        let target = Tick::new(target);
        let result = tracker.rollback(target, Tick::new(250), live);

        let expected = model
            .get(target)
            .or_else(|| {
                let oldest = model.oldest()?;
                if target < oldest.tick() {
                    Some(oldest)
                } else {
                    model.get_latest_at(target)
                }
            })
            .copied();
        prop_assert_eq!(result, expected);

        if result.is_some() {
            prop_assert_eq!(tracker.saved_tick(), Some(live.tick()));
            prop_assert_eq!(tracker.rollback(target, Tick::new(250), live), None);
            prop_assert_eq!(tracker.restore(), Some(live));
        } else {
            prop_assert_eq!(tracker.saved_tick(), None);
        }
        prop_assert_eq!(tracker.saved_tick(), None);
    }

    // Rolling back an arbitrary mix of registered, unregistered, and
    // duplicated keys and then restoring leaves every live state exactly
    // as found, with no rollback left in flight. Targets past `now` and
    // before all history are included on purpose.
    #[test]
    fn rollback_and_restore_leaves_the_world_as_found(
        registered in proptest::collection::vec(any::<bool>(), 6),
        requested in proptest::collection::vec(0u32..6, 0..12),
        target in 1u32..40,
    ) {
        let mut registry: Registry<u32> = Registry::new();
        let mut world = World::new(30);
        for key in 0..6u32 {
            world.spawn(key);
            if registered[key as usize] {
                registry.register(key).unwrap();
            }
        }

        let before: HashMap<u32, f32> = (0..6).map(|key| (key, world.pos(key))).collect();
        let keys = registry.to_tracked(&requested);
        registry.rollback_and_restore(Tick::new(target), &keys, &mut world, |_| ());

        for key in 0..6u32 {
            prop_assert_eq!(world.pos(key), before[&key]);
            prop_assert_eq!(world.entities[&key].1.saved_tick(), None);
        }
    }
}
