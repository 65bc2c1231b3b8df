//! Server-side rollback of tracked entities for lag-compensated queries.
//!
//! The server keeps a short per-entity state history. When it needs to test
//! a hit against the world a lagged client actually saw, it rewinds every
//! tracked entity to the compensated tick, runs the query, and restores the
//! live states. Restore is guaranteed on every exit path.
//!
//! History gaps never fail a query: they resolve to the nearest retained
//! state with a logged diagnostic, because a slightly-wrong rewind beats a
//! dropped hit test.

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

use dejitter::{DejitterBuffer, Timestamped};
use log::{error, warn};
use tick::Tick;

pub mod query;

/// Errors from [`Registry`] bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The key is already registered. Double registration means two owners
    /// think they manage the same entity, which is a caller bug.
    AlreadyRegistered,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered => write!(f, "key is already registered for rollback"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Per-entity state history plus a one-deep saved slot for the live state
/// displaced by a rollback.
///
/// The game's world representation owns one of these per tracked entity and
/// calls [`record`](Self::record) every fixed tick with the authoritative
/// state.
#[derive(Debug, Clone)]
pub struct Tracker<S> {
    history: DejitterBuffer<S>,
    saved: Option<S>,
}

impl<S: Timestamped + Clone> Tracker<S> {
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            history: DejitterBuffer::new(capacity),
            saved: None,
        }
    }

    /// Records the authoritative state for its tick. Returns `false` if the
    /// buffer rejected it (bad tick, or stale behind a newer occupant).
    pub fn record(&mut self, state: S) -> bool {
        self.history.store(state)
    }

    /// The newest recorded tick, if any.
    #[must_use]
    pub fn latest_tick(&self) -> Option<Tick> {
        self.history.latest().map(Timestamped::tick)
    }

    /// The tick of the live state displaced by an in-flight rollback, or
    /// `None` when no rollback is in flight.
    #[must_use]
    pub fn saved_tick(&self) -> Option<Tick> {
        self.saved.as_ref().map(Timestamped::tick)
    }

    /// Selects the historical state for `tick` and parks `live` in the
    /// saved slot.
    ///
    /// `now` is the current simulation tick; a rollback into the future is
    /// refused. A `tick` older than the retained history resolves to the
    /// oldest entry, and a gap at `tick` resolves to the nearest earlier
    /// entry, each with a logged diagnostic. Returns the state the caller
    /// should apply to the live entity, or `None` if the rollback was
    /// refused (nothing was saved in that case).
    pub fn rollback(&mut self, tick: Tick, now: Tick, live: S) -> Option<S> {
        if tick.is_bad() {
            error!("rollback requested for the bad tick");
            return None;
        }
        if self.saved.is_some() {
            error!("rollback to tick {tick} refused: previous rollback not restored");
            return None;
        }
        if tick > now {
            error!("rollback to tick {tick} refused: future of current tick {now}");
            return None;
        }

        let state = if let Some(exact) = self.history.get(tick) {
            exact.clone()
        } else if let Some(oldest) = self.history.oldest() {
            if tick < oldest.tick() {
                warn!(
                    "rollback to tick {tick} exceeded history, using oldest tick {}",
                    oldest.tick()
                );
                oldest.clone()
            } else if let Some(nearest) = self.history.get_latest_at(tick) {
                error!(
                    "no state recorded at tick {tick}, using nearest tick {}",
                    nearest.tick()
                );
                nearest.clone()
            } else {
                error!("no state recorded at or before tick {tick}");
                return None;
            }
        } else {
            error!("rollback to tick {tick} refused: no history recorded");
            return None;
        };

        self.saved = Some(live);
        Some(state)
    }

    /// Takes the saved live state for the caller to re-apply. A restore
    /// with no rollback in flight is a logged no-op.
    pub fn restore(&mut self) -> Option<S> {
        let saved = self.saved.take();
        if saved.is_none() {
            warn!("restore with no rollback in flight");
        }
        saved
    }
}

/// How the rollback coordinator reaches live entities.
///
/// The world representation owns the entities and their [`Tracker`]s; the
/// [`Registry`] only decides which keys to rewind and when. Implementations
/// route `rollback` through [`Tracker::rollback`] and apply the returned
/// state, and `restore` through [`Tracker::restore`].
pub trait RollbackWorld<K> {
    /// Rewinds the entity at `key` to its recorded state for `tick`.
    fn rollback(&mut self, key: &K, tick: Tick);

    /// Re-applies the live state saved by the last `rollback` of `key`.
    fn restore(&mut self, key: &K);
}

/// Process-wide registry of keys eligible for rollback.
#[derive(Debug, Clone, Default)]
pub struct Registry<K> {
    keys: HashSet<K>,
}

impl<K: Eq + Hash + Clone + fmt::Debug> Registry<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: HashSet::new(),
        }
    }

    /// Registers a key for rollback tracking.
    pub fn register(&mut self, key: K) -> Result<(), RegistryError> {
        if !self.keys.insert(key) {
            return Err(RegistryError::AlreadyRegistered);
        }
        Ok(())
    }

    /// Removes a key. Returns `false` if it was not registered.
    pub fn unregister(&mut self, key: &K) -> bool {
        self.keys.remove(key)
    }

    #[must_use]
    pub fn is_registered(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Every registered key, in arbitrary order.
    #[must_use]
    pub fn tracked(&self) -> Vec<K> {
        self.keys.iter().cloned().collect()
    }

    /// Filters arbitrary query-hit roots down to registered keys.
    ///
    /// An unregistered root means the query struck something outside the
    /// rollback set (static geometry, an untracked prop); it is dropped
    /// with a diagnostic, not an error.
    #[must_use]
    pub fn to_tracked(&self, hit_roots: &[K]) -> Vec<K> {
        let mut tracked = Vec::with_capacity(hit_roots.len());
        for root in hit_roots {
            if self.keys.contains(root) {
                tracked.push(root.clone());
            } else {
                warn!("query hit untracked root {root:?}, dropping");
            }
        }
        tracked
    }

    /// Rewinds each registered key in `keys` to `tick`. Returns how many
    /// were rewound.
    pub fn rollback<W: RollbackWorld<K>>(&self, tick: Tick, keys: &[K], world: &mut W) -> usize {
        if tick.is_bad() {
            error!("registry rollback requested for the bad tick");
            return 0;
        }
        let mut count = 0;
        for key in keys {
            if self.keys.contains(key) {
                world.rollback(key, tick);
                count += 1;
            } else {
                warn!("rollback requested for unregistered key {key:?}, skipping");
            }
        }
        count
    }

    /// Restores each key in `keys` to its saved live state.
    pub fn restore<W: RollbackWorld<K>>(&self, keys: &[K], world: &mut W) {
        for key in keys {
            world.restore(key);
        }
    }

    /// Rewinds `keys` to `tick`, runs `action`, and restores.
    ///
    /// Restore runs on every exit path, including a panic inside `action`.
    pub fn rollback_and_restore<W, R>(
        &self,
        tick: Tick,
        keys: &[K],
        world: &mut W,
        action: impl FnOnce(&mut W) -> R,
    ) -> R
    where
        W: RollbackWorld<K>,
    {
        self.rollback(tick, keys, world);
        let mut guard = RestoreGuard {
            registry: self,
            keys,
            world,
        };
        action(&mut *guard.world)
    }
}

/// Restores rolled-back keys when dropped.
struct RestoreGuard<'a, K, W>
where
    K: Eq + Hash + Clone + fmt::Debug,
    W: RollbackWorld<K>,
{
    registry: &'a Registry<K>,
    keys: &'a [K],
    world: &'a mut W,
}

impl<K, W> Drop for RestoreGuard<'_, K, W>
where
    K: Eq + Hash + Clone + fmt::Debug,
    W: RollbackWorld<K>,
{
    fn drop(&mut self) {
        self.registry.restore(self.keys, &mut *self.world);
    }
}
