//! Lag-compensated physics queries.
//!
//! The physics engine itself is a collaborator behind [`QueryProvider`];
//! this module only coordinates the rewind: run the query against the
//! current world to find candidate roots, rewind the tracked ones to the
//! compensated tick, run the caller's query again, restore.

use std::fmt;
use std::hash::Hash;

use tick::Tick;

use crate::math::Vec3;
use crate::role::EntityAuthority;
use crate::rollback::{Registry, RollbackWorld};

/// A raycast query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
}

/// A sphere-overlap query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereVolume {
    pub center: Vec3,
    pub radius: f32,
}

/// One query result, resolved to the hit object's root key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit<K> {
    pub root: K,
    pub point: Vec3,
    pub distance: f32,
}

/// The synchronous physics seam. Results are bounded by `max_hits`;
/// raycast hits come back nearest-first.
pub trait QueryProvider<K> {
    fn raycast(&self, ray: &Ray, max_hits: usize) -> Vec<QueryHit<K>>;
    fn overlap_sphere(&self, volume: &SphereVolume, max_hits: usize) -> Vec<QueryHit<K>>;
}

/// Raycast as the world looked `delay` ticks ago.
///
/// An authoritative shooter queries the current world directly. For a
/// remote client's shot the candidate roots from a current-world pass are
/// rewound to `now - delay`, the ray is re-cast against the rewound world,
/// and every entity is restored before returning.
pub fn server_raycast<K, W>(
    registry: &Registry<K>,
    world: &mut W,
    shooter: EntityAuthority,
    now: Tick,
    delay: u32,
    ray: &Ray,
    max_hits: usize,
) -> Vec<QueryHit<K>>
where
    K: Eq + Hash + Clone + fmt::Debug,
    W: RollbackWorld<K> + QueryProvider<K>,
{
    let initial = world.raycast(ray, max_hits);
    let Some(keys) = compensation_keys(registry, shooter, delay, &initial) else {
        return initial;
    };
    registry.rollback_and_restore(now.delayed_by(delay), &keys, world, |w| {
        w.raycast(ray, max_hits)
    })
}

/// Sphere overlap as the world looked `delay` ticks ago. Same shape as
/// [`server_raycast`].
pub fn server_overlap_sphere<K, W>(
    registry: &Registry<K>,
    world: &mut W,
    shooter: EntityAuthority,
    now: Tick,
    delay: u32,
    volume: &SphereVolume,
    max_hits: usize,
) -> Vec<QueryHit<K>>
where
    K: Eq + Hash + Clone + fmt::Debug,
    W: RollbackWorld<K> + QueryProvider<K>,
{
    let initial = world.overlap_sphere(volume, max_hits);
    let Some(keys) = compensation_keys(registry, shooter, delay, &initial) else {
        return initial;
    };
    registry.rollback_and_restore(now.delayed_by(delay), &keys, world, |w| {
        w.overlap_sphere(volume, max_hits)
    })
}

/// The tracked roots a compensated re-query must rewind, or `None` when
/// the current-world result already stands (authoritative shooter, zero
/// delay, or nothing tracked among the hits).
fn compensation_keys<K>(
    registry: &Registry<K>,
    shooter: EntityAuthority,
    delay: u32,
    hits: &[QueryHit<K>],
) -> Option<Vec<K>>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    if !shooter.is_server_view() || delay == 0 {
        return None;
    }
    let roots: Vec<K> = hits.iter().map(|hit| hit.root.clone()).collect();
    let keys = registry.to_tracked(&roots);
    if keys.is_empty() {
        return None;
    }
    Some(keys)
}
