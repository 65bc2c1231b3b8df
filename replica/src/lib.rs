//! Snapshot interpolation, rollback, and prediction for tsync.
//!
//! This is the crate that turns buffered per-tick snapshots into behavior:
//!
//! - [`transition`] renders a remote entity smoothly between two buffered
//!   snapshots at the clock's delay tick.
//! - [`rollback`] rewinds tracked entities to a historical tick around a
//!   physics query, then restores them, so the server can test hits against
//!   the world a lagged client actually saw.
//! - [`predict`] buffers a controlled entity's commands, speculatively
//!   executes them ahead of the server, and replays them on authoritative
//!   correction.
//!
//! # Design Principles
//!
//! - **Degrade, never stall** - History gaps resolve to the nearest
//!   available data with a logged diagnostic. Nothing in the fixed-tick path
//!   returns an error or panics.
//! - **Deterministic** - Reconciliation is only sound if command execution
//!   is a pure function of (state, input); the [`predict::CommandSim`] seam
//!   documents and tests that requirement.
//! - **Single-threaded** - One fixed-tick callback and one render callback,
//!   same thread. No buffer is ever shared across roles.

pub mod math;
pub mod predict;
pub mod role;
pub mod rollback;
pub mod transition;

pub use math::{Quat, Vec3};
pub use predict::{Command, CommandHost, CommandSim, Correction, Predictor};
pub use role::EntityAuthority;
pub use rollback::{Registry, RegistryError, RollbackWorld, Tracker};
pub use transition::{Blend, Transition, TransitionConfig, TransitionError};
