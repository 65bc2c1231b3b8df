//! Tick counter, tick clock, and scheduled events for tsync.
//!
//! Everything in the engine is keyed by a [`Tick`]: a monotonically
//! increasing counter that advances once per fixed simulation step on the
//! authority. This crate provides the tick type itself, the
//! [`TickRate`] conversions between wall time and ticks, the per-role
//! [`TickClock`] that estimates the authority's tick and derives the render
//! delay tick, and a tick-ordered [`EventQueue`] for events that must not
//! fire before their tick becomes visible.
//!
//! # Design Principles
//!
//! - **No ambient globals** - Clocks are plain values owned by the caller,
//!   one per simulation role.
//! - **Sentinel, not option** - [`Tick::BAD`] marks "no valid tick yet" so
//!   tick-stamped values stay `Copy` and trivially defaultable.
//! - **Deterministic** - Same inputs produce same outputs.

mod clock;
mod events;
mod rate;
mod tick;

pub use clock::{Role, TickClock};
pub use events::EventQueue;
pub use rate::{RateError, TickRate};
pub use tick::Tick;
