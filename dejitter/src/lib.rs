//! Fixed-capacity tick-indexed dejitter buffers.
//!
//! Snapshots from a remote authority arrive late, duplicated, and out of
//! order. A [`DejitterBuffer`] absorbs that jitter: a flat pre-allocated
//! array indexed by `(tick / divisor) % capacity`, giving O(1) insert and
//! point lookup plus O(capacity) scans for the nearest-at-or-before and
//! bracketing-pair queries interpolation needs.
//!
//! # Design Principles
//!
//! - **Structurally infallible** - Inserts never error; under capacity
//!   pressure older history is simply overwritten. History loss is a
//!   documented contract, not a failure.
//! - **Explicit occupancy** - Slots are `Option<T>`; an all-zero payload is
//!   a legitimate value, never an "empty" marker.
//! - **Small and flat** - Capacities are a few hundred at most, so linear
//!   scans beat a sorted structure on both simplicity and cache behavior.

mod buffer;

pub use buffer::{Bracket, DejitterBuffer, Timestamped};
