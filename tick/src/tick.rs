//! The tick counter type.

use std::fmt;

/// A simulation tick number.
///
/// Ticks are monotonically increasing identifiers for simulation steps,
/// advanced by exactly 1 per fixed step on the authority. Tick 0 is the
/// [`Tick::BAD`] sentinel: counters start at 0 and are advanced before first
/// use, so no real snapshot is ever stamped with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tick(u32);

impl Tick {
    /// Sentinel for "no valid tick yet".
    pub const BAD: Self = Self(0);

    /// Creates a new tick.
    #[must_use]
    pub const fn new(tick: u32) -> Self {
        Self(tick)
    }

    /// Returns the raw tick value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is the "no valid tick yet" sentinel.
    #[must_use]
    pub const fn is_bad(self) -> bool {
        self.0 == 0
    }

    /// The tick immediately after this one, saturating at the maximum.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The tick immediately before this one, or [`Tick::BAD`] at the origin.
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Adds a number of ticks, saturating at the maximum.
    #[must_use]
    pub const fn advance_by(self, ticks: u32) -> Self {
        Self(self.0.saturating_add(ticks))
    }

    /// Subtracts a delay, clamping at [`Tick::BAD`] instead of underflowing.
    ///
    /// Used to derive the render delay tick: while fewer than `delay` ticks
    /// have elapsed there is no valid tick to render at.
    #[must_use]
    pub const fn delayed_by(self, delay: u32) -> Self {
        Self(self.0.saturating_sub(delay))
    }

    /// Exact tick difference `self - earlier`, or `None` if `earlier` is
    /// actually later.
    #[must_use]
    pub const fn since(self, earlier: Self) -> Option<u32> {
        self.0.checked_sub(earlier.0)
    }
}

impl From<u32> for Tick {
    fn from(tick: u32) -> Self {
        Self(tick)
    }
}

impl From<Tick> for u32 {
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
