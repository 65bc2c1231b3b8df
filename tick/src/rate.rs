//! Tick-rate configuration and wall-time conversions.

use std::fmt;

/// Errors from constructing a [`TickRate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateError {
    /// A tick rate of zero would make every conversion divide by zero.
    ZeroRate,
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroRate => write!(f, "tick rate must be at least 1 tick per second"),
        }
    }
}

impl std::error::Error for RateError {}

/// Fixed simulation step rate.
///
/// All real-time quantities (RTT, render delay, cooldowns) are converted to
/// tick counts through this. Validated at construction: a zero rate is a
/// static authoring mistake, not a runtime condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickRate {
    ticks_per_sec: u32,
}

impl TickRate {
    /// Creates a tick rate, rejecting zero.
    pub const fn new(ticks_per_sec: u32) -> Result<Self, RateError> {
        if ticks_per_sec == 0 {
            return Err(RateError::ZeroRate);
        }
        Ok(Self { ticks_per_sec })
    }

    /// Ticks per second.
    #[must_use]
    pub const fn ticks_per_sec(self) -> u32 {
        self.ticks_per_sec
    }

    /// Duration of one tick in seconds.
    #[must_use]
    pub fn secs_per_tick(self) -> f32 {
        1.0 / self.ticks_per_sec as f32
    }

    /// Converts a duration in seconds to a whole tick count, rounding to
    /// nearest. Negative durations convert to 0.
    #[must_use]
    pub fn seconds_to_ticks(self, secs: f32) -> u32 {
        if secs <= 0.0 || !secs.is_finite() {
            return 0;
        }
        (secs * self.ticks_per_sec as f32).round() as u32
    }

    /// Converts a tick count back to seconds.
    #[must_use]
    pub fn ticks_to_seconds(self, ticks: u32) -> f32 {
        ticks as f32 * self.secs_per_tick()
    }

    /// Ticks between actions at the given actions-per-second rate.
    ///
    /// Non-positive rates convert to 0 (no cooldown).
    #[must_use]
    pub fn actions_per_second_to_ticks(self, aps: f32) -> u32 {
        if aps <= 0.0 || !aps.is_finite() {
            return 0;
        }
        self.seconds_to_ticks(1.0 / aps)
    }

    /// Ticks between actions at the given actions-per-minute rate.
    #[must_use]
    pub fn actions_per_minute_to_ticks(self, apm: f32) -> u32 {
        if apm <= 0.0 || !apm.is_finite() {
            return 0;
        }
        self.actions_per_second_to_ticks(apm / 60.0)
    }
}

impl Default for TickRate {
    /// 30 Hz, the conventional snapshot rate.
    fn default() -> Self {
        Self { ticks_per_sec: 30 }
    }
}
