//! Render-side interpolation between buffered snapshots.

use std::fmt;

use dejitter::{DejitterBuffer, Timestamped};
use tick::{Tick, TickRate};

/// Per-axis blending between two snapshots of the same entity.
///
/// `pos_t` is the bracket progress fraction (elapsed render time over the
/// real-time span between the two snapshot ticks, unclamped). `rot_t` is a
/// per-frame smoothing step (`delta_time * rotation_smoothing`).
///
/// The two factors are deliberately different: positional fields blend
/// linearly by `pos_t` and reach the target tick-accurately, while
/// rotational fields slerp by `rot_t` and approach the target smoothly,
/// possibly lagging it. This asymmetry is part of the contract and is
/// pinned by test; do not unify the factors.
pub trait Blend {
    #[must_use]
    fn blend(&self, to: &Self, pos_t: f32, rot_t: f32) -> Self;
}

/// Errors from constructing a [`TransitionConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransitionError {
    /// Rotation smoothing must be a positive finite rate.
    InvalidSmoothing { value: f32 },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSmoothing { value } => {
                write!(f, "rotation smoothing must be positive and finite, got {value}")
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// Interpolation tuning. Validated at construction; a non-positive
/// smoothing rate is a static authoring mistake.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionConfig {
    rotation_smoothing: f32,
}

impl TransitionConfig {
    pub fn new(rotation_smoothing: f32) -> Result<Self, TransitionError> {
        if !rotation_smoothing.is_finite() || rotation_smoothing <= 0.0 {
            return Err(TransitionError::InvalidSmoothing {
                value: rotation_smoothing,
            });
        }
        Ok(Self { rotation_smoothing })
    }

    /// Per-second rotation smoothing rate.
    #[must_use]
    pub const fn rotation_smoothing(self) -> f32 {
        self.rotation_smoothing
    }
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            rotation_smoothing: 15.0,
        }
    }
}

/// Interpolation state machine for one remote-view entity.
///
/// Two states: idle (no bracket yet) and transitioning (a `from`/`to`
/// snapshot pair is armed). There is no terminal state - the machine
/// re-derives its bracket every render frame the buffer has data past the
/// delay tick, and when the buffer starves the last bracket persists so
/// sampling keeps extrapolating (positions) or holding (rotations).
#[derive(Debug, Clone)]
pub struct Transition<S> {
    config: TransitionConfig,
    bracket: Option<(S, S)>,
    elapsed: f32,
    time_to_target: f32,
}

impl<S: Timestamped + Blend + Clone> Transition<S> {
    #[must_use]
    pub fn new(config: TransitionConfig) -> Self {
        Self {
            config,
            bracket: None,
            elapsed: 0.0,
            time_to_target: 0.0,
        }
    }

    /// `true` until the first bracket is armed.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.bracket.is_none()
    }

    /// The tick this entity is rendering toward, or [`Tick::BAD`] while
    /// idle. This is the remote observer's reference tick.
    #[must_use]
    pub fn target_tick(&self) -> Tick {
        self.bracket
            .as_ref()
            .map_or(Tick::BAD, |(_, to)| to.tick())
    }

    /// Re-derives the interpolation bracket from the buffer.
    ///
    /// Call once per render frame, before [`sample`](Self::sample), on a
    /// non-authoritative non-host observer. Arms only when the buffer's
    /// latest tick has moved past the delay tick; otherwise the previous
    /// bracket (if any) persists.
    pub fn retarget(&mut self, buffer: &DejitterBuffer<S>, delay_tick: Tick, rate: TickRate) {
        let has_new = buffer
            .latest()
            .is_some_and(|latest| latest.tick() > delay_tick);
        if !has_new {
            return;
        }

        // Anchor at the newest snapshot not past the delay tick, then
        // bracket around the anchor itself so `next` is the snapshot being
        // rendered toward.
        let Some(anchor) = buffer.get_latest_at(delay_tick).map(Timestamped::tick) else {
            return;
        };
        let bracket = buffer.first_after(anchor);
        if let (Some(current), Some(next)) = (bracket.current, bracket.next) {
            self.arm(current.clone(), next.clone(), rate);
        }
    }

    /// Fast-path retarget when a snapshot arrives between render frames.
    ///
    /// A freshly stored snapshot that is already behind the delay tick but
    /// ahead of the current target becomes the new target immediately,
    /// without waiting for the next full bracket derivation.
    pub fn on_store(&mut self, state: &S, delay_tick: Tick, rate: TickRate) {
        let Some((_, to)) = &self.bracket else {
            return;
        };
        if state.tick() < delay_tick && state.tick() > to.tick() {
            let from = to.clone();
            self.arm(from, state.clone(), rate);
        }
    }

    /// Advances render time by `dt` seconds and samples the blended state.
    ///
    /// Positions blend by `elapsed / time_to_target`, unclamped - if
    /// rendering falls behind the fraction exceeds 1 and extrapolates.
    /// Rotations blend by `dt * rotation_smoothing` regardless of bracket
    /// progress. Returns `None` while idle.
    pub fn sample(&mut self, dt: f32) -> Option<S> {
        let (from, to) = self.bracket.as_ref()?;
        self.elapsed += dt;
        let pos_t = self.elapsed / self.time_to_target;
        let rot_t = dt * self.config.rotation_smoothing;
        Some(from.blend(to, pos_t, rot_t))
    }

    fn arm(&mut self, from: S, to: S, rate: TickRate) {
        // Bracket ticks are strictly ordered, so the span is at least one
        // tick and the division in `sample` is safe.
        let span = to.tick().since(from.tick()).unwrap_or(1).max(1);
        self.elapsed = 0.0;
        self.time_to_target = rate.ticks_to_seconds(span);
        self.bracket = Some((from, to));
    }
}
