//! Client-side prediction and server-side command execution.
//!
//! A controlled entity does not wait for the server: every fixed tick the
//! owning client samples input, executes it speculatively, and remembers the
//! (input, predicted output) pair. The server executes the same commands
//! authoritatively and replies with corrections; when one arrives the client
//! rewinds to the corrected tick and deterministically replays everything
//! after it.
//!
//! Correctness rests on the [`CommandSim`] seam being deterministic: the
//! same state and the same input must produce the same output on both
//! sides. Everything here degrades rather than fails - a lost command is
//! dead-reckoned, a stale correction is dropped with a diagnostic, and the
//! fixed-tick path never returns an error.

use std::num::NonZeroUsize;

use dejitter::{DejitterBuffer, Timestamped};
use log::{debug, warn};
use tick::{Tick, TickClock};

use crate::role::EntityAuthority;

/// Client command history capacity, in ticks. Roughly 4-7 seconds at
/// common rates; corrections older than this are unrecoverable anyway.
pub const HISTORY_CAPACITY: usize = 200;

/// Server inbound command buffer capacity, in ticks. Roughly 2 seconds;
/// commands further ahead than this indicate a badly skewed client clock.
pub const INBOUND_CAPACITY: usize = 60;

/// One tick's worth of intent and its simulation result.
///
/// The output is speculative on the client until the authority confirms or
/// corrects it.
#[derive(Debug, Clone, PartialEq)]
pub struct Command<I, O> {
    pub tick: Tick,
    /// Set on the first (speculative or authoritative) execution of this
    /// command, cleared on replays. One-shot side effects key off this.
    pub first_execute: bool,
    pub input: I,
    pub output: O,
}

impl<I, O> Timestamped for Command<I, O> {
    fn tick(&self) -> Tick {
        self.tick
    }
}

/// The authority's reply to a command: the output it actually computed.
#[derive(Debug, Clone, PartialEq)]
pub struct Correction<O> {
    pub tick: Tick,
    pub output: O,
}

/// The deterministic gameplay seam.
///
/// `execute` must be a pure function of (current state, `cmd.input`) when
/// `reset` is false. With `reset` true it must instead apply `cmd.output`
/// directly as the new state, without re-deriving it; that is how a
/// correction rewinds the simulation to an authoritative baseline.
pub trait CommandSim<I, O> {
    /// Samples this tick's input from the local controller.
    fn sample_input(&mut self) -> I;

    /// Executes a command against the current state and returns the
    /// resulting output.
    fn execute(&mut self, cmd: &Command<I, O>, reset: bool) -> O;
}

/// Client side of a predicted entity.
///
/// Owns the command history and the reconciliation loop. The owning game
/// object calls [`fixed_tick`](Self::fixed_tick) once per fixed step and
/// [`apply_correction`](Self::apply_correction) whenever the transport
/// delivers an authoritative reply.
#[derive(Debug, Clone)]
pub struct Predictor<I, O> {
    history: DejitterBuffer<Command<I, O>>,
    last_server_tick: Tick,
    last_fixed_tick: Tick,
}

impl<I, O> Predictor<I, O>
where
    I: Clone,
    O: Clone + Default,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(NonZeroUsize::new(HISTORY_CAPACITY).expect("capacity is non-zero"))
    }

    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            history: DejitterBuffer::new(capacity),
            last_server_tick: Tick::BAD,
            last_fixed_tick: Tick::BAD,
        }
    }

    /// Aligns the predictor with the clock on join, so the first fixed
    /// step does not try to catch up from tick zero.
    pub fn begin(&mut self, server_tick: Tick) {
        self.last_fixed_tick = server_tick;
    }

    /// The newest corrected tick, [`Tick::BAD`] before the first correction.
    #[must_use]
    pub const fn last_server_tick(&self) -> Tick {
        self.last_server_tick
    }

    /// The locally buffered command for `tick`, if still in history. Lets
    /// callers compare a speculative output against an incoming correction.
    #[must_use]
    pub fn command(&self, tick: Tick) -> Option<&Command<I, O>> {
        self.history.get(tick)
    }

    /// Runs the command loop for every tick since the last call.
    ///
    /// The clock may have advanced more than one tick since the last fixed
    /// step (a rebase after a tick broadcast, or a stalled frame); each
    /// missed tick gets its own command so the history has no holes.
    ///
    /// Commands generated by a client-only owner are pushed to
    /// `out_commands` for the transport and recorded in history with
    /// `first_execute` cleared, ready for replay.
    pub fn fixed_tick<S: CommandSim<I, O>>(
        &mut self,
        clock: &TickClock,
        authority: EntityAuthority,
        sim: &mut S,
        out_commands: &mut Vec<Command<I, O>>,
    ) {
        if !authority.is_predicting() {
            return;
        }

        while self.last_fixed_tick < clock.tick() {
            let tick = self.last_fixed_tick.next();
            self.last_fixed_tick = tick;

            if authority.is_client_only() {
                self.reconcile(sim);
            }

            let mut cmd = Command {
                tick,
                first_execute: true,
                input: sim.sample_input(),
                output: O::default(),
            };
            cmd.output = sim.execute(&cmd, false);

            if authority.is_client_only() {
                out_commands.push(cmd.clone());
                cmd.first_execute = false;
                self.history.store(cmd);
            }
        }
    }

    /// Applies the authority's reply for one tick.
    ///
    /// The matching history entry's output is overwritten in place; the
    /// next fixed step's reconciliation replays from there. A correction
    /// for a tick no longer (or not yet) in history is dropped with a
    /// diagnostic - it is either stale beyond the buffer or from a
    /// desynced server, and replaying from it would corrupt newer state.
    pub fn apply_correction(&mut self, correction: Correction<O>) {
        let Some(entry) = self.history.get(correction.tick) else {
            warn!(
                "correction for tick {} not in history, dropping",
                correction.tick
            );
            return;
        };

        let mut cmd = entry.clone();
        cmd.output = correction.output;
        self.last_server_tick = correction.tick;
        if !self.history.replace(cmd) {
            warn!(
                "correction for tick {} lost a slot race, dropping",
                correction.tick
            );
        }
    }

    /// Rewinds to the last corrected command and replays everything after
    /// it, refreshing each replayed entry's speculative output.
    fn reconcile<S: CommandSim<I, O>>(&mut self, sim: &mut S) {
        if self.last_server_tick.is_bad() {
            return;
        }
        let Some(base) = self.history.get(self.last_server_tick).cloned() else {
            return;
        };
        sim.execute(&base, true);

        for mut cmd in self.history.range_from(self.last_server_tick.next()) {
            cmd.output = sim.execute(&cmd, false);
            self.history.replace(cmd);
        }
    }
}

impl<I, O> Default for Predictor<I, O>
where
    I: Clone,
    O: Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Server side of a predicted entity: buffers the owning client's commands
/// and executes them authoritatively, one tick behind the clock.
#[derive(Debug, Clone)]
pub struct CommandHost<I, O> {
    inbound: DejitterBuffer<Command<I, O>>,
    last_command: Option<Command<I, O>>,
}

impl<I, O> CommandHost<I, O>
where
    I: Clone,
    O: Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(NonZeroUsize::new(INBOUND_CAPACITY).expect("capacity is non-zero"))
    }

    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            inbound: DejitterBuffer::new(capacity),
            last_command: None,
        }
    }

    /// Accepts a command from the owning client.
    ///
    /// `first_execute` is forced on - the client's speculative execution
    /// does not count as this command's first authoritative run. A command
    /// already behind the current tick is executed immediately instead of
    /// buffered (it would never be reached by the normal loop), and its
    /// correction is returned.
    pub fn receive<S: CommandSim<I, O>>(
        &mut self,
        mut cmd: Command<I, O>,
        now: Tick,
        sim: &mut S,
    ) -> Option<Correction<O>> {
        cmd.first_execute = true;
        if cmd.tick.is_bad() {
            warn!("command with bad tick, dropping");
            return None;
        }

        if cmd.tick < now {
            debug!("late command for tick {} at {}, executing now", cmd.tick, now);
            return Some(self.run(cmd, sim));
        }

        self.inbound.store(cmd);
        None
    }

    /// Executes the command for `now - 1`.
    ///
    /// The one-tick lag gives in-flight commands a last chance to arrive.
    /// When nothing arrived for that tick the last known command is
    /// replayed with its tick re-stamped - the client is presumed to still
    /// be doing what it last said (dead reckoning), not to have stopped.
    /// Returns the correction to send back, or `None` before the first
    /// command is known.
    pub fn fixed_tick<S: CommandSim<I, O>>(
        &mut self,
        now: Tick,
        sim: &mut S,
    ) -> Option<Correction<O>> {
        let target = now.prev();
        if target.is_bad() {
            return None;
        }

        let cmd = match self.inbound.get(target) {
            Some(buffered) => buffered.clone(),
            None => {
                let mut last = self.last_command.clone()?;
                debug!("no command for tick {target}, dead-reckoning last input");
                last.tick = target;
                last.first_execute = false;
                last
            }
        };
        Some(self.run(cmd, sim))
    }

    fn run<S: CommandSim<I, O>>(&mut self, mut cmd: Command<I, O>, sim: &mut S) -> Correction<O> {
        cmd.output = sim.execute(&cmd, false);
        let correction = Correction {
            tick: cmd.tick,
            output: cmd.output.clone(),
        };
        self.last_command = Some(cmd);
        correction
    }
}

impl<I, O> Default for CommandHost<I, O>
where
    I: Clone,
    O: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tick::TickRate;

    // A 1D integrator: input is velocity for the tick, output is the
    // resulting position. Deterministic by construction.
    struct LineSim {
        pos: f32,
        script: Vec<f32>,
        cursor: usize,
        executes: usize,
    }

    impl LineSim {
        fn new(script: &[f32]) -> Self {
            Self {
                pos: 0.0,
                script: script.to_vec(),
                cursor: 0,
                executes: 0,
            }
        }
    }

    impl CommandSim<f32, f32> for LineSim {
        fn sample_input(&mut self) -> f32 {
            let input = self.script.get(self.cursor).copied().unwrap_or(0.0);
            self.cursor += 1;
            input
        }

        fn execute(&mut self, cmd: &Command<f32, f32>, reset: bool) -> f32 {
            self.executes += 1;
            if reset {
                self.pos = cmd.output;
            } else {
                self.pos += cmd.input;
            }
            self.pos
        }
    }

    fn client_clock_at(tick: u32) -> TickClock {
        let mut clock = TickClock::client(TickRate::new(30).unwrap(), 0.3);
        clock.start(Tick::new(tick));
        clock
    }

    const CLIENT_OWNER: EntityAuthority = EntityAuthority::new(false, true);
    const OBSERVER: EntityAuthority = EntityAuthority::new(false, false);

    #[test]
    fn predictor_executes_and_buffers_each_tick() {
        let mut predictor: Predictor<f32, f32> = Predictor::new();
        let mut sim = LineSim::new(&[1.0, 2.0, 3.0]);
        let mut out = Vec::new();

        predictor.begin(Tick::new(10));
        let mut clock = client_clock_at(10);
        for _ in 0..3 {
            clock.advance();
            predictor.fixed_tick(&clock, CLIENT_OWNER, &mut sim, &mut out);
        }

        assert_eq!(out.len(), 3);
        assert_eq!(out[0].tick, Tick::new(11));
        assert!(out[0].first_execute, "transport copy keeps the flag");
        assert!((out[2].output - 6.0).abs() < f32::EPSILON, "cumulative prediction");
        assert!((sim.pos - 6.0).abs() < f32::EPSILON);

        // History holds the same commands, flagged as already executed.
        let stored = predictor.history.get(Tick::new(12)).unwrap();
        assert!(!stored.first_execute);
        assert!((stored.output - 3.0).abs() < f32::EPSILON);
    }

    #[test]
    fn catch_up_covers_skipped_ticks() {
        let mut predictor: Predictor<f32, f32> = Predictor::new();
        let mut sim = LineSim::new(&[1.0; 8]);
        let mut out = Vec::new();

        predictor.begin(Tick::new(10));
        let mut clock = client_clock_at(10);
        // A rebase jumps the clock three ticks at once.
        clock.advance();
        clock.advance();
        clock.advance();
        predictor.fixed_tick(&clock, CLIENT_OWNER, &mut sim, &mut out);

        let ticks: Vec<u32> = out.iter().map(|c| c.tick.raw()).collect();
        assert_eq!(ticks, vec![11, 12, 13], "no holes in the history");
    }

    #[test]
    fn observer_generates_nothing() {
        let mut predictor: Predictor<f32, f32> = Predictor::new();
        let mut sim = LineSim::new(&[1.0]);
        let mut out = Vec::new();

        predictor.begin(Tick::new(10));
        let mut clock = client_clock_at(10);
        clock.advance();
        predictor.fixed_tick(&clock, OBSERVER, &mut sim, &mut out);
        assert!(out.is_empty());
        assert_eq!(sim.executes, 0);
    }

    #[test]
    fn correction_replay_converges_on_server_state() {
        let mut predictor: Predictor<f32, f32> = Predictor::new();
        let mut sim = LineSim::new(&[1.0, 1.0, 1.0, 1.0]);
        let mut out = Vec::new();

        predictor.begin(Tick::new(10));
        let mut clock = client_clock_at(10);
        for _ in 0..3 {
            clock.advance();
            predictor.fixed_tick(&clock, CLIENT_OWNER, &mut sim, &mut out);
        }
        // Predicted positions: 1, 2, 3. The server says tick 11 actually
        // ended at 1.5 (the client mispredicted by half a unit).
        assert!((sim.pos - 3.0).abs() < f32::EPSILON);
        predictor.apply_correction(Correction {
            tick: Tick::new(11),
            output: 1.5,
        });
        assert_eq!(predictor.last_server_tick(), Tick::new(11));

        // Next fixed step reconciles before executing tick 14: reset to
        // 1.5, replay ticks 12 and 13 (+1 each), then execute 14 (+1).
        clock.advance();
        predictor.fixed_tick(&clock, CLIENT_OWNER, &mut sim, &mut out);
        assert!((sim.pos - 4.5).abs() < f32::EPSILON, "converged on corrected base");

        // Replayed history entries carry the refreshed outputs.
        let replayed = predictor.history.get(Tick::new(13)).unwrap();
        assert!((replayed.output - 3.5).abs() < f32::EPSILON);
    }

    #[test]
    fn stale_correction_is_dropped() {
        let mut predictor: Predictor<f32, f32> = Predictor::new();
        let mut sim = LineSim::new(&[1.0; 4]);
        let mut out = Vec::new();

        predictor.begin(Tick::new(10));
        let mut clock = client_clock_at(10);
        clock.advance();
        predictor.fixed_tick(&clock, CLIENT_OWNER, &mut sim, &mut out);

        predictor.apply_correction(Correction {
            tick: Tick::new(500),
            output: 9.0,
        });
        assert_eq!(predictor.last_server_tick(), Tick::BAD, "no-op on unknown tick");
    }

    #[test]
    fn host_executes_one_tick_behind() {
        let mut host: CommandHost<f32, f32> = CommandHost::new();
        let mut sim = LineSim::new(&[]);

        let cmd = Command {
            tick: Tick::new(11),
            first_execute: false,
            input: 2.0,
            output: 0.0,
        };
        assert_eq!(host.receive(cmd, Tick::new(11), &mut sim), None);

        // Tick 11 is executed when the clock reaches 12.
        assert_eq!(host.fixed_tick(Tick::new(11), &mut sim), None);
        let correction = host.fixed_tick(Tick::new(12), &mut sim).unwrap();
        assert_eq!(correction.tick, Tick::new(11));
        assert!((correction.output - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn host_dead_reckons_dropped_commands() {
        let mut host: CommandHost<f32, f32> = CommandHost::new();
        let mut sim = LineSim::new(&[]);

        let cmd = Command {
            tick: Tick::new(11),
            first_execute: false,
            input: 2.0,
            output: 0.0,
        };
        host.receive(cmd, Tick::new(11), &mut sim);
        host.fixed_tick(Tick::new(12), &mut sim);

        // Nothing arrived for tick 12: replay the last input, re-stamped.
        let correction = host.fixed_tick(Tick::new(13), &mut sim).unwrap();
        assert_eq!(correction.tick, Tick::new(12));
        assert!((correction.output - 4.0).abs() < f32::EPSILON, "kept moving");
    }

    #[test]
    fn host_silent_before_first_command() {
        let mut host: CommandHost<f32, f32> = CommandHost::new();
        let mut sim = LineSim::new(&[]);
        assert_eq!(host.fixed_tick(Tick::new(5), &mut sim), None);
        assert_eq!(sim.executes, 0);
    }

    #[test]
    fn host_executes_late_command_immediately() {
        let mut host: CommandHost<f32, f32> = CommandHost::new();
        let mut sim = LineSim::new(&[]);

        let cmd = Command {
            tick: Tick::new(8),
            first_execute: false,
            input: 3.0,
            output: 0.0,
        };
        let correction = host.receive(cmd, Tick::new(10), &mut sim).unwrap();
        assert_eq!(correction.tick, Tick::new(8));
        assert!((correction.output - 3.0).abs() < f32::EPSILON);
        assert_eq!(sim.executes, 1);
    }

    #[test]
    fn host_forces_first_execute_on() {
        let mut host: CommandHost<f32, f32> = CommandHost::new();
        let mut sim = LineSim::new(&[]);

        let cmd = Command {
            tick: Tick::new(11),
            first_execute: false,
            input: 1.0,
            output: 0.0,
        };
        host.receive(cmd, Tick::new(11), &mut sim);
        let stored = host.inbound.get(Tick::new(11)).unwrap();
        assert!(stored.first_execute);
    }

    #[test]
    fn host_drops_bad_tick_command() {
        let mut host: CommandHost<f32, f32> = CommandHost::new();
        let mut sim = LineSim::new(&[]);
        let cmd = Command {
            tick: Tick::BAD,
            first_execute: false,
            input: 1.0,
            output: 0.0,
        };
        assert_eq!(host.receive(cmd, Tick::new(10), &mut sim), None);
        assert_eq!(host.fixed_tick(Tick::new(10), &mut sim), None);
    }
}
