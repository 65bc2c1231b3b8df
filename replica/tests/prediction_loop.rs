//! End-to-end client/server command loop with lossy delivery.
//!
//! The client predicts with deliberately wrong physics (no drag), the
//! server simulates with drag, and every fifth command is dropped in
//! transit. Corrections must still pull the client onto the server's
//! trajectory once input settles.

use replica::{Command, CommandHost, CommandSim, Correction, EntityAuthority, Predictor};
use tick::{Tick, TickClock, TickRate};

const CLIENT_OWNER: EntityAuthority = EntityAuthority::new(false, true);

/// 1D mover: input is intended velocity, output is resulting position.
struct Mover {
    pos: f32,
    drag: f32,
}

impl Mover {
    fn new(drag: f32) -> Self {
        Self { pos: 0.0, drag }
    }
}

impl CommandSim<f32, f32> for Mover {
    fn sample_input(&mut self) -> f32 {
        // Input is fed externally per tick; sampling happens through the
        // script below.
        unreachable!("integration loop drives input through ScriptedMover")
    }

    fn execute(&mut self, cmd: &Command<f32, f32>, reset: bool) -> f32 {
        if reset {
            self.pos = cmd.output;
        } else {
            self.pos += cmd.input * self.drag;
        }
        self.pos
    }
}

/// Client-side wrapper feeding a scripted input stream into the mover.
struct ScriptedMover {
    mover: Mover,
    script: Vec<f32>,
    cursor: usize,
}

impl ScriptedMover {
    fn new(drag: f32, script: Vec<f32>) -> Self {
        Self {
            mover: Mover::new(drag),
            script,
            cursor: 0,
        }
    }
}

impl CommandSim<f32, f32> for ScriptedMover {
    fn sample_input(&mut self) -> f32 {
        let input = self.script.get(self.cursor).copied().unwrap_or(0.0);
        self.cursor += 1;
        input
    }

    fn execute(&mut self, cmd: &Command<f32, f32>, reset: bool) -> f32 {
        self.mover.execute(cmd, reset)
    }
}

#[test]
fn client_converges_on_authoritative_trajectory() {
    // Push for 30 ticks, then coast for 15.
    let mut script = vec![1.0; 30];
    script.extend(std::iter::repeat(0.0).take(15));

    // Client mispredicts: it ignores drag entirely.
    let mut client_sim = ScriptedMover::new(1.0, script);
    let mut server_sim = Mover::new(0.9);

    let mut clock = TickClock::client(TickRate::new(30).unwrap(), 0.3);
    clock.start(Tick::new(0));
    let mut predictor: Predictor<f32, f32> = Predictor::new();
    predictor.begin(clock.tick());
    let mut host: CommandHost<f32, f32> = CommandHost::new();

    let mut outbound: Vec<Command<f32, f32>> = Vec::new();
    let mut corrections: Vec<Correction<f32>> = Vec::new();

    for step in 1..=45u32 {
        let now = Tick::new(step);
        clock.advance();
        predictor.fixed_tick(&clock, CLIENT_OWNER, &mut client_sim, &mut outbound);

        for cmd in outbound.drain(..) {
            // Every fifth command is lost in transit.
            if cmd.tick.raw() % 5 == 0 {
                continue;
            }
            if let Some(correction) = host.receive(cmd, now, &mut server_sim) {
                corrections.push(correction);
            }
        }

        if let Some(correction) = host.fixed_tick(now, &mut server_sim) {
            corrections.push(correction);
        }
        for correction in corrections.drain(..) {
            predictor.apply_correction(correction);
        }
    }

    // Both sides have coasted on zero input for a while; the last
    // reconciliation replays from an authoritative base plus zero moves.
    let mut sink = Vec::new();
    clock.advance();
    predictor.fixed_tick(&clock, CLIENT_OWNER, &mut client_sim, &mut sink);

    assert!(
        predictor.last_server_tick() > Tick::new(35),
        "corrections kept flowing (last at {})",
        predictor.last_server_tick()
    );
    let error = (client_sim.mover.pos - server_sim.pos).abs();
    assert!(
        error < 1e-3,
        "client at {}, server at {}, error {error}",
        client_sim.mover.pos,
        server_sim.pos
    );
    // The server actually applied drag: 30 pushes of 0.9 each.
    assert!((server_sim.pos - 27.0).abs() < 1e-3);
}

#[test]
fn lossless_deterministic_loop_needs_no_visible_correction() {
    // Same physics on both sides and no drops: corrections confirm the
    // prediction and reconciliation never moves the client.
    let mut client_sim = ScriptedMover::new(1.0, vec![2.0; 20]);
    let mut server_sim = Mover::new(1.0);

    let mut clock = TickClock::client(TickRate::new(30).unwrap(), 0.3);
    clock.start(Tick::new(0));
    let mut predictor: Predictor<f32, f32> = Predictor::new();
    predictor.begin(clock.tick());
    let mut host: CommandHost<f32, f32> = CommandHost::new();

    let mut outbound = Vec::new();
    for step in 1..=20u32 {
        let now = Tick::new(step);
        clock.advance();
        predictor.fixed_tick(&clock, CLIENT_OWNER, &mut client_sim, &mut outbound);
        for cmd in outbound.drain(..) {
            host.receive(cmd, now, &mut server_sim);
        }
        if let Some(correction) = host.fixed_tick(now, &mut server_sim) {
            let predicted = correction.output;
            predictor.apply_correction(correction);
            // Authoritative output matches the speculative one exactly.
            let client_pos_at = client_sim.mover.pos;
            assert!(predicted <= client_pos_at + f32::EPSILON);
        }
    }

    // Server trails the client by one tick; its position is one input
    // behind.
    assert!((client_sim.mover.pos - 40.0).abs() < 1e-3);
    assert!((server_sim.pos - 38.0).abs() < 1e-3);
}
