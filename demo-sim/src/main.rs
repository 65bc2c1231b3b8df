use std::collections::HashSet;
use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dejitter::{DejitterBuffer, Timestamped};
use log::info;
use replica::{
    Blend, Command, CommandHost, CommandSim, EntityAuthority, Predictor, Quat, Transition,
    TransitionConfig, Vec3,
};
use serde::Serialize;
use tick::{EventQueue, Tick, TickClock, TickRate};

#[derive(Parser)]
#[command(name = "demo-sim", version, about = "Deterministic sync soak: predicted client, authoritative server, interpolated observer")]
struct Cli {
    /// Number of server ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// One-way link latency, in ticks.
    #[arg(long, default_value_t = 3)]
    latency_ticks: u32,
    /// Drop every Nth client command in transit.
    #[arg(long)]
    drop_every: Option<u32>,
    /// Summary output path.
    #[arg(long, default_value = "summary.json")]
    out: PathBuf,
    /// Fail if the client ends further than this from the server.
    #[arg(long, default_value_t = 1e-3)]
    max_final_divergence: f32,
}

const CLIENT_OWNER: EntityAuthority = EntityAuthority::new(false, true);
const SYNC_EVERY: u32 = 20;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let rate = TickRate::new(30).expect("30 is non-zero");
    let rtt_seconds = rate.ticks_to_seconds(cli.latency_ticks * 2);

    let mut rng = Rng::new(cli.seed);
    let script = build_script(cli.ticks, &mut rng);

    let mut server_clock = TickClock::server(rate, 0.5);
    let mut client_clock = TickClock::client(rate, 0.5);

    let mut server_tank = Tank::server();
    let mut client_tank = Tank::scripted(script);
    let mut host: CommandHost<f32, f32> = CommandHost::new();
    let mut predictor: Predictor<f32, f32> = Predictor::new();
    let mut started = false;

    let mut cmd_pipe: Pipe<Command<f32, f32>> = Pipe::new();
    let mut corr_pipe = Pipe::new();
    let mut snap_pipe: Pipe<PoseSnap> = Pipe::new();

    let mut obs_buffer: DejitterBuffer<PoseSnap> =
        DejitterBuffer::new(NonZeroUsize::new(64).expect("64 is non-zero"));
    let mut transition = Transition::new(TransitionConfig::default());
    // Gameplay events stamped with a server tick; the observer must not
    // fire them before its rendering reaches that tick.
    let mut events: EventQueue<u32> = EventQueue::new();

    // Server position per tick, for grading the observer.
    let mut truth = vec![0.0f32];
    let mut delivered_ticks: HashSet<u32> = HashSet::new();
    let mut summary = Summary::new(&cli);
    let mut outbound = Vec::new();

    // Keep stepping past the scripted ticks so in-flight commands and
    // corrections settle.
    let cooldown = cli.latency_ticks * 2 + 10;
    for step in 1..=(cli.ticks + cooldown) {
        server_clock.advance();
        let now = server_clock.tick();

        for cmd in cmd_pipe.drain_due(step) {
            delivered_ticks.insert(cmd.tick.raw());
            if let Some(correction) = host.receive(cmd, now, &mut server_tank) {
                corr_pipe.push(step + cli.latency_ticks, correction);
            }
        }
        if let Some(correction) = host.fixed_tick(now, &mut server_tank) {
            corr_pipe.push(step + cli.latency_ticks, correction);
        }
        truth.push(server_tank.pos);
        if step % 25 == 0 {
            events.schedule(now, step);
        }

        // Snapshot broadcast toward the observer: jittered, sometimes lost.
        if rng.next_u32() % 17 != 0 {
            let jitter = rng.next_u32() % 3;
            snap_pipe.push(
                step + cli.latency_ticks + jitter,
                PoseSnap::new(step, server_tank.pos),
            );
        }

        // Client side.
        if step == 1 || step % SYNC_EVERY == 0 {
            client_clock.observe_server_tick(now, rtt_seconds);
            if !started {
                predictor.begin(client_clock.tick());
                started = true;
            }
        }
        client_clock.advance();
        predictor.fixed_tick(&client_clock, CLIENT_OWNER, &mut client_tank, &mut outbound);
        for cmd in outbound.drain(..) {
            summary.commands_sent += 1;
            let dropped = cli
                .drop_every
                .is_some_and(|every| every > 0 && cmd.tick.raw() % every == 0);
            if dropped {
                summary.commands_dropped += 1;
                continue;
            }
            cmd_pipe.push(step + cli.latency_ticks, cmd);
        }
        for correction in corr_pipe.drain_due(step) {
            if let Some(predicted) = predictor.command(correction.tick) {
                let divergence = (predicted.output - correction.output).abs();
                summary.max_divergence_before_correction =
                    summary.max_divergence_before_correction.max(divergence);
            }
            if !delivered_ticks.contains(&correction.tick.raw()) {
                summary.commands_dead_reckoned += 1;
            }
            summary.corrections_applied += 1;
            predictor.apply_correction(correction);
        }

        // Observer render frame, one per tick.
        for snap in snap_pipe.drain_due(step) {
            obs_buffer.store(snap);
        }
        transition.retarget(&obs_buffer, client_clock.delay_tick(), rate);
        if let Some(sample) = transition.sample(rate.secs_per_tick()) {
            let target = transition.target_tick();
            summary.events_released += events.drain_due(target).count() as u32;
            if let Some(&actual) = truth.get(target.raw() as usize) {
                summary.grade_observer((sample.pos.x - actual).abs());
            }
        }
    }

    // One more fixed step so the last corrections get reconciled.
    client_clock.advance();
    predictor.fixed_tick(&client_clock, CLIENT_OWNER, &mut client_tank, &mut outbound);

    if predictor.last_server_tick().is_bad() {
        anyhow::bail!("no correction ever reached the client");
    }
    summary.final_divergence = (client_tank.pos - server_tank.pos).abs();
    summary.finalize();
    info!(
        "soak done: {} corrections, max divergence {:.4}, final {:.6}",
        summary.corrections_applied,
        summary.max_divergence_before_correction,
        summary.final_divergence
    );

    if summary.final_divergence > cli.max_final_divergence {
        anyhow::bail!(
            "client did not converge: final divergence {} exceeds {}",
            summary.final_divergence,
            cli.max_final_divergence
        );
    }

    let contents = serde_json::to_string_pretty(&summary).context("serialize summary")?;
    fs::write(&cli.out, contents).with_context(|| format!("write {}", cli.out.display()))?;
    Ok(())
}

/// Scripted velocity: held for a random stretch, changed, and forced to
/// zero for the last quarter so everything can settle.
fn build_script(ticks: u32, rng: &mut Rng) -> Vec<f32> {
    let mut script = Vec::with_capacity(ticks as usize);
    let active = ticks - ticks / 4;
    let mut velocity = 1.0;
    let mut hold = 10 + rng.next_u32() % 20;
    for _ in 0..active {
        if hold == 0 {
            velocity = [-2.0, -1.0, 0.0, 1.0, 2.0][(rng.next_u32() % 5) as usize];
            hold = 10 + rng.next_u32() % 20;
        }
        hold -= 1;
        script.push(velocity);
    }
    script.resize(ticks as usize, 0.0);
    script
}

/// 1D vehicle: input is velocity for the tick, output the resulting
/// position. Same integration on both sides; only dropped commands make
/// the server disagree.
struct Tank {
    pos: f32,
    script: Vec<f32>,
    cursor: usize,
}

impl Tank {
    fn server() -> Self {
        Self {
            pos: 0.0,
            script: Vec::new(),
            cursor: 0,
        }
    }

    fn scripted(script: Vec<f32>) -> Self {
        Self {
            pos: 0.0,
            script,
            cursor: 0,
        }
    }
}

impl CommandSim<f32, f32> for Tank {
    fn sample_input(&mut self) -> f32 {
        let input = self.script.get(self.cursor).copied().unwrap_or(0.0);
        self.cursor += 1;
        input
    }

    fn execute(&mut self, cmd: &Command<f32, f32>, reset: bool) -> f32 {
        if reset {
            self.pos = cmd.output;
        } else {
            self.pos += cmd.input;
        }
        self.pos
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PoseSnap {
    tick: u32,
    pos: Vec3,
    heading: Quat,
}

impl PoseSnap {
    fn new(tick: u32, x: f32) -> Self {
        Self {
            tick,
            pos: Vec3::new(x, 0.0, 0.0),
            heading: Quat::from_yaw(tick as f32 * 0.02),
        }
    }
}

impl Timestamped for PoseSnap {
    fn tick(&self) -> Tick {
        Tick::new(self.tick)
    }
}

impl Blend for PoseSnap {
    fn blend(&self, to: &Self, pos_t: f32, rot_t: f32) -> Self {
        Self {
            tick: to.tick,
            pos: self.pos.lerp(to.pos, pos_t),
            heading: self.heading.slerp(to.heading, rot_t.min(1.0)),
        }
    }
}

/// In-memory link: items come out once the step counter reaches their
/// delivery step. Same-step arrival order is unspecified, like the real
/// thing.
struct Pipe<T> {
    queue: Vec<(u32, T)>,
}

impl<T> Pipe<T> {
    fn new() -> Self {
        Self { queue: Vec::new() }
    }

    fn push(&mut self, deliver_at: u32, item: T) {
        self.queue.push((deliver_at, item));
    }

    fn drain_due(&mut self, step: u32) -> Vec<T> {
        let mut due = Vec::new();
        let mut idx = 0;
        while idx < self.queue.len() {
            if self.queue[idx].0 <= step {
                due.push(self.queue.swap_remove(idx).1);
            } else {
                idx += 1;
            }
        }
        due
    }
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    ticks: u32,
    seed: u64,
    latency_ticks: u32,
    drop_every: Option<u32>,
    commands_sent: u32,
    commands_dropped: u32,
    commands_dead_reckoned: u32,
    corrections_applied: u32,
    max_divergence_before_correction: f32,
    final_divergence: f32,
    observer_frames: u32,
    observer_avg_error: f32,
    observer_max_error: f32,
    events_released: u32,
    #[serde(skip)]
    observer_error_sum: f64,
}

impl Summary {
    fn new(cli: &Cli) -> Self {
        Self {
            ticks: cli.ticks,
            seed: cli.seed,
            latency_ticks: cli.latency_ticks,
            drop_every: cli.drop_every,
            commands_sent: 0,
            commands_dropped: 0,
            commands_dead_reckoned: 0,
            corrections_applied: 0,
            max_divergence_before_correction: 0.0,
            final_divergence: 0.0,
            observer_frames: 0,
            observer_avg_error: 0.0,
            observer_max_error: 0.0,
            events_released: 0,
            observer_error_sum: 0.0,
        }
    }

    fn grade_observer(&mut self, error: f32) {
        self.observer_frames += 1;
        self.observer_error_sum += f64::from(error);
        self.observer_max_error = self.observer_max_error.max(error);
    }

    fn finalize(&mut self) {
        if self.observer_frames > 0 {
            self.observer_avg_error =
                (self.observer_error_sum / f64::from(self.observer_frames)) as f32;
        }
    }
}
