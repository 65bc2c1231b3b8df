//! Per-role tick clock.

use log::debug;

use crate::{Tick, TickRate};

/// Which side of the simulation this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

/// Estimated tick state for one simulation role.
///
/// The server's clock is the authority: it advances once per fixed step and
/// its tick is broadcast to clients. A client's clock chases that broadcast,
/// running *ahead* of the server by roughly one RTT so that commands stamped
/// with the client's tick arrive just in time to be executed.
///
/// One clock exists per role per process; it is constructed explicitly and
/// passed by reference to whatever needs it.
#[derive(Debug, Clone)]
pub struct TickClock {
    role: Role,
    rate: TickRate,
    tick: Tick,
    server_tick: Tick,
    rtt_seconds: f32,
    tick_difference: u32,
    /// Maximum render/rollback delay, in ticks.
    delay: u32,
    delay_tick: Tick,
}

impl TickClock {
    /// Creates the authoritative server clock.
    ///
    /// `max_delay_seconds` bounds how far in the past remote observers render
    /// and how far back lag-compensated queries may rewind (full RTT, so
    /// ~0.3s covers most connections).
    #[must_use]
    pub fn server(rate: TickRate, max_delay_seconds: f32) -> Self {
        Self::new(Role::Server, rate, max_delay_seconds)
    }

    /// Creates a client clock. It reports [`Tick::BAD`] until either
    /// [`start`](Self::start) or [`observe_server_tick`](Self::observe_server_tick)
    /// seeds it.
    #[must_use]
    pub fn client(rate: TickRate, max_delay_seconds: f32) -> Self {
        Self::new(Role::Client, rate, max_delay_seconds)
    }

    fn new(role: Role, rate: TickRate, max_delay_seconds: f32) -> Self {
        Self {
            role,
            rate,
            tick: Tick::BAD,
            server_tick: Tick::BAD,
            rtt_seconds: 0.0,
            tick_difference: 0,
            delay: rate.seconds_to_ticks(max_delay_seconds),
            delay_tick: Tick::BAD,
        }
    }

    /// Seeds a joining client from the server's last known tick.
    ///
    /// Not exactly accurate, but not far behind either; the first tick
    /// broadcast re-bases it properly.
    pub fn start(&mut self, server_tick: Tick) {
        self.tick = server_tick;
        self.server_tick = server_tick;
    }

    /// Advances the clock by one fixed step.
    ///
    /// Must run before any entity samples the new tick within the step.
    pub fn advance(&mut self) {
        self.tick = self.tick.next();
        self.delay_tick = self.tick.delayed_by(self.delay);
        if self.role == Role::Server {
            self.server_tick = self.tick;
        }
    }

    /// Client-side handler for the server's tick broadcast.
    ///
    /// Records the measured round-trip time and re-bases the local tick to
    /// `server_tick + seconds_to_ticks(rtt) + 1`: half the RTT has already
    /// passed since the server stamped the message, and the other half is
    /// what a command sent now needs to get back. Ignored on the server.
    pub fn observe_server_tick(&mut self, server_tick: Tick, rtt_seconds: f32) {
        if self.role == Role::Server {
            return;
        }

        self.server_tick = server_tick;
        self.rtt_seconds = rtt_seconds;
        self.tick_difference = self.rate.seconds_to_ticks(rtt_seconds) + 1;

        let rebased = server_tick.advance_by(self.tick_difference);
        if rebased != self.tick {
            debug!(
                "clock rebase: local {} -> {} (server {}, rtt {:.3}s)",
                self.tick, rebased, server_tick, rtt_seconds
            );
        }
        self.tick = rebased;
        self.delay_tick = self.tick.delayed_by(self.delay);
    }

    /// Current estimated tick for this role.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Last tick known to have been produced by the server.
    #[must_use]
    pub const fn server_tick(&self) -> Tick {
        self.server_tick
    }

    /// Target render tick for interpolating non-authoritative observers:
    /// `tick - delay`, clamped to [`Tick::BAD`] while too young.
    #[must_use]
    pub const fn delay_tick(&self) -> Tick {
        self.delay_tick
    }

    /// Configured maximum delay, in ticks.
    #[must_use]
    pub const fn delay(&self) -> u32 {
        self.delay
    }

    /// Last measured round-trip time, in seconds.
    #[must_use]
    pub const fn rtt_seconds(&self) -> f32 {
        self.rtt_seconds
    }

    /// How many ticks ahead of the server this client runs.
    #[must_use]
    pub const fn tick_difference(&self) -> u32 {
        self.tick_difference
    }

    /// The clock's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// `true` for the authoritative server clock.
    #[must_use]
    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    /// The fixed step rate this clock runs at.
    #[must_use]
    pub const fn rate(&self) -> TickRate {
        self.rate
    }
}
