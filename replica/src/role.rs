//! Per-entity authority predicates.

use tick::{Tick, TickClock};

/// This process's relationship to one entity.
///
/// Every synchronized entity is seen from one of three perspectives, and
/// which loop runs for it (prediction, authority execution, or
/// interpolation) follows from these two flags alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityAuthority {
    /// This process controls the entity (full or partial authority).
    pub owned: bool,
    /// This process is the server.
    pub server: bool,
}

impl EntityAuthority {
    #[must_use]
    pub const fn new(server: bool, owned: bool) -> Self {
        Self { owned, server }
    }

    /// Runs the client command loop: samples input and executes
    /// speculatively. True for the owning client and for host-owned
    /// entities.
    #[must_use]
    pub const fn is_predicting(self) -> bool {
        self.owned
    }

    /// Owns the entity but is not the server: must send commands, keep
    /// history, and reconcile on correction.
    #[must_use]
    pub const fn is_client_only(self) -> bool {
        self.owned && !self.server
    }

    /// Server process viewing a remotely-owned entity: runs the authority
    /// command loop and rollback queries.
    #[must_use]
    pub const fn is_server_view(self) -> bool {
        self.server && !self.owned
    }

    /// Neither owns nor serves: a pure interpolation observer.
    #[must_use]
    pub const fn is_remote_view(self) -> bool {
        !self.server && !self.owned
    }

    /// The entity's current reference tick.
    ///
    /// A predicting owner is *at* the clock tick; the server trails a
    /// remotely-owned entity by one tick (it executes the command for
    /// `tick - 1`); a remote observer sits wherever its interpolation
    /// bracket's upper snapshot is.
    #[must_use]
    pub fn reference_tick(self, clock: &TickClock, bracket_to: Tick) -> Tick {
        if self.is_predicting() {
            clock.tick()
        } else if self.server {
            clock.tick().prev()
        } else {
            bracket_to
        }
    }
}
