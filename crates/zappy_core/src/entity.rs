//! # Entities
//!
//! A connected participant: immutable identity, mutable game state, a
//! command intake fed by its connection, an outbound queue read by it and
//! a termination flag the connection watches.

use std::fmt;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};

use crate::grid::{Orientation, Position};
use crate::intake::CommandIntake;
use crate::resource::{Inventory, Resource};
use crate::{STARTING_FOOD, STARTING_LIFE};

/// Unique entity identifier. Never reused within a server run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mutable game state of an entity.
///
/// Written only by whoever holds the grid gate, so `position` always
/// matches the grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityState {
    /// Current cell.
    pub position: Position,
    /// Current facing.
    pub orientation: Orientation,
    /// Carried resources.
    pub inventory: Inventory,
    /// Remaining life units.
    pub life: u32,
}

impl EntityState {
    /// Starting state at `position`: facing east, ten food, full life.
    #[must_use]
    pub fn spawn(position: Position) -> Self {
        Self {
            position,
            orientation: Orientation::East,
            inventory: Inventory::with(Resource::Food, STARTING_FOOD),
            life: STARTING_LIFE,
        }
    }
}

/// A registered participant.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    team: String,
    intake: CommandIntake,
    state: Mutex<EntityState>,
    outbox: mpsc::Sender<String>,
    terminated: watch::Sender<bool>,
}

impl Entity {
    /// Creates an entity in its starting state.
    #[must_use]
    pub fn new(
        id: EntityId,
        team: impl Into<String>,
        position: Position,
        intake_capacity: usize,
        outbox: mpsc::Sender<String>,
    ) -> Self {
        let (terminated, _) = watch::channel(false);
        Self {
            id,
            team: team.into(),
            intake: CommandIntake::new(intake_capacity),
            state: Mutex::new(EntityState::spawn(position)),
            outbox,
            terminated,
        }
    }

    /// Spawn cell for an id: `(id mod width, id mod height)`.
    #[must_use]
    pub fn spawn_position(id: EntityId, width: u32, height: u32) -> Position {
        // Both remainders are below a u32 bound.
        Position::new(
            (id.0 % u64::from(width.max(1))) as u32,
            (id.0 % u64::from(height.max(1))) as u32,
        )
    }

    /// The entity's id.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> EntityId {
        self.id
    }

    /// Team label given at handshake.
    #[inline]
    #[must_use]
    pub fn team(&self) -> &str {
        &self.team
    }

    /// Pending commands.
    #[inline]
    #[must_use]
    pub const fn intake(&self) -> &CommandIntake {
        &self.intake
    }

    /// Locks the mutable state.
    #[inline]
    pub fn state(&self) -> MutexGuard<'_, EntityState> {
        self.state.lock()
    }

    /// Copy of the current position.
    #[must_use]
    pub fn position(&self) -> Position {
        self.state.lock().position
    }

    /// Queues a line for the client without waiting.
    ///
    /// Returns false if the outbound queue is full or the handler is gone;
    /// the line is dropped.
    pub fn notify(&self, line: impl Into<String>) -> bool {
        self.outbox.try_send(line.into()).is_ok()
    }

    /// Marks the entity as finished and wakes its connection handler.
    ///
    /// Independent of the outbound queue: lands even when the queue is full.
    pub fn terminate(&self) {
        self.terminated.send_replace(true);
    }

    /// Whether [`terminate`](Self::terminate) has been called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    /// Receiver that changes to `true` on termination.
    ///
    /// A fresh receiver has already seen the current value; check
    /// [`is_terminated`](Self::is_terminated) before waiting on it.
    #[must_use]
    pub fn termination(&self) -> watch::Receiver<bool> {
        self.terminated.subscribe()
    }
}
