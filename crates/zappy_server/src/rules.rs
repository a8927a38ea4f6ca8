//! # Command Rules
//!
//! The tick scheduler knows nothing about what a command *means*. It hands
//! each popped command to a [`CommandExecutor`] together with the entity and
//! the grid, and only guarantees the cadence: at most one call per entity
//! per tick, oldest command first.
//!
//! ```text
//! TickScheduler          CommandExecutor
//! ┌──────────────┐       ┌──────────────────┐
//! │ pop command  │ ────► │ execute()        │ ─► EffectReport
//! │ per entity   │ ────► │ advance_timers() │ ─► Vitality
//! └──────────────┘       └──────────────────┘
//! ```
//!
//! [`BasicRules`] is the stock implementation: movement, turning, inventory
//! and picking up / dropping resources.

use tracing::debug;
use zappy_core::{Entity, EntityState, Resource, WorldGrid, LIFE_PER_FOOD};

/// Reply sent when a command succeeded.
pub const REPLY_OK: &str = "ok";

/// Reply sent when a command failed or was not understood.
pub const REPLY_KO: &str = "ko";

/// Outcome of executing one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EffectReport {
    /// The command was understood; send this line back to the client.
    Reply(String),
    /// The command was not understood. Nothing changed.
    Unknown,
}

impl EffectReport {
    /// `Reply("ok")`.
    #[must_use]
    pub fn ok() -> Self {
        Self::Reply(REPLY_OK.to_owned())
    }

    /// `Reply("ko")`.
    #[must_use]
    pub fn ko() -> Self {
        Self::Reply(REPLY_KO.to_owned())
    }
}

/// Whether an entity survives the current tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Vitality {
    /// Keeps playing.
    #[default]
    Alive,
    /// Must be removed from the world at the end of the tick.
    Dead,
}

/// The game rules, as seen by the tick scheduler.
///
/// Called only from the tick task while it holds the grid gate, so
/// implementations may mutate `grid` and `state` freely but must not block.
pub trait CommandExecutor: Send {
    /// Applies one command to one entity.
    ///
    /// Any grid mutation must go through the [`WorldGrid`] operations so the
    /// occupant sets stay in step with `state.position`.
    fn execute(
        &mut self,
        entity: &Entity,
        state: &mut EntityState,
        grid: &mut WorldGrid,
        command: &str,
    ) -> EffectReport;

    /// Advances per-entity timers once per tick.
    fn advance_timers(&mut self, _entity: &Entity, _state: &mut EntityState) -> Vitality {
        Vitality::Alive
    }
}

/// A parsed [`BasicRules`] command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Step one cell forward.
    Advance,
    /// Quarter turn clockwise.
    Right,
    /// Quarter turn counter-clockwise.
    Left,
    /// Report carried resources.
    Inventory,
    /// Pick one unit up from the current cell.
    Take(Resource),
    /// Drop one unit onto the current cell.
    Set(Resource),
}

impl Command {
    /// Parses a command line. French and English spellings are accepted.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let argument = words.next();
        if words.next().is_some() {
            return None;
        }

        match (verb, argument) {
            ("avance" | "advance", None) => Some(Self::Advance),
            ("droite" | "right", None) => Some(Self::Right),
            ("gauche" | "left", None) => Some(Self::Left),
            ("inventaire" | "inventory", None) => Some(Self::Inventory),
            ("prend" | "take", Some(name)) => Resource::parse(name).map(Self::Take),
            ("pose" | "set", Some(name)) => Resource::parse(name).map(Self::Set),
            _ => None,
        }
    }
}

/// Stock rules: movement, turning, inventory, take/set.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicRules {
    life_decay: bool,
}

impl BasicRules {
    /// Rules without starvation.
    #[must_use]
    pub const fn new() -> Self {
        Self { life_decay: false }
    }

    /// Rules where every tick costs one life unit, food is eaten
    /// automatically when life runs out, and an entity without food dies.
    #[must_use]
    pub const fn with_life_decay() -> Self {
        Self { life_decay: true }
    }
}

impl CommandExecutor for BasicRules {
    fn execute(
        &mut self,
        entity: &Entity,
        state: &mut EntityState,
        grid: &mut WorldGrid,
        command: &str,
    ) -> EffectReport {
        let Some(command) = Command::parse(command) else {
            return EffectReport::Unknown;
        };

        match command {
            Command::Advance => {
                let from = state.position;
                let to = grid.step(from, state.orientation);
                if !grid.move_entity(entity.id(), from, to) {
                    return EffectReport::ko();
                }
                state.position = to;
                debug!(entity = entity.id().0, %from, %to, "advanced");
                EffectReport::ok()
            }
            Command::Right => {
                state.orientation = state.orientation.turn_right();
                EffectReport::ok()
            }
            Command::Left => {
                state.orientation = state.orientation.turn_left();
                EffectReport::ok()
            }
            Command::Inventory => EffectReport::Reply(state.inventory.to_string()),
            Command::Take(kind) => {
                if grid.take_resource(state.position, kind) {
                    state.inventory.add(kind, 1);
                    EffectReport::ok()
                } else {
                    EffectReport::ko()
                }
            }
            Command::Set(kind) => {
                if state.inventory.take_one(kind) {
                    grid.add_resource(state.position, kind, 1);
                    EffectReport::ok()
                } else {
                    EffectReport::ko()
                }
            }
        }
    }

    fn advance_timers(&mut self, entity: &Entity, state: &mut EntityState) -> Vitality {
        if !self.life_decay {
            return Vitality::Alive;
        }

        state.life = state.life.saturating_sub(1);
        if state.life > 0 {
            return Vitality::Alive;
        }
        if state.inventory.take_one(Resource::Food) {
            state.life = LIFE_PER_FOOD;
            debug!(entity = entity.id().0, "ate one food");
            return Vitality::Alive;
        }
        Vitality::Dead
    }
}
