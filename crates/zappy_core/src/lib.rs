//! # Zappy Core
//!
//! Shared world state for the tick-synchronized Zappy server.
//!
//! ## Architecture
//!
//! ```text
//!  connection tasks                     tick task
//!  ┌────────────┐   try_push   ┌──────────────────┐   try_pop   ┌───────────┐
//!  │ handler #n │ ───────────► │ CommandIntake #n │ ──────────► │ scheduler │
//!  └────────────┘              └──────────────────┘             └─────┬─────┘
//!        │ spawn / despawn                                            │ execute
//!        ▼                                                            ▼
//!  ┌──────────────────────────── World ─────────────────────────────────────┐
//!  │  grid gate (Mutex<WorldGrid>)  ──►  EntityRegistry (RwLock)  ──► state │
//!  └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. **Lock order** - grid gate, then registry, then entity state. Always.
//! 2. **Nobody blocks the tick** - intake push and pop never wait.
//! 3. **Grid and registry agree** - an id is in a cell iff the registry says
//!    the entity stands there.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod entity;
pub mod error;
pub mod grid;
pub mod intake;
pub mod registry;
pub mod resource;
pub mod world;

pub use entity::{Entity, EntityId, EntityState};
pub use error::{WorldError, WorldResult};
pub use grid::{Cell, Orientation, Position, WorldGrid};
pub use intake::CommandIntake;
pub use registry::EntityRegistry;
pub use resource::{Inventory, Resource};
pub use world::{World, WorldStatus};

/// Default capacity of a per-entity command intake.
pub const DEFAULT_INTAKE_CAPACITY: usize = 10;

/// Capacity of the per-entity outbound reply queue.
pub const OUTBOX_CAPACITY: usize = 32;

/// Food units seeded on every cell when the grid is created.
pub const CELL_FOOD_SEED: u32 = 5;

/// Food units in a freshly spawned entity's inventory.
pub const STARTING_FOOD: u32 = 10;

/// Life units granted by one unit of food.
pub const LIFE_PER_FOOD: u32 = 126;

/// Life budget of a freshly spawned entity (ten meals).
pub const STARTING_LIFE: u32 = STARTING_FOOD * LIFE_PER_FOOD;
