//! # World
//!
//! The grid and the registry, kept in agreement.
//!
//! ## Design
//!
//! The grid sits behind a single gate (`Mutex<WorldGrid>`). The tick holds
//! the gate for a whole tick; connection handlers take it only to place or
//! evict their own entity. Under the gate the registry is updated too, so
//! nobody holding the gate ever sees an entity in one structure and not
//! the other.
//!
//! Lock order: gate → registry → entity state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::debug;

use crate::entity::{Entity, EntityId};
use crate::error::{WorldError, WorldResult};
use crate::grid::{Position, WorldGrid};
use crate::registry::EntityRegistry;

/// Point-in-time summary for status logging.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorldStatus {
    /// Registered entities.
    pub entities: usize,
    /// Distinct teams among them.
    pub teams: usize,
}

/// Shared world state.
#[derive(Debug)]
pub struct World {
    width: u32,
    height: u32,
    intake_capacity: usize,
    grid: Mutex<WorldGrid>,
    registry: EntityRegistry,
    tick: AtomicU64,
}

impl World {
    /// Creates a world around a freshly seeded grid.
    #[must_use]
    pub fn new(grid: WorldGrid, intake_capacity: usize) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            intake_capacity,
            grid: Mutex::new(grid),
            registry: EntityRegistry::new(),
            tick: AtomicU64::new(0),
        }
    }

    /// Grid width.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// The entity registry.
    #[inline]
    #[must_use]
    pub const fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Number of the last completed tick; 0 before the first.
    #[inline]
    #[must_use]
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    /// Publishes the number of the tick that just completed.
    #[inline]
    pub fn set_tick(&self, tick: u64) {
        self.tick.store(tick, Ordering::Release);
    }

    /// Takes the grid gate.
    pub fn lock_grid(&self) -> MutexGuard<'_, WorldGrid> {
        self.grid.lock()
    }

    /// Creates an entity at its spawn cell and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateEntity`] if the id is taken; the grid
    /// is left untouched.
    pub fn spawn(
        &self,
        id: EntityId,
        team: &str,
        outbox: mpsc::Sender<String>,
    ) -> WorldResult<Arc<Entity>> {
        let position = Entity::spawn_position(id, self.width, self.height);
        let entity = Arc::new(Entity::new(id, team, position, self.intake_capacity, outbox));

        let mut grid = self.grid.lock();
        if self.registry.contains(id) || !self.registry.register(Arc::clone(&entity)) {
            return Err(WorldError::DuplicateEntity(id));
        }
        grid.place_entity(id, position);
        drop(grid);

        debug!(entity = id.0, team, %position, "entity spawned");
        Ok(entity)
    }

    /// Evicts an entity from registry and grid.
    ///
    /// Returns false if it was already gone.
    pub fn despawn(&self, id: EntityId) -> bool {
        let mut grid = self.grid.lock();
        self.despawn_locked(&mut grid, id)
    }

    /// [`World::despawn`] for a caller already holding the grid gate.
    pub fn despawn_locked(&self, grid: &mut WorldGrid, id: EntityId) -> bool {
        let Some(entity) = self.registry.lookup(id) else {
            return false;
        };
        let position = entity.position();
        self.registry.remove(id);
        let was_placed = grid.remove_entity(id, position);
        debug_assert!(was_placed, "entity {id} missing from cell {position}");

        debug!(entity = id.0, %position, "entity despawned");
        true
    }

    /// Registered entity count and team count.
    #[must_use]
    pub fn status(&self) -> WorldStatus {
        let teams = self.registry.teams();
        WorldStatus {
            entities: teams.values().sum(),
            teams: teams.len(),
        }
    }

    /// Verifies that grid occupancy and registry positions agree.
    ///
    /// # Errors
    ///
    /// Returns the first disagreement found.
    pub fn check_consistency(&self) -> WorldResult<()> {
        let grid = self.grid.lock();
        Self::check_grid(&grid, &self.registry)
    }

    /// [`World::check_consistency`] for a caller already holding the gate.
    ///
    /// # Errors
    ///
    /// Returns the first disagreement found.
    pub fn check_grid(grid: &WorldGrid, registry: &EntityRegistry) -> WorldResult<()> {
        for (position, occupants) in grid.occupied_cells() {
            for &id in occupants {
                if !registry.contains(id) {
                    return Err(WorldError::DanglingOccupant { id, position });
                }
            }
        }

        for id in registry.snapshot_ids() {
            let Some(entity) = registry.lookup(id) else {
                continue;
            };
            let recorded = entity.position();
            let occupied: Vec<Position> = grid
                .occupied_cells()
                .filter(|(_, occupants)| occupants.contains(&id))
                .map(|(position, _)| position)
                .collect();
            if occupied != [recorded] {
                return Err(WorldError::InconsistentOccupancy {
                    id,
                    recorded,
                    occupied,
                });
            }
        }

        Ok(())
    }
}
