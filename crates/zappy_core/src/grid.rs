//! # World Grid
//!
//! Fixed-size toroidal surface. Each cell holds resource counts and the ids
//! of the entities standing on it.
//!
//! ## Design
//!
//! - Cells pre-allocated once, never resized
//! - Coordinates wrap modulo width/height; nothing is ever out of range
//! - No internal locking: the owner of `&mut WorldGrid` is the only mutator

use std::collections::BTreeSet;
use std::fmt;

use crate::entity::EntityId;
use crate::error::{WorldError, WorldResult};
use crate::resource::{Inventory, Resource};
use crate::CELL_FOOD_SEED;

/// A cell coordinate. Always in bounds once it came out of the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    /// Column, `0 <= x < width`.
    pub x: u32,
    /// Row, `0 <= y < height`. Row 0 is the northern edge.
    pub y: u32,
}

impl Position {
    /// Creates a position.
    #[inline]
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Facing of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Orientation {
    /// Towards decreasing y.
    North = 1,
    /// Towards increasing x.
    #[default]
    East = 2,
    /// Towards increasing y.
    South = 3,
    /// Towards decreasing x.
    West = 4,
}

impl Orientation {
    /// Quarter turn clockwise.
    #[must_use]
    pub const fn turn_right(self) -> Self {
        match self {
            Self::North => Self::East,
            Self::East => Self::South,
            Self::South => Self::West,
            Self::West => Self::North,
        }
    }

    /// Quarter turn counter-clockwise.
    #[must_use]
    pub const fn turn_left(self) -> Self {
        match self {
            Self::North => Self::West,
            Self::West => Self::South,
            Self::South => Self::East,
            Self::East => Self::North,
        }
    }

    /// Unit step `(dx, dy)` for this facing.
    #[must_use]
    pub const fn delta(self) -> (i64, i64) {
        match self {
            Self::North => (0, -1),
            Self::East => (1, 0),
            Self::South => (0, 1),
            Self::West => (-1, 0),
        }
    }
}

/// One square of the world.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    /// Resources lying on the cell.
    pub resources: Inventory,
    /// Entities standing on the cell.
    pub occupants: BTreeSet<EntityId>,
}

/// The toroidal world surface.
#[derive(Clone, Debug)]
pub struct WorldGrid {
    width: u32,
    height: u32,
    cells: Box<[Cell]>,
}

impl WorldGrid {
    /// Creates a grid with every cell seeded with the starting food.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::InvalidDimensions`] if either side is zero.
    pub fn new(width: u32, height: u32) -> WorldResult<Self> {
        if width == 0 || height == 0 {
            return Err(WorldError::InvalidDimensions { width, height });
        }

        let seed = Cell {
            resources: Inventory::with(Resource::Food, CELL_FOOD_SEED),
            occupants: BTreeSet::new(),
        };
        let count = width as usize * height as usize;
        let cells: Vec<Cell> = (0..count).map(|_| seed.clone()).collect();

        Ok(Self {
            width,
            height,
            cells: cells.into_boxed_slice(),
        })
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

    /// Wraps signed coordinates onto the torus.
    #[must_use]
    pub fn wrap(&self, x: i64, y: i64) -> Position {
        let x = x.rem_euclid(i64::from(self.width));
        let y = y.rem_euclid(i64::from(self.height));
        // rem_euclid keeps both inside [0, side), which fits in u32.
        Position::new(x as u32, y as u32)
    }

    /// Brings any position back in bounds.
    #[inline]
    #[must_use]
    pub const fn normalize(&self, pos: Position) -> Position {
        Position::new(pos.x % self.width, pos.y % self.height)
    }

    /// The neighbouring cell in direction `facing`.
    #[must_use]
    pub fn step(&self, pos: Position, facing: Orientation) -> Position {
        let (dx, dy) = facing.delta();
        self.wrap(i64::from(pos.x) + dx, i64::from(pos.y) + dy)
    }

    #[inline]
    fn index(&self, pos: Position) -> usize {
        let pos = self.normalize(pos);
        pos.y as usize * self.width as usize + pos.x as usize
    }

    #[inline]
    fn position_of(&self, index: usize) -> Position {
        let width = self.width as usize;
        // index < width * height, so both parts fit in u32.
        Position::new((index % width) as u32, (index / width) as u32)
    }

    /// The cell at `pos`.
    #[inline]
    #[must_use]
    pub fn cell(&self, pos: Position) -> &Cell {
        &self.cells[self.index(pos)]
    }

    #[inline]
    fn cell_mut(&mut self, pos: Position) -> &mut Cell {
        let index = self.index(pos);
        &mut self.cells[index]
    }

    /// Resources lying at `pos`.
    #[inline]
    #[must_use]
    pub fn resources_at(&self, pos: Position) -> &Inventory {
        &self.cell(pos).resources
    }

    /// Entities standing at `pos`.
    #[inline]
    #[must_use]
    pub fn occupants_at(&self, pos: Position) -> &BTreeSet<EntityId> {
        &self.cell(pos).occupants
    }

    /// Puts an entity on a cell. Returns false if it was already there.
    pub fn place_entity(&mut self, id: EntityId, pos: Position) -> bool {
        self.cell_mut(pos).occupants.insert(id)
    }

    /// Takes an entity off a cell. Returns false if it was not there.
    pub fn remove_entity(&mut self, id: EntityId, pos: Position) -> bool {
        self.cell_mut(pos).occupants.remove(&id)
    }

    /// Moves an entity between cells in one step.
    ///
    /// Returns false, and changes nothing, if the entity is not on `from`.
    pub fn move_entity(&mut self, id: EntityId, from: Position, to: Position) -> bool {
        let from_index = self.index(from);
        let to_index = self.index(to);
        if !self.cells[from_index].occupants.contains(&id) {
            return false;
        }
        if from_index != to_index {
            self.cells[from_index].occupants.remove(&id);
            self.cells[to_index].occupants.insert(id);
        }
        true
    }

    /// Removes one unit of `kind` from the cell. False if there is none.
    pub fn take_resource(&mut self, pos: Position, kind: Resource) -> bool {
        self.cell_mut(pos).resources.take_one(kind)
    }

    /// Adds `amount` units of `kind` to the cell.
    pub fn add_resource(&mut self, pos: Position, kind: Resource, amount: u32) {
        self.cell_mut(pos).resources.add(kind, amount);
    }

    /// Cells with at least one occupant.
    pub fn occupied_cells(&self) -> impl Iterator<Item = (Position, &BTreeSet<EntityId>)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| !cell.occupants.is_empty())
            .map(|(index, cell)| (self.position_of(index), &cell.occupants))
    }

    /// Total number of occupant entries across all cells.
    #[must_use]
    pub fn occupant_count(&self) -> usize {
        self.cells.iter().map(|cell| cell.occupants.len()).sum()
    }
}
