//! # World Error Types
//!
//! All errors that can occur while mutating shared world state.

use thiserror::Error;

use crate::entity::EntityId;
use crate::grid::Position;

/// Errors that can occur in the world core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// An entity with this id is already registered.
    #[error("entity {0} is already registered")]
    DuplicateEntity(EntityId),

    /// Grid and registry disagree about where an entity stands.
    #[error("entity {id} recorded at {recorded} but occupies {occupied:?}")]
    InconsistentOccupancy {
        /// The entity.
        id: EntityId,
        /// Position stored in the entity state.
        recorded: Position,
        /// Cells whose occupant set contains the id.
        occupied: Vec<Position>,
    },

    /// A cell lists an id that the registry does not know.
    #[error("cell {position} holds unregistered entity {id}")]
    DanglingOccupant {
        /// The unknown id.
        id: EntityId,
        /// The cell holding it.
        position: Position,
    },

    /// Grid dimensions must be positive.
    #[error("invalid grid dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Result type for world operations.
pub type WorldResult<T> = Result<T, WorldError>;
