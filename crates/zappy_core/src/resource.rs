//! # Resources
//!
//! Resource kinds found on the grid and carried by entities.
//! Counts live in a fixed array indexed by kind - no map, no allocation.

use std::fmt;

/// A kind of resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Resource {
    /// Food. Keeps an entity alive.
    Food = 0,
    /// Linemate stone.
    Linemate = 1,
    /// Deraumere stone.
    Deraumere = 2,
    /// Sibur stone.
    Sibur = 3,
    /// Mendiane stone.
    Mendiane = 4,
    /// Phiras stone.
    Phiras = 5,
    /// Thystame stone.
    Thystame = 6,
}

impl Resource {
    /// Number of resource kinds.
    pub const COUNT: usize = 7;

    /// Every kind, in index order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Food,
        Self::Linemate,
        Self::Deraumere,
        Self::Sibur,
        Self::Mendiane,
        Self::Phiras,
        Self::Thystame,
    ];

    /// Wire name of this resource.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Food => "nourriture",
            Self::Linemate => "linemate",
            Self::Deraumere => "deraumere",
            Self::Sibur => "sibur",
            Self::Mendiane => "mendiane",
            Self::Phiras => "phiras",
            Self::Thystame => "thystame",
        }
    }

    /// Parses a wire name. `food` is accepted as an alias of `nourriture`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name == "food" {
            return Some(Self::Food);
        }
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    #[inline]
    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resource counts, used both for cell contents and entity inventories.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Inventory {
    counts: [u32; Resource::COUNT],
}

impl Inventory {
    /// Creates an empty inventory.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            counts: [0; Resource::COUNT],
        }
    }

    /// Creates an inventory holding `amount` of a single kind.
    #[must_use]
    pub fn with(kind: Resource, amount: u32) -> Self {
        let mut inventory = Self::empty();
        inventory.counts[kind.index()] = amount;
        inventory
    }

    /// Count of a kind.
    #[inline]
    #[must_use]
    pub const fn get(&self, kind: Resource) -> u32 {
        self.counts[kind.index()]
    }

    /// Adds `amount` units of a kind, saturating.
    #[inline]
    pub fn add(&mut self, kind: Resource, amount: u32) {
        let slot = &mut self.counts[kind.index()];
        *slot = slot.saturating_add(amount);
    }

    /// Removes one unit of a kind.
    ///
    /// Returns false, and changes nothing, if none is held.
    #[inline]
    pub fn take_one(&mut self, kind: Resource) -> bool {
        let slot = &mut self.counts[kind.index()];
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    /// Total units across all kinds.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// Iterates `(kind, count)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (Resource, u32)> + '_ {
        Resource::ALL.into_iter().map(|kind| (kind, self.get(kind)))
    }
}

impl fmt::Display for Inventory {
    /// Formats as `{nourriture 10, linemate 0, ...}`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (kind, count)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{kind} {count}")?;
        }
        f.write_str("}")
    }
}
