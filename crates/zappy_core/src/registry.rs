//! # Entity Registry
//!
//! Id → entity map under a reader/writer lock.
//!
//! Readers (the tick iterating, status queries) share the lock; insert and
//! remove take it exclusively. Every call holds the lock only for the map
//! operation itself - the tick iterates over a snapshot of ids, never over
//! the live map.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::{Entity, EntityId};

/// Concurrency-safe registry of live entities.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: RwLock<BTreeMap<EntityId, Arc<Entity>>>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity. Returns false if its id is already registered.
    pub fn register(&self, entity: Arc<Entity>) -> bool {
        let mut entities = self.entities.write();
        let id = entity.id();
        let duplicate = entities.contains_key(&id);
        debug_assert!(!duplicate, "entity {id} registered twice");
        if duplicate {
            return false;
        }
        entities.insert(id, entity);
        true
    }

    /// Finds an entity by id.
    #[must_use]
    pub fn lookup(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.entities.read().get(&id).cloned()
    }

    /// Removes an entity. Returns false if it was not registered.
    pub fn remove(&self, id: EntityId) -> bool {
        self.entities.write().remove(&id).is_some()
    }

    /// True if the id is registered.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.read().contains_key(&id)
    }

    /// Ids registered at the instant of the call, ascending.
    ///
    /// Entities added or removed afterwards are not reflected.
    #[must_use]
    pub fn snapshot_ids(&self) -> Vec<EntityId> {
        self.entities.read().keys().copied().collect()
    }

    /// Number of registered entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    /// True if nobody is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }

    /// Entity count per team.
    #[must_use]
    pub fn teams(&self) -> HashMap<String, usize> {
        let entities = self.entities.read();
        let mut teams = HashMap::new();
        for entity in entities.values() {
            *teams.entry(entity.team().to_owned()).or_insert(0) += 1;
        }
        teams
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Position;
    use std::thread;
    use tokio::sync::mpsc;

    fn entity(id: u64, team: &str) -> Arc<Entity> {
        let (tx, _rx) = mpsc::channel(1);
        Arc::new(Entity::new(EntityId(id), team, Position::new(0, 0), 10, tx))
    }

    #[test]
    fn test_register_lookup_remove() {
        let registry = EntityRegistry::new();
        assert!(registry.register(entity(1, "red")));
        assert!(registry.register(entity(2, "blue")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(EntityId(1)).unwrap().team(), "red");
        assert!(registry.lookup(EntityId(3)).is_none());

        assert!(registry.remove(EntityId(1)));
        assert!(!registry.remove(EntityId(1)));
        assert!(registry.lookup(EntityId(1)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_duplicate_id_refused() {
        let registry = EntityRegistry::new();
        assert!(registry.register(entity(1, "red")));
        assert!(!registry.register(entity(1, "blue")));
        assert_eq!(registry.lookup(EntityId(1)).unwrap().team(), "red");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_id_asserts() {
        let registry = EntityRegistry::new();
        registry.register(entity(1, "red"));
        registry.register(entity(1, "blue"));
    }

    #[test]
    fn test_snapshot_is_stable() {
        let registry = EntityRegistry::new();
        for id in [5, 1, 3] {
            registry.register(entity(id, "red"));
        }

        let snapshot = registry.snapshot_ids();
        registry.remove(EntityId(3));
        registry.register(entity(9, "red"));

        // Snapshot reflects membership at the time it was taken.
        assert_eq!(snapshot, vec![EntityId(1), EntityId(3), EntityId(5)]);
        assert!(registry.lookup(snapshot[1]).is_none());
    }

    #[test]
    fn test_teams() {
        let registry = EntityRegistry::new();
        registry.register(entity(1, "red"));
        registry.register(entity(2, "red"));
        registry.register(entity(3, "blue"));

        let teams = registry.teams();
        assert_eq!(teams.get("red"), Some(&2));
        assert_eq!(teams.get("blue"), Some(&1));
    }

    #[test]
    fn test_concurrent_churn() {
        let registry = Arc::new(EntityRegistry::new());
        let writers: Vec<_> = (0..4u64)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for i in 0..250 {
                        let id = t * 1000 + i;
                        assert!(registry.register(entity(id, "red")));
                        if i % 2 == 0 {
                            assert!(registry.remove(EntityId(id)));
                        }
                    }
                })
            })
            .collect();

        let reader = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..500 {
                    for id in registry.snapshot_ids() {
                        // May have vanished since the snapshot; must not panic.
                        let _ = registry.lookup(id);
                    }
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(registry.len(), 4 * 125);
    }
}
