//! The deterministic entity registry (C1): entity→zone and
//! zone→entities views kept consistent under one lock, with a sorted
//! snapshot rebuilt only when dirty.

use std::collections::HashMap;
use std::sync::Mutex;

use warden_core::id::{EntityHandle, ZoneId};

struct Inner {
    entity_zone: HashMap<EntityHandle, ZoneId>,
    zone_entities: HashMap<ZoneId, Vec<EntityHandle>>,
    insertion_order: Vec<EntityHandle>,
    sorted_snapshot: Vec<EntityHandle>,
    dirty: bool,
}

/// Tracks which entities are registered in which zone, and exposes a
/// sorted-ascending snapshot for deterministic iteration. All three
/// views are kept consistent under a single mutex; none holds a
/// back-reference to a caller.
pub struct EntityRegistry {
    inner: Mutex<Inner>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entity_zone: HashMap::new(),
                zone_entities: HashMap::new(),
                insertion_order: Vec::new(),
                sorted_snapshot: Vec::new(),
                dirty: false,
            }),
        }
    }

    /// Register `entity` into `zone`. Returns `false` (idempotent-no-op)
    /// if either id is invalid or the entity is already registered.
    pub fn register(&self, entity: EntityHandle, zone: ZoneId) -> bool {
        if !entity.is_valid() || !zone.is_valid() {
            return false;
        }
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if inner.entity_zone.contains_key(&entity) {
            return false;
        }
        inner.entity_zone.insert(entity, zone);
        inner.zone_entities.entry(zone).or_default().push(entity);
        inner.insertion_order.push(entity);
        inner.dirty = true;
        true
    }

    /// Remove `entity` from all three views. Returns `false` if it was
    /// not registered.
    pub fn unregister(&self, entity: EntityHandle) -> bool {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        let Some(zone) = inner.entity_zone.remove(&entity) else {
            return false;
        };
        if let Some(list) = inner.zone_entities.get_mut(&zone) {
            list.retain(|&e| e != entity);
            if list.is_empty() {
                inner.zone_entities.remove(&zone);
            }
        }
        inner.insertion_order.retain(|&e| e != entity);
        inner.dirty = true;
        true
    }

    /// Remove every entity registered in `zone`, dropping the zone's
    /// bucket entirely.
    pub fn despawn_zone(&self, zone: ZoneId) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        let Some(entities) = inner.zone_entities.remove(&zone) else {
            return;
        };
        for entity in &entities {
            inner.entity_zone.remove(entity);
        }
        inner.insertion_order.retain(|e| !entities.contains(e));
        inner.dirty = true;
    }

    /// Empty every view.
    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        inner.entity_zone.clear();
        inner.zone_entities.clear();
        inner.insertion_order.clear();
        inner.sorted_snapshot.clear();
        inner.dirty = false;
    }

    /// The zone an entity is currently registered in, if any.
    pub fn zone_of(&self, entity: EntityHandle) -> Option<ZoneId> {
        self.inner
            .lock()
            .expect("registry mutex poisoned")
            .entity_zone
            .get(&entity)
            .copied()
    }

    /// Number of entities currently registered.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("registry mutex poisoned").entity_zone.len()
    }

    /// Whether the registry is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every registered entity, sorted ascending by
    /// handle value. Rebuilt only when the dirty bit has been set
    /// since the last snapshot.
    pub fn sorted_snapshot(&self) -> Vec<EntityHandle> {
        let mut inner = self.inner.lock().expect("registry mutex poisoned");
        if inner.dirty {
            inner.sorted_snapshot = inner.insertion_order.clone();
            inner.sorted_snapshot.sort();
            inner.dirty = false;
        }
        inner.sorted_snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_is_idempotent_false_on_duplicate() {
        let reg = EntityRegistry::new();
        assert!(reg.register(EntityHandle(1), ZoneId(1)));
        assert!(!reg.register(EntityHandle(1), ZoneId(2)));
        assert_eq!(reg.zone_of(EntityHandle(1)), Some(ZoneId(1)));
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let reg = EntityRegistry::new();
        assert!(!reg.register(EntityHandle(0), ZoneId(1)));
        assert!(!reg.register(EntityHandle(1), ZoneId(0)));
    }

    #[test]
    fn snapshot_is_sorted_ascending() {
        let reg = EntityRegistry::new();
        for e in [5, 1, 3, 2, 4] {
            reg.register(EntityHandle(e), ZoneId(1));
        }
        assert_eq!(
            reg.sorted_snapshot(),
            vec![1, 2, 3, 4, 5].into_iter().map(EntityHandle).collect::<Vec<_>>()
        );
    }

    #[test]
    fn unregister_removes_from_all_views() {
        let reg = EntityRegistry::new();
        reg.register(EntityHandle(1), ZoneId(1));
        reg.register(EntityHandle(2), ZoneId(1));
        assert!(reg.unregister(EntityHandle(1)));
        assert_eq!(reg.zone_of(EntityHandle(1)), None);
        assert_eq!(reg.sorted_snapshot(), vec![EntityHandle(2)]);
        assert!(!reg.unregister(EntityHandle(1)));
    }

    #[test]
    fn despawn_zone_removes_all_members() {
        let reg = EntityRegistry::new();
        reg.register(EntityHandle(1), ZoneId(1));
        reg.register(EntityHandle(2), ZoneId(1));
        reg.register(EntityHandle(3), ZoneId(2));
        reg.despawn_zone(ZoneId(1));
        assert_eq!(reg.sorted_snapshot(), vec![EntityHandle(3)]);
        assert_eq!(reg.zone_of(EntityHandle(1)), None);
    }

    #[test]
    fn clear_all_empties_everything() {
        let reg = EntityRegistry::new();
        reg.register(EntityHandle(1), ZoneId(1));
        reg.clear_all();
        assert!(reg.is_empty());
        assert!(reg.sorted_snapshot().is_empty());
    }

    #[test]
    fn snapshot_cached_until_dirtied() {
        let reg = EntityRegistry::new();
        reg.register(EntityHandle(1), ZoneId(1));
        let first = reg.sorted_snapshot();
        let second = reg.sorted_snapshot();
        assert_eq!(first, second);
        reg.register(EntityHandle(2), ZoneId(1));
        assert_eq!(reg.sorted_snapshot().len(), 2);
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn snapshot_is_always_sorted_ascending_after_arbitrary_churn(
            handles in prop::collection::vec(1i64..50, 0..40),
        ) {
            let reg = EntityRegistry::new();
            for (i, h) in handles.iter().enumerate() {
                if i % 5 == 4 {
                    reg.unregister(EntityHandle(*h));
                } else {
                    reg.register(EntityHandle(*h), ZoneId(1));
                }
            }
            let snapshot = reg.sorted_snapshot();
            let mut sorted = snapshot.clone();
            sorted.sort();
            prop_assert_eq!(snapshot, sorted);
        }
    }
}
