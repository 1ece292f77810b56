use std::collections::HashMap;

use crate::models::{Entity, EntityId};

/// Last server-confirmed snapshot of a pipeline's entities.
///
/// The snapshot is only ever replaced wholesale; the board never edits an
/// entity's stage in place.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    entities: Vec<Entity>,
    index: HashMap<EntityId, usize>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(entities: Vec<Entity>) -> Self {
        let mut store = Self::new();
        store.replace(entities);
        store
    }

    /// Install a fresh snapshot, keeping server order.
    /// Duplicate ids keep the last occurrence.
    pub fn replace(&mut self, entities: Vec<Entity>) {
        let mut deduped: Vec<Entity> = Vec::with_capacity(entities.len());
        let mut index: HashMap<EntityId, usize> = HashMap::with_capacity(entities.len());

        for entity in entities {
            if let Some(&pos) = index.get(&entity.id) {
                log::warn!("Snapshot contains duplicate entity id '{}'; keeping the last one", entity.id);
                deduped[pos] = entity;
            } else {
                index.insert(entity.id.clone(), deduped.len());
                deduped.push(entity);
            }
        }

        self.entities = deduped;
        self.index = index;
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.index.get(id).map(|&pos| &self.entities[pos])
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.index.contains_key(id)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PipelineKind, Stage};

    fn deal(id: &str, stage: &str) -> Entity {
        Entity::new(PipelineKind::Deals, format!("Deal {}", id)).with_id(id).with_stage(stage)
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut store = EntityStore::from_snapshot(vec![deal("a", "prospect"), deal("b", "closing")]);
        assert_eq!(store.len(), 2);

        store.replace(vec![deal("c", "term-sheet")]);
        assert_eq!(store.len(), 1);
        assert!(!store.contains(&EntityId::from("a")));
        assert!(store.contains(&EntityId::from("c")));
    }

    #[test]
    fn test_duplicate_ids_keep_last() {
        let store = EntityStore::from_snapshot(vec![
            deal("a", "prospect"),
            deal("b", "closing"),
            deal("a", "term-sheet"),
        ]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&EntityId::from("a")).unwrap().stage, Stage::from("term-sheet"));
        // Position of the first occurrence is preserved
        assert_eq!(store.entities()[0].id, EntityId::from("a"));
    }
}
