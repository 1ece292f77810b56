use std::collections::{HashMap, HashSet};

use crate::models::{EntityId, Stage};

/// Optimistic stage assignments layered over the server snapshot.
///
/// `pending` holds at most one target stage per entity. `pinned` holds the
/// entities the user dropped onto the catch-all column; pinning is view-only
/// and never reaches the backend.
#[derive(Debug, Default, Clone)]
pub struct OptimisticOverlay {
    pending: HashMap<EntityId, Stage>,
    pinned: HashSet<EntityId>,
}

impl OptimisticOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Stage> {
        self.pending.get(id)
    }

    /// Record a target stage, returning the entry it replaced
    pub fn set(&mut self, id: EntityId, stage: Stage) -> Option<Stage> {
        self.pending.insert(id, stage)
    }

    pub fn clear(&mut self, id: &EntityId) -> Option<Stage> {
        self.pending.remove(id)
    }

    /// Put back an entry exactly as it was before a move
    pub fn restore(&mut self, id: &EntityId, prior: Option<Stage>) {
        match prior {
            Some(stage) => {
                self.pending.insert(id.clone(), stage);
            }
            None => {
                self.pending.remove(id);
            }
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&EntityId, &Stage)> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&EntityId, &Stage) -> bool) {
        self.pending.retain(|id, stage| keep(id, stage));
    }

    pub fn is_pinned(&self, id: &EntityId) -> bool {
        self.pinned.contains(id)
    }

    /// Returns whether the id was newly pinned
    pub fn pin(&mut self, id: EntityId) -> bool {
        self.pinned.insert(id)
    }

    /// Returns whether the id was pinned
    pub fn unpin(&mut self, id: &EntityId) -> bool {
        self.pinned.remove(id)
    }

    pub fn set_pinned(&mut self, id: &EntityId, pinned: bool) {
        if pinned {
            self.pinned.insert(id.clone());
        } else {
            self.pinned.remove(id);
        }
    }

    pub fn pinned(&self) -> &HashSet<EntityId> {
        &self.pinned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_entry_per_entity() {
        let mut overlay = OptimisticOverlay::new();
        let id = EntityId::from("a");
        assert_eq!(overlay.set(id.clone(), Stage::from("due-diligence")), None);
        assert_eq!(
            overlay.set(id.clone(), Stage::from("term-sheet")),
            Some(Stage::from("due-diligence"))
        );
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay.get(&id), Some(&Stage::from("term-sheet")));
    }

    #[test]
    fn test_restore_prior_entry() {
        let mut overlay = OptimisticOverlay::new();
        let id = EntityId::from("a");
        overlay.set(id.clone(), Stage::from("term-sheet"));

        overlay.restore(&id, Some(Stage::from("prospect")));
        assert_eq!(overlay.get(&id), Some(&Stage::from("prospect")));

        overlay.restore(&id, None);
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_pin_unpin() {
        let mut overlay = OptimisticOverlay::new();
        let id = EntityId::from("a");
        assert!(overlay.pin(id.clone()));
        assert!(!overlay.pin(id.clone()));
        assert!(overlay.is_pinned(&id));
        assert!(overlay.unpin(&id));
        assert!(!overlay.unpin(&id));

        overlay.set_pinned(&id, true);
        assert!(overlay.is_pinned(&id));
        overlay.set_pinned(&id, false);
        assert!(overlay.pinned().is_empty());
    }
}
