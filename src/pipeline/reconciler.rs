//! Pure merge of the server snapshot with the optimistic overlay.
//!
//! Column membership is decided in exactly one place, [`effective_column`]:
//! a pinned entity renders in the catch-all; otherwise the overlay's pending
//! stage (or, failing that, the server stage) picks the column through the
//! pipeline's reverse mapping. Every entity therefore lands in exactly one
//! column.

use crate::models::{ColumnRef, Entity, EntityId, Stage, StageTable};

use super::overlay::OptimisticOverlay;
use super::store::EntityStore;

/// Why an overlay entry was dropped during reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retirement {
    /// The server now reports the pending stage
    Confirmed,
    /// The entity is no longer in the snapshot
    Removed,
}

/// Overlay value if present, else the server value
pub fn effective_stage<'a>(entity: &'a Entity, overlay: &'a OptimisticOverlay) -> &'a Stage {
    overlay.get(&entity.id).unwrap_or(&entity.stage)
}

/// The one column an entity renders in right now
pub fn effective_column(table: &'static StageTable, entity: &Entity, overlay: &OptimisticOverlay) -> ColumnRef {
    if overlay.is_pinned(&entity.id) {
        return table.catch_all();
    }
    table.column_for_stage(effective_stage(entity, overlay))
}

/// Entities rendered in `column`, in snapshot order
pub fn compute_column<'a>(
    table: &'static StageTable,
    column: ColumnRef,
    entities: &'a [Entity],
    overlay: &OptimisticOverlay,
) -> Vec<&'a Entity> {
    entities
        .iter()
        .filter(|entity| effective_column(table, entity, overlay) == column)
        .collect()
}

/// Drop overlay entries the fresh snapshot has caught up with.
///
/// An entry survives any number of refreshes that still report a different
/// stage; only confirmation or the entity disappearing retires it. Pins of
/// entities that disappeared are dropped too.
pub fn retire_confirmed(overlay: &mut OptimisticOverlay, store: &EntityStore) -> Vec<(EntityId, Retirement)> {
    let mut retired = Vec::new();

    overlay.retain(|id, pending| match store.get(id) {
        None => {
            retired.push((id.clone(), Retirement::Removed));
            false
        }
        Some(entity) if entity.stage == *pending => {
            retired.push((id.clone(), Retirement::Confirmed));
            false
        }
        Some(_) => true,
    });

    let vanished: Vec<EntityId> = overlay
        .pinned()
        .iter()
        .filter(|id| !store.contains(id))
        .cloned()
        .collect();
    for id in vanished {
        overlay.unpin(&id);
    }

    retired.sort_by(|a, b| a.0.cmp(&b.0));
    retired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PipelineKind, BROKERS, DEALS};

    fn deal(id: &str, stage: &str) -> Entity {
        Entity::new(PipelineKind::Deals, id).with_id(id).with_stage(stage)
    }

    fn broker(id: &str, stage: &str) -> Entity {
        Entity::new(PipelineKind::Brokers, id).with_id(id).with_stage(stage)
    }

    fn ids(entities: &[&Entity]) -> Vec<String> {
        entities.iter().map(|e| e.id.to_string()).collect()
    }

    fn column(table: &'static StageTable, key: &str) -> ColumnRef {
        table.column(key).unwrap()
    }

    #[test]
    fn test_overlay_wins_over_server() {
        let entities = vec![deal("a", "prospect")];
        let mut overlay = OptimisticOverlay::new();
        overlay.set(EntityId::from("a"), Stage::from("due-diligence"));

        let diligence = compute_column(&DEALS, column(&DEALS, "initial-diligence"), &entities, &overlay);
        let received = compute_column(&DEALS, column(&DEALS, "response-received"), &entities, &overlay);
        assert_eq!(ids(&diligence), vec!["a"]);
        assert!(received.is_empty());
    }

    #[test]
    fn test_every_entity_in_exactly_one_column() {
        let entities = vec![
            deal("a", "prospect"),
            deal("b", "closing"),
            deal("c", "closed"),
            deal("d", "term-sheet"),
        ];
        let mut overlay = OptimisticOverlay::new();
        overlay.pin(EntityId::from("d"));
        overlay.set(EntityId::from("a"), Stage::from("term-sheet"));

        for entity in &entities {
            let count = DEALS
                .ordered()
                .filter(|c| compute_column(&DEALS, *c, &entities, &overlay).iter().any(|e| e.id == entity.id))
                .count();
            assert_eq!(count, 1, "{} rendered {} times", entity.id, count);
        }
    }

    #[test]
    fn test_catch_all_membership() {
        let entities = vec![
            broker("a", "all"),
            broker("b", "closing"),
            broker("c", "response-received"),
            broker("d", "something-else"),
        ];
        let mut overlay = OptimisticOverlay::new();
        overlay.pin(EntityId::from("b"));

        let all = compute_column(&BROKERS, BROKERS.catch_all(), &entities, &overlay);
        assert_eq!(ids(&all), vec!["a", "b", "d"]);

        let closing = compute_column(&BROKERS, column(&BROKERS, "closing"), &entities, &overlay);
        assert!(closing.is_empty());
    }

    #[test]
    fn test_pin_beats_overlay() {
        let entities = vec![deal("a", "prospect")];
        let mut overlay = OptimisticOverlay::new();
        overlay.set(EntityId::from("a"), Stage::from("term-sheet"));
        overlay.pin(EntityId::from("a"));

        assert!(effective_column(&DEALS, &entities[0], &overlay).is_catch_all());
    }

    #[test]
    fn test_retire_keeps_unconfirmed_entries() {
        let mut overlay = OptimisticOverlay::new();
        overlay.set(EntityId::from("a"), Stage::from("due-diligence"));

        let stale = EntityStore::from_snapshot(vec![deal("a", "prospect")]);
        for _ in 0..3 {
            assert!(retire_confirmed(&mut overlay, &stale).is_empty());
        }
        assert_eq!(overlay.get(&EntityId::from("a")), Some(&Stage::from("due-diligence")));
    }

    #[test]
    fn test_retire_on_confirmation_and_removal() {
        let mut overlay = OptimisticOverlay::new();
        overlay.set(EntityId::from("a"), Stage::from("due-diligence"));
        overlay.set(EntityId::from("b"), Stage::from("term-sheet"));
        overlay.set(EntityId::from("c"), Stage::from("prospect"));
        overlay.pin(EntityId::from("b"));

        let fresh = EntityStore::from_snapshot(vec![deal("a", "due-diligence"), deal("c", "closing")]);
        let retired = retire_confirmed(&mut overlay, &fresh);

        assert_eq!(
            retired,
            vec![
                (EntityId::from("a"), Retirement::Confirmed),
                (EntityId::from("b"), Retirement::Removed),
            ]
        );
        assert_eq!(overlay.len(), 1);
        assert!(overlay.get(&EntityId::from("c")).is_some());
        assert!(!overlay.is_pinned(&EntityId::from("b")));
    }
}
