//! Board state and the named transitions that are allowed to change it.
//!
//! Nothing outside this module edits the overlay, the pinned set or the
//! pending registry directly. All transitions are synchronous; the only
//! suspension points (backend mutation, refresh fetch) live in the controller.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::models::{ColumnRef, Entity, EntityId, Stage, StageTable};

use super::overlay::OptimisticOverlay;
use super::reconciler::{self, Retirement};
use super::registry::{PendingOperationRegistry, Ticket};
use super::store::EntityStore;
use super::view::{BoardView, Card, ColumnView};

/// Why a drop was not turned into a move. None of these are user-facing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DragRejection {
    #[error("a move for this entity is already in flight")]
    Duplicate,

    #[error("entity is already in that column")]
    NullTransition,

    #[error("no column named '{0}'")]
    UnknownColumn(String),

    #[error("entity is not on the board")]
    UnknownEntity,
}

/// Overlay and pin membership of an entity right before a move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorState {
    pub overlay: Option<Stage>,
    pub pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveKind {
    /// Dropped on the catch-all: view-only, already complete
    Pinned,
    /// Needs `update_entity_stage(id, stage)`; settles through `ticket`
    Persist { stage: Stage, ticket: Ticket },
}

#[derive(Debug, Clone)]
pub struct AcceptedMove {
    pub id: EntityId,
    pub from: ColumnRef,
    pub to: ColumnRef,
    pub kind: MoveKind,
    pub prior: PriorState,
}

#[derive(Debug)]
pub struct BoardState {
    table: &'static StageTable,
    store: EntityStore,
    overlay: OptimisticOverlay,
    registry: PendingOperationRegistry,
}

impl BoardState {
    pub fn new(table: &'static StageTable) -> Self {
        Self {
            table,
            store: EntityStore::new(),
            overlay: OptimisticOverlay::new(),
            registry: PendingOperationRegistry::new(),
        }
    }

    pub fn with_snapshot(table: &'static StageTable, entities: Vec<Entity>) -> Self {
        let mut state = Self::new(table);
        state.store.replace(entities);
        state
    }

    /// Accept a drop and apply it optimistically.
    ///
    /// On success the board already shows the entity in `column_key`. For a
    /// `Persist` move the entity stays locked until `confirm_drag` or
    /// `rollback_drag` is called with the returned ticket.
    pub fn begin_drag(
        &mut self,
        id: &EntityId,
        column_key: &str,
        now: Instant,
        timeout: Duration,
    ) -> Result<AcceptedMove, DragRejection> {
        if self.registry.contains(id) {
            return Err(DragRejection::Duplicate);
        }
        let entity = self.store.get(id).ok_or(DragRejection::UnknownEntity)?;
        let to = self
            .table
            .column(column_key)
            .ok_or_else(|| DragRejection::UnknownColumn(column_key.to_string()))?;
        let from = reconciler::effective_column(self.table, entity, &self.overlay);
        if from == to {
            return Err(DragRejection::NullTransition);
        }

        let prior = PriorState {
            overlay: self.overlay.get(id).cloned(),
            pinned: self.overlay.is_pinned(id),
        };

        let kind = match to {
            ColumnRef::CatchAll(_) => {
                let ticket = self
                    .registry
                    .insert(id.clone(), now, timeout)
                    .ok_or(DragRejection::Duplicate)?;
                self.overlay.pin(id.clone());
                self.registry.release(id, ticket);
                MoveKind::Pinned
            }
            ColumnRef::Explicit(column) => {
                let stage = column.backend_stage();
                let ticket = self
                    .registry
                    .insert(id.clone(), now, timeout)
                    .ok_or(DragRejection::Duplicate)?;
                self.overlay.unpin(id);
                self.overlay.set(id.clone(), stage.clone());
                MoveKind::Persist { stage, ticket }
            }
        };

        log::debug!("Accepted move of '{}' from {} to {}", id, from.key(), to.key());
        Ok(AcceptedMove {
            id: id.clone(),
            from,
            to,
            kind,
            prior,
        })
    }

    /// The backend accepted the move. The overlay entry stays until a
    /// snapshot echoes it. Returns false for a stale ticket.
    pub fn confirm_drag(&mut self, id: &EntityId, ticket: Ticket) -> bool {
        self.registry.release(id, ticket).is_some()
    }

    /// The backend refused the move (or it timed out): put overlay and pin
    /// membership back as they were. Returns false for a stale ticket, in
    /// which case nothing changes.
    pub fn rollback_drag(&mut self, id: &EntityId, ticket: Ticket, prior: &PriorState) -> bool {
        if self.registry.release(id, ticket).is_none() {
            return false;
        }
        self.overlay.restore(id, prior.overlay.clone());
        self.overlay.set_pinned(id, prior.pinned);
        true
    }

    /// Install a fresh server snapshot and retire the overlay entries it confirms
    pub fn reconcile_snapshot(&mut self, entities: Vec<Entity>) -> Vec<(EntityId, Retirement)> {
        self.store.replace(entities);
        reconciler::retire_confirmed(&mut self.overlay, &self.store)
    }

    pub fn table(&self) -> &'static StageTable {
        self.table
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn overlay(&self) -> &OptimisticOverlay {
        &self.overlay
    }

    pub fn registry(&self) -> &PendingOperationRegistry {
        &self.registry
    }

    pub fn is_pending(&self, id: &EntityId) -> bool {
        self.registry.contains(id)
    }

    pub fn effective_stage(&self, id: &EntityId) -> Option<&Stage> {
        self.store
            .get(id)
            .map(|entity| reconciler::effective_stage(entity, &self.overlay))
    }

    pub fn column_of(&self, id: &EntityId) -> Option<ColumnRef> {
        self.store
            .get(id)
            .map(|entity| reconciler::effective_column(self.table, entity, &self.overlay))
    }

    /// Entities rendered in the column named `key`
    pub fn column(&self, key: &str) -> Option<Vec<&Entity>> {
        let column = self.table.column(key)?;
        Some(reconciler::compute_column(self.table, column, self.store.entities(), &self.overlay))
    }

    pub fn board(&self) -> BoardView {
        let columns = self
            .table
            .ordered()
            .map(|column| ColumnView {
                key: column.key(),
                label: column.label(),
                color: column.color(),
                cards: reconciler::compute_column(self.table, column, self.store.entities(), &self.overlay)
                    .into_iter()
                    .map(|entity| self.card(entity))
                    .collect(),
            })
            .collect();

        BoardView {
            pipeline: self.table.pipeline,
            columns,
        }
    }

    fn card(&self, entity: &Entity) -> Card {
        let pending = self.registry.contains(&entity.id);
        Card {
            id: entity.id.clone(),
            name: entity.name.clone(),
            value: entity.value,
            server_stage: entity.stage.clone(),
            effective_stage: reconciler::effective_stage(entity, &self.overlay).clone(),
            pinned: self.overlay.is_pinned(&entity.id),
            pending,
            awaiting_echo: !pending && self.overlay.get(&entity.id).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PipelineKind, BROKERS, DEALS};

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn deal(id: &str, stage: &str) -> Entity {
        Entity::new(PipelineKind::Deals, id).with_id(id).with_stage(stage)
    }

    fn deals_board() -> BoardState {
        BoardState::with_snapshot(&DEALS, vec![deal("a", "prospect"), deal("b", "closing")])
    }

    fn column_ids(state: &BoardState, key: &str) -> Vec<String> {
        state.column(key).unwrap().iter().map(|e| e.id.to_string()).collect()
    }

    fn ticket_of(accepted: &AcceptedMove) -> Ticket {
        match &accepted.kind {
            MoveKind::Persist { ticket, .. } => *ticket,
            MoveKind::Pinned => panic!("expected a persisted move"),
        }
    }

    #[test]
    fn test_begin_drag_applies_overlay_immediately() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        let accepted = state.begin_drag(&a, "initial-diligence", Instant::now(), TIMEOUT).unwrap();

        assert_eq!(accepted.from.key(), "response-received");
        assert_eq!(accepted.to.key(), "initial-diligence");
        assert_eq!(state.overlay().get(&a), Some(&Stage::from("due-diligence")));
        assert!(state.is_pending(&a));
        assert_eq!(column_ids(&state, "initial-diligence"), vec!["a"]);
        assert!(column_ids(&state, "response-received").is_empty());
    }

    #[test]
    fn test_null_transition_changes_nothing() {
        let mut state = deals_board();
        let b = EntityId::from("b");
        let result = state.begin_drag(&b, "ioi-loi", Instant::now(), TIMEOUT);

        assert_eq!(result.unwrap_err(), DragRejection::NullTransition);
        assert!(state.overlay().is_empty());
        assert!(state.registry().is_empty());
    }

    #[test]
    fn test_duplicate_rejected_while_pending() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        state.begin_drag(&a, "initial-diligence", Instant::now(), TIMEOUT).unwrap();
        let second = state.begin_drag(&a, "ioi-loi", Instant::now(), TIMEOUT);

        assert_eq!(second.unwrap_err(), DragRejection::Duplicate);
        assert_eq!(state.overlay().get(&a), Some(&Stage::from("due-diligence")));
    }

    #[test]
    fn test_unknown_column_and_entity() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        assert_eq!(
            state.begin_drag(&a, "won", Instant::now(), TIMEOUT).unwrap_err(),
            DragRejection::UnknownColumn("won".to_string())
        );
        assert_eq!(
            state
                .begin_drag(&EntityId::from("zzz"), "ioi-loi", Instant::now(), TIMEOUT)
                .unwrap_err(),
            DragRejection::UnknownEntity
        );
        assert!(state.registry().is_empty());
    }

    #[test]
    fn test_pin_to_catch_all_needs_no_backend() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        let accepted = state.begin_drag(&a, "all", Instant::now(), TIMEOUT).unwrap();

        assert_eq!(accepted.kind, MoveKind::Pinned);
        assert!(state.overlay().is_pinned(&a));
        assert!(!state.is_pending(&a));
        assert_eq!(column_ids(&state, "all"), vec!["a"]);
        assert!(column_ids(&state, "response-received").is_empty());
    }

    #[test]
    fn test_unpin_on_explicit_drop() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        state.begin_drag(&a, "all", Instant::now(), TIMEOUT).unwrap();
        let accepted = state.begin_drag(&a, "ioi-loi", Instant::now(), TIMEOUT).unwrap();

        assert!(accepted.prior.pinned);
        assert!(!state.overlay().is_pinned(&a));
        assert_eq!(column_ids(&state, "ioi-loi"), vec!["a", "b"]);
    }

    #[test]
    fn test_rollback_restores_prior_state() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        state.begin_drag(&a, "all", Instant::now(), TIMEOUT).unwrap();
        let accepted = state.begin_drag(&a, "ioi-loi", Instant::now(), TIMEOUT).unwrap();

        assert!(state.rollback_drag(&a, ticket_of(&accepted), &accepted.prior));
        assert!(state.overlay().is_pinned(&a));
        assert!(state.overlay().get(&a).is_none());
        assert!(!state.is_pending(&a));
        assert_eq!(column_ids(&state, "all"), vec!["a"]);
    }

    #[test]
    fn test_rollback_restores_unconfirmed_overlay() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        let first = state.begin_drag(&a, "initial-diligence", Instant::now(), TIMEOUT).unwrap();
        assert!(state.confirm_drag(&a, ticket_of(&first)));

        let second = state.begin_drag(&a, "ioi-loi", Instant::now(), TIMEOUT).unwrap();
        assert!(state.rollback_drag(&a, ticket_of(&second), &second.prior));
        assert_eq!(state.overlay().get(&a), Some(&Stage::from("due-diligence")));
        assert_eq!(column_ids(&state, "initial-diligence"), vec!["a"]);
    }

    #[test]
    fn test_stale_ticket_is_ignored() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        let accepted = state.begin_drag(&a, "initial-diligence", Instant::now(), TIMEOUT).unwrap();
        let stale = Ticket(ticket_of(&accepted).0 + 1);

        assert!(!state.confirm_drag(&a, stale));
        assert!(!state.rollback_drag(&a, stale, &accepted.prior));
        assert!(state.is_pending(&a));
        assert_eq!(state.overlay().get(&a), Some(&Stage::from("due-diligence")));
    }

    #[test]
    fn test_confirmed_overlay_survives_stale_refresh() {
        let mut state = deals_board();
        let a = EntityId::from("a");
        let accepted = state.begin_drag(&a, "initial-diligence", Instant::now(), TIMEOUT).unwrap();
        state.confirm_drag(&a, ticket_of(&accepted));

        let retired = state.reconcile_snapshot(vec![deal("a", "prospect"), deal("b", "closing")]);
        assert!(retired.is_empty());
        assert_eq!(column_ids(&state, "initial-diligence"), vec!["a"]);

        let retired = state.reconcile_snapshot(vec![deal("a", "due-diligence"), deal("b", "closing")]);
        assert_eq!(retired, vec![(a.clone(), Retirement::Confirmed)]);
        assert!(state.overlay().is_empty());
        assert_eq!(column_ids(&state, "initial-diligence"), vec!["a"]);
    }

    #[test]
    fn test_board_view_flags() {
        let mut state = BoardState::with_snapshot(
            &BROKERS,
            vec![
                Entity::new(PipelineKind::Brokers, "One").with_id("x").with_stage("all"),
                Entity::new(PipelineKind::Brokers, "Two").with_id("y").with_stage("closing"),
            ],
        );
        let x = EntityId::from("x");
        state.begin_drag(&x, "response-received", Instant::now(), TIMEOUT).unwrap();

        let board = state.board();
        assert_eq!(board.columns.len(), 3);
        assert_eq!(board.column_of(&x), Some("response-received"));
        let card = &board.column("response-received").unwrap().cards[0];
        assert!(card.pending);
        assert!(!card.awaiting_echo);
        assert_eq!(card.server_stage, Stage::from("all"));
        assert_eq!(card.effective_stage, Stage::from("response-received"));
    }
}
