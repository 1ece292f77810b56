//! Drag lifecycle: validate, apply optimistically, persist, settle.
//!
//! The controller is owned by a single event loop. Backend mutations run on
//! short-lived worker threads and report back through a channel; the owner
//! applies them with [`DragTransitionController::poll`] or one of the waiting
//! variants. If the controller is dropped first, workers find the channel
//! closed and their results are discarded.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::models::{Entity, EntityId, Stage, StageTable};

use super::backend::{MutationError, StageBackend};
use super::notify::{Notifier, Severity};
use super::reconciler::Retirement;
use super::registry::Ticket;
use super::state::{BoardState, DragRejection, MoveKind, PriorState};
use super::view::BoardView;

pub const DEFAULT_MUTATION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound on one backend mutation; overdue moves roll back
    pub mutation_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mutation_timeout: DEFAULT_MUTATION_TIMEOUT,
        }
    }
}

/// Where an entity is in the drag lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionState {
    Idle,
    Dragging,
    Committing,
    /// Persisted, waiting for a snapshot to echo it
    Confirmed,
    /// Most recent failed move
    RolledBack,
}

impl TransitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionState::Idle => "idle",
            TransitionState::Dragging => "dragging",
            TransitionState::Committing => "committing",
            TransitionState::Confirmed => "confirmed",
            TransitionState::RolledBack => "rolled-back",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragOutcome {
    /// Pinned to the catch-all; nothing to persist
    Pinned,
    /// Shown optimistically; the mutation is in flight
    Dispatched(Ticket),
}

/// Result of one backend mutation, delivered to the owning event loop
#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub id: EntityId,
    pub result: Result<(), MutationError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Confirmed { id: EntityId },
    RolledBack { id: EntityId, reason: MutationError },
}

/// The single most recent failed move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMove {
    pub id: EntityId,
    pub column: &'static str,
    pub reason: MutationError,
}

#[derive(Debug)]
struct InFlight {
    id: EntityId,
    column: &'static str,
    label: &'static str,
    prior: PriorState,
}

pub struct DragTransitionController {
    state: BoardState,
    backend: Arc<dyn StageBackend>,
    notifier: Box<dyn Notifier>,
    config: ControllerConfig,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    in_flight: HashMap<Ticket, InFlight>,
    dragging: Option<EntityId>,
    hover: Option<&'static str>,
    last_failure: Option<FailedMove>,
}

impl DragTransitionController {
    pub fn new(
        table: &'static StageTable,
        backend: Arc<dyn StageBackend>,
        notifier: Box<dyn Notifier>,
        config: ControllerConfig,
    ) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            state: BoardState::new(table),
            backend,
            notifier,
            config,
            sender,
            receiver,
            in_flight: HashMap::new(),
            dragging: None,
            hover: None,
            last_failure: None,
        }
    }

    /// Fetch a fresh snapshot from the backend and reconcile against it
    pub fn refresh(&mut self) -> Result<Vec<(EntityId, Retirement)>, MutationError> {
        let entities = self.backend.fetch_entities(self.state.table().pipeline)?;
        Ok(self.install_snapshot(entities))
    }

    /// Reconcile against a snapshot fetched elsewhere
    pub fn install_snapshot(&mut self, entities: Vec<Entity>) -> Vec<(EntityId, Retirement)> {
        let retired = self.state.reconcile_snapshot(entities);
        for (id, why) in &retired {
            match why {
                Retirement::Confirmed => log::info!("Server confirmed move of '{}'; overlay retired", id),
                Retirement::Removed => log::info!("'{}' left the snapshot; overlay retired", id),
            }
        }
        retired
    }

    /// A gesture picked up a card. Returns false if the card cannot move now.
    pub fn on_drag_start(&mut self, id: &EntityId) -> bool {
        if !self.state.store().contains(id) || self.state.is_pending(id) {
            return false;
        }
        self.dragging = Some(id.clone());
        self.hover = None;
        true
    }

    /// The gesture is hovering over a column (drop highlight)
    pub fn on_drag_over(&mut self, column_key: &str) {
        self.hover = self.state.table().column(column_key).map(|c| c.key());
    }

    pub fn hovered(&self) -> Option<&'static str> {
        self.hover
    }

    /// A card was dropped on a column.
    ///
    /// Rejections are silent no-ops for the user; an unknown column is a
    /// configuration bug and is logged as such.
    pub fn on_drag_end(&mut self, id: &EntityId, column_key: &str) -> Result<DragOutcome, DragRejection> {
        if self.dragging.as_ref() == Some(id) {
            self.dragging = None;
            self.hover = None;
        }

        let accepted = match self.state.begin_drag(id, column_key, Instant::now(), self.config.mutation_timeout) {
            Ok(accepted) => accepted,
            Err(rejection) => {
                match &rejection {
                    DragRejection::UnknownColumn(key) => {
                        log::error!("No stage mapping for column '{}' on the {} board", key, self.state.table().pipeline)
                    }
                    other => log::debug!("Ignoring drop of '{}' on '{}': {}", id, column_key, other),
                }
                return Err(rejection);
            }
        };

        if self.last_failure.as_ref().map(|f| &f.id) == Some(id) {
            self.last_failure = None;
        }

        let name = self.display_name(id);
        self.notifier
            .notify(&format!("Moved {} to {}", name, accepted.to.label()), Severity::Success);

        match accepted.kind {
            MoveKind::Pinned => Ok(DragOutcome::Pinned),
            MoveKind::Persist { stage, ticket } => {
                self.in_flight.insert(
                    ticket,
                    InFlight {
                        id: id.clone(),
                        column: accepted.to.key(),
                        label: accepted.to.label(),
                        prior: accepted.prior,
                    },
                );
                self.dispatch(ticket, id.clone(), stage);
                Ok(DragOutcome::Dispatched(ticket))
            }
        }
    }

    fn dispatch(&mut self, ticket: Ticket, id: EntityId, stage: Stage) {
        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        let worker_id = id.clone();

        let spawned = thread::Builder::new()
            .name("pipeboard-mutation".to_string())
            .spawn(move || {
                let result = backend.update_entity_stage(&worker_id, &stage);
                if sender.send(Completion { ticket, id: worker_id.clone(), result }).is_err() {
                    log::debug!("Board closed before move of '{}' settled; result dropped", worker_id);
                }
            });

        if let Err(e) = spawned {
            self.settle(Completion {
                ticket,
                id,
                result: Err(MutationError::Network(format!("could not start request: {}", e))),
            });
        }
    }

    /// Apply every completion that has arrived and expire overdue moves
    pub fn poll(&mut self) -> Vec<Settled> {
        self.poll_at(Instant::now())
    }

    /// Like [`poll`](Self::poll) with an explicit clock, for deadline checks
    pub fn poll_at(&mut self, now: Instant) -> Vec<Settled> {
        let mut settled = Vec::new();
        while let Ok(completion) = self.receiver.try_recv() {
            settled.extend(self.settle(completion));
        }
        settled.extend(self.expire(now));
        settled
    }

    /// Block until at least one move settles, `limit` passes, or a deadline
    /// expires, then poll.
    pub fn wait_next(&mut self, limit: Duration) -> Vec<Settled> {
        if self.in_flight.is_empty() {
            return self.poll();
        }

        let now = Instant::now();
        let mut wait = limit;
        if let Some(deadline) = self.state.registry().next_deadline() {
            wait = wait.min(deadline.saturating_duration_since(now));
        }

        let mut settled = Vec::new();
        match self.receiver.recv_timeout(wait) {
            Ok(completion) => settled.extend(self.settle(completion)),
            Err(RecvTimeoutError::Timeout) => {}
            // The controller holds a sender, so the channel never disconnects
            Err(RecvTimeoutError::Disconnected) => {}
        }
        settled.extend(self.poll());
        settled
    }

    /// Wait until nothing is in flight or `limit` passes
    pub fn wait_idle(&mut self, limit: Duration) -> Vec<Settled> {
        let start = Instant::now();
        let mut settled = self.poll();
        while !self.in_flight.is_empty() {
            let elapsed = start.elapsed();
            if elapsed >= limit {
                break;
            }
            settled.extend(self.wait_next(limit - elapsed));
        }
        settled
    }

    fn settle(&mut self, completion: Completion) -> Option<Settled> {
        let Completion { ticket, id, result } = completion;
        let Some(flight) = self.in_flight.remove(&ticket) else {
            log::debug!("Ignoring late result for '{}' (ticket {:?} already settled)", id, ticket);
            return None;
        };

        match result {
            Ok(()) => {
                self.state.confirm_drag(&flight.id, ticket);
                log::info!("Backend accepted move of '{}' to {}", flight.id, flight.column);
                Some(Settled::Confirmed { id: flight.id })
            }
            Err(reason) => Some(self.roll_back(ticket, flight, reason)),
        }
    }

    fn expire(&mut self, now: Instant) -> Vec<Settled> {
        let overdue = self.state.registry().overdue(now);
        let mut settled = Vec::new();
        for (id, ticket) in overdue {
            match self.in_flight.remove(&ticket) {
                Some(flight) => {
                    log::warn!("Move of '{}' timed out after {:?}", id, self.config.mutation_timeout);
                    settled.push(self.roll_back(ticket, flight, MutationError::Timeout(self.config.mutation_timeout)));
                }
                None => log::warn!("Registry entry for '{}' has no matching request", id),
            }
        }
        settled
    }

    fn roll_back(&mut self, ticket: Ticket, flight: InFlight, reason: MutationError) -> Settled {
        self.state.rollback_drag(&flight.id, ticket, &flight.prior);
        log::warn!("Rolled back move of '{}' to {}: {}", flight.id, flight.column, reason);

        let name = self.display_name(&flight.id);
        self.notifier.notify(
            &format!("Failed to move {} to {}: {}", name, flight.label, reason),
            Severity::Error,
        );
        self.last_failure = Some(FailedMove {
            id: flight.id.clone(),
            column: flight.column,
            reason: reason.clone(),
        });
        Settled::RolledBack { id: flight.id, reason }
    }

    pub fn transition_state(&self, id: &EntityId) -> TransitionState {
        if self.dragging.as_ref() == Some(id) {
            TransitionState::Dragging
        } else if self.state.is_pending(id) {
            TransitionState::Committing
        } else if self.state.overlay().get(id).is_some() {
            TransitionState::Confirmed
        } else if self.last_failure.as_ref().map(|f| &f.id) == Some(id) {
            TransitionState::RolledBack
        } else {
            TransitionState::Idle
        }
    }

    pub fn last_failure(&self) -> Option<&FailedMove> {
        self.last_failure.as_ref()
    }

    /// Re-issue the most recent failed move. `None` if there is nothing to retry.
    pub fn retry_last_failure(&mut self) -> Option<Result<DragOutcome, DragRejection>> {
        let failed = self.last_failure.clone()?;
        Some(self.on_drag_end(&failed.id, failed.column))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn state(&self) -> &BoardState {
        &self.state
    }

    pub fn board(&self) -> BoardView {
        self.state.board()
    }

    fn display_name(&self, id: &EntityId) -> String {
        self.state
            .store()
            .get(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}
