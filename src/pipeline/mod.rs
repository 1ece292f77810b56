//! Stage reconciliation for the drag-and-drop pipeline boards.
//!
//! A drop moves a card instantly through an optimistic overlay on top of the
//! last server snapshot. The backend mutation runs in the background; a
//! failure rolls the card back, and a later snapshot that reports the new
//! stage retires the overlay entry. Stale snapshots never move a card back.

pub mod backend;
pub mod controller;
pub mod notify;
pub mod overlay;
pub mod reconciler;
pub mod registry;
pub mod state;
pub mod store;
pub mod view;

pub use backend::{MemoryBackend, MutationError, StageBackend};
pub use controller::{
    ControllerConfig, DragOutcome, DragTransitionController, FailedMove, Settled, TransitionState,
    DEFAULT_MUTATION_TIMEOUT,
};
pub use notify::{LogNotifier, Notification, Notifier, Severity, ToastQueue};
pub use overlay::OptimisticOverlay;
pub use reconciler::{compute_column, effective_column, effective_stage, retire_confirmed, Retirement};
pub use registry::{PendingOperationRegistry, Ticket};
pub use state::{AcceptedMove, BoardState, DragRejection, MoveKind, PriorState};
pub use store::EntityStore;
pub use view::{BoardView, Card, ColumnView};
