use serde::Serialize;

use crate::models::{EntityId, PipelineKind, Stage};

/// One card as the rendering layer sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub id: EntityId,
    pub name: String,
    pub value: Option<i64>,
    pub server_stage: Stage,
    pub effective_stage: Stage,
    pub pinned: bool,
    /// A mutation for this card is in flight
    pub pending: bool,
    /// The move succeeded but the server snapshot has not echoed it yet
    pub awaiting_echo: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnView {
    pub key: &'static str,
    pub label: &'static str,
    pub color: &'static str,
    pub cards: Vec<Card>,
}

impl ColumnView {
    /// Sum of card values; saturates instead of overflowing
    pub fn total_value(&self) -> i64 {
        self.cards
            .iter()
            .filter_map(|c| c.value)
            .fold(0i64, |total, value| total.saturating_add(value))
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.cards.iter().any(|c| c.id == *id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub pipeline: PipelineKind,
    pub columns: Vec<ColumnView>,
}

impl BoardView {
    pub fn column(&self, key: &str) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.key == key)
    }

    /// Key of the column rendering `id`, if any
    pub fn column_of(&self, id: &EntityId) -> Option<&'static str> {
        self.columns.iter().find(|c| c.contains(id)).map(|c| c.key)
    }

    /// Keep only cards whose name contains `term`, ignoring case.
    ///
    /// Applied after membership is computed, so it never moves a card
    /// between columns. Totals follow the filtered cards. A blank term keeps
    /// everything.
    pub fn filtered(mut self, term: &str) -> Self {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self;
        }
        for column in &mut self.columns {
            column.cards.retain(|card| card.name.to_lowercase().contains(&term));
        }
        self
    }
}
