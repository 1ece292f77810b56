use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::models::EntityId;

/// Identifies one accepted move. Completions carry it back so a late result
/// cannot settle a newer move on the same entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub ticket: Ticket,
    pub started: Instant,
    pub deadline: Instant,
}

/// Entities with a server-bound mutation in flight.
///
/// Membership is the lock: an id present here rejects any further drag until
/// its mutation settles or times out.
#[derive(Debug, Default)]
pub struct PendingOperationRegistry {
    entries: HashMap<EntityId, PendingEntry>,
    next_ticket: u64,
}

impl PendingOperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<&PendingEntry> {
        self.entries.get(id)
    }

    /// Lock an entity. Returns `None` if it is already locked.
    pub fn insert(&mut self, id: EntityId, now: Instant, timeout: Duration) -> Option<Ticket> {
        if self.entries.contains_key(&id) {
            return None;
        }
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.entries.insert(
            id,
            PendingEntry {
                ticket,
                started: now,
                deadline: now + timeout,
            },
        );
        Some(ticket)
    }

    /// Release the lock only if `ticket` still owns it
    pub fn release(&mut self, id: &EntityId, ticket: Ticket) -> Option<PendingEntry> {
        match self.entries.get(id) {
            Some(entry) if entry.ticket == ticket => self.entries.remove(id),
            _ => None,
        }
    }

    /// Ids whose deadline has passed, oldest ticket first
    pub fn overdue(&self, now: Instant) -> Vec<(EntityId, Ticket)> {
        let mut overdue: Vec<(EntityId, Ticket)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, entry)| (id.clone(), entry.ticket))
            .collect();
        overdue.sort_by_key(|(_, ticket)| *ticket);
        overdue
    }

    /// Earliest deadline among in-flight entries
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.deadline).min()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
