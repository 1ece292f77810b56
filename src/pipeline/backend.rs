use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use thiserror::Error;

use crate::models::{Entity, EntityId, PipelineKind, Stage};

/// Why a stage mutation (or refresh) did not go through.
///
/// The `Display` text is what the user sees in the failure notification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rejected by server: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// The persistence backend the board talks to.
///
/// Calls block; the controller runs mutations on worker threads so the owner
/// of the board never waits on them.
pub trait StageBackend: Send + Sync {
    fn fetch_entities(&self, pipeline: PipelineKind) -> Result<Vec<Entity>, MutationError>;

    fn update_entity_stage(&self, id: &EntityId, stage: &Stage) -> Result<(), MutationError>;
}

/// In-memory backend with injectable latency and failures.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entities: Mutex<Vec<Entity>>,
    failing: Mutex<HashMap<EntityId, MutationError>>,
    latency: Mutex<Duration>,
    calls: Mutex<Vec<(EntityId, Stage)>>,
    lagging: Mutex<HashSet<EntityId>>,
    held: Mutex<HashMap<EntityId, Stage>>,
}

impl MemoryBackend {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self {
            entities: Mutex::new(entities),
            ..Self::default()
        }
    }

    /// Every `update_entity_stage` for `id` fails with `error`
    pub fn fail_for(&self, id: &EntityId, error: MutationError) {
        lock(&self.failing).insert(id.clone(), error);
    }

    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
    }

    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    /// Accept updates for `id` but keep reporting its old stage on fetch,
    /// like a read replica that has not caught up yet.
    pub fn hold_echo(&self, id: &EntityId) {
        lock(&self.lagging).insert(id.clone());
    }

    /// Stop lagging and apply the last held update for `id`
    pub fn release_echo(&self, id: &EntityId) {
        lock(&self.lagging).remove(id);
        // Drop the `held` guard before `set_stage` takes `entities`
        let held = lock(&self.held).remove(id);
        if let Some(stage) = held {
            self.set_stage(id, &stage);
        }
    }

    /// Every update call received so far, in order
    pub fn calls(&self) -> Vec<(EntityId, Stage)> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, id: &EntityId) -> usize {
        lock(&self.calls).iter().filter(|(called, _)| called == id).count()
    }

    /// Server-side stage change made by someone else
    pub fn set_stage(&self, id: &EntityId, stage: &Stage) {
        if let Some(entity) = lock(&self.entities).iter_mut().find(|e| e.id == *id) {
            entity.stage = stage.clone();
        }
    }

    pub fn remove(&self, id: &EntityId) {
        lock(&self.entities).retain(|e| e.id != *id);
    }
}

impl StageBackend for MemoryBackend {
    fn fetch_entities(&self, pipeline: PipelineKind) -> Result<Vec<Entity>, MutationError> {
        Ok(lock(&self.entities)
            .iter()
            .filter(|e| e.pipeline == pipeline)
            .cloned()
            .collect())
    }

    fn update_entity_stage(&self, id: &EntityId, stage: &Stage) -> Result<(), MutationError> {
        lock(&self.calls).push((id.clone(), stage.clone()));

        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        if let Some(error) = lock(&self.failing).get(id) {
            return Err(error.clone());
        }

        let mut entities = lock(&self.entities);
        let entity = entities
            .iter_mut()
            .find(|e| e.id == *id)
            .ok_or_else(|| MutationError::NotFound(format!("no entity with id '{}'", id)))?;

        if lock(&self.lagging).contains(id) {
            lock(&self.held).insert(id.clone(), stage.clone());
        } else {
            entity.stage = stage.clone();
            entity.modified_ts = chrono::Utc::now().timestamp();
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn deal(id: &str, stage: &str) -> Entity {
        Entity::new(PipelineKind::Deals, id).with_id(id).with_stage(stage)
    }

    #[test]
    fn test_held_echo_applies_on_release() {
        let backend = MemoryBackend::new(vec![deal("a", "prospect")]);
        let a = EntityId::from("a");
        backend.hold_echo(&a);
        backend.update_entity_stage(&a, &Stage::from("term-sheet")).unwrap();
        assert_eq!(backend.fetch_entities(PipelineKind::Deals).unwrap()[0].stage, Stage::from("prospect"));

        backend.release_echo(&a);
        assert_eq!(backend.fetch_entities(PipelineKind::Deals).unwrap()[0].stage, Stage::from("term-sheet"));
    }

    #[test]
    fn test_release_echo_races_with_updates() {
        let backend = Arc::new(MemoryBackend::new(vec![deal("a", "prospect")]));
        let a = EntityId::from("a");

        let worker = {
            let backend = Arc::clone(&backend);
            let a = a.clone();
            std::thread::spawn(move || {
                for i in 0..2000 {
                    let stage = if i % 2 == 0 { "term-sheet" } else { "closing" };
                    backend.update_entity_stage(&a, &Stage::from(stage)).unwrap();
                }
            })
        };
        for _ in 0..2000 {
            backend.hold_echo(&a);
            backend.release_echo(&a);
        }
        worker.join().unwrap();
        assert_eq!(backend.calls_for(&a), 2000);
    }
}
