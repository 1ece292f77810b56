use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;

use crate::db::DbConnection;
use crate::models::{Entity, EntityId, PipelineKind, Stage};
use crate::pipeline::{MutationError, StageBackend};
use crate::repo::EntityRepo;

/// `StageBackend` over the SQLite ledger.
///
/// Each call opens its own connection, so calls are safe from the
/// controller's worker threads.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    path: PathBuf,
    latency: Duration,
    failing: HashSet<EntityId>,
}

impl SqliteBackend {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            latency: Duration::ZERO,
            failing: HashSet::new(),
        }
    }

    /// Delay every mutation, to make the optimistic phase observable
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every mutation of `id` fail with a server error
    pub fn with_failure(mut self, id: EntityId) -> Self {
        self.failing.insert(id);
        self
    }

    fn open(&self) -> Result<Connection, MutationError> {
        DbConnection::connect(&self.path)
            .map_err(|e| MutationError::Network(format!("could not reach {}: {:#}", self.path.display(), e)))
    }
}

impl StageBackend for SqliteBackend {
    fn fetch_entities(&self, pipeline: PipelineKind) -> Result<Vec<Entity>, MutationError> {
        let conn = self.open()?;
        EntityRepo::list(&conn, pipeline).map_err(|e| MutationError::Server(format!("{:#}", e)))
    }

    fn update_entity_stage(&self, id: &EntityId, stage: &Stage) -> Result<(), MutationError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        if self.failing.contains(id) {
            return Err(MutationError::Server(format!("update of '{}' refused (injected failure)", id)));
        }

        let conn = self.open()?;
        let entity = EntityRepo::get(&conn, id)
            .map_err(|e| MutationError::Server(format!("{:#}", e)))?
            .ok_or_else(|| MutationError::NotFound(format!("no entity with id '{}'", id)))?;

        let table = entity.pipeline.table();
        if !table.accepts(stage.as_str()) {
            return Err(MutationError::Validation(format!(
                "'{}' is not a valid {} stage",
                stage, entity.pipeline
            )));
        }

        match EntityRepo::update_stage(&conn, id, stage) {
            Ok(true) => Ok(()),
            Ok(false) => Err(MutationError::NotFound(format!("'{}' was deleted", id))),
            Err(e) => Err(MutationError::Server(format!("{:#}", e))),
        }
    }
}
