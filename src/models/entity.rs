use serde::{Deserialize, Serialize};
use std::fmt;

use super::stage::{PipelineKind, Stage};

/// Opaque entity identifier, stable across refreshes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        EntityId(id.into())
    }

    /// Generate a short random id (first 8 hex digits of a v4 UUID)
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        EntityId(uuid[..8].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        EntityId(s.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A deal or a broker as last reported by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub pipeline: PipelineKind,
    pub name: String,
    pub stage: Stage,
    pub value: Option<i64>, // Deal size in whole currency units; brokers usually have none
    pub created_ts: i64,
    pub modified_ts: i64,
}

impl Entity {
    /// Create a new entity in the pipeline's default stage
    pub fn new(pipeline: PipelineKind, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: EntityId::generate(),
            pipeline,
            name: name.into(),
            stage: Stage::from(pipeline.table().default_stage),
            value: None,
            created_ts: now,
            modified_ts: now,
        }
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = Stage::from(stage);
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = EntityId::from(id);
        self
    }

    pub fn with_value(mut self, value: Option<i64>) -> Self {
        self.value = value;
        self
    }
}
