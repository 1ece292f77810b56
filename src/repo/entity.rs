use rusqlite::{Connection, OptionalExtension, Row};
use crate::models::{Entity, EntityId, PipelineKind, Stage};
use anyhow::{bail, Context, Result};

/// Entity repository for database operations
pub struct EntityRepo;

const SELECT_COLUMNS: &str = "SELECT id, pipeline, name, stage, value, created_ts, modified_ts FROM entities";

impl EntityRepo {
    /// Insert a new entity. The stage must be one the pipeline accepts.
    pub fn create(conn: &Connection, entity: &Entity) -> Result<()> {
        let table = entity.pipeline.table();
        if !table.accepts(entity.stage.as_str()) {
            bail!(
                "Invalid stage '{}' for {}. Valid stages: {}",
                entity.stage,
                entity.pipeline,
                table.stages.join(", ")
            );
        }

        conn.execute(
            "INSERT INTO entities (id, pipeline, name, stage, value, created_ts, modified_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                entity.id.as_str(),
                entity.pipeline.as_str(),
                entity.name,
                entity.stage.as_str(),
                entity.value,
                entity.created_ts,
                entity.modified_ts,
            ],
        )
        .with_context(|| format!("Failed to create entity '{}'", entity.id))?;

        Ok(())
    }

    /// List a pipeline's entities in creation order
    pub fn list(conn: &Connection, pipeline: PipelineKind) -> Result<Vec<Entity>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE pipeline = ?1 ORDER BY created_ts, rowid",
            SELECT_COLUMNS
        ))?;

        let rows = stmt.query_map([pipeline.as_str()], row_to_entity)?;

        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        Ok(entities)
    }

    /// Get entity by ID
    pub fn get(conn: &Connection, id: &EntityId) -> Result<Option<Entity>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_COLUMNS))?;
        let entity = stmt
            .query_row([id.as_str()], row_to_entity)
            .optional()
            .with_context(|| format!("Failed to load entity '{}'", id))?;
        Ok(entity)
    }

    /// Set an entity's stage. Returns false if no such entity exists.
    pub fn update_stage(conn: &Connection, id: &EntityId, stage: &Stage) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let updated = conn
            .execute(
                "UPDATE entities SET stage = ?1, modified_ts = ?2 WHERE id = ?3",
                rusqlite::params![stage.as_str(), now, id.as_str()],
            )
            .with_context(|| format!("Failed to update stage of '{}'", id))?;
        Ok(updated > 0)
    }

    /// Delete an entity. Returns false if no such entity exists.
    pub fn delete(conn: &Connection, id: &EntityId) -> Result<bool> {
        let deleted = conn
            .execute("DELETE FROM entities WHERE id = ?1", [id.as_str()])
            .with_context(|| format!("Failed to delete entity '{}'", id))?;
        Ok(deleted > 0)
    }
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let pipeline: String = row.get(1)?;
    let pipeline = PipelineKind::from_str(&pipeline).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown pipeline '{}'", pipeline).into(),
        )
    })?;
    let id: String = row.get(0)?;
    let stage: String = row.get(3)?;

    Ok(Entity {
        id: EntityId::new(id),
        pipeline,
        name: row.get(2)?,
        stage: Stage::new(stage),
        value: row.get(4)?,
        created_ts: row.get(5)?,
        modified_ts: row.get(6)?,
    })
}
