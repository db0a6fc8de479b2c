//! Pipelines and their ordered stages.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};

use crate::model::now_timestamp;
use crate::{Error, Result};
use super::types::resolve;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStage {
    pub id: String,
    pub label: String,
    pub display_order: i64,
    pub metadata: serde_json::Value,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: String,
    pub label: String,
    pub display_order: i64,
    pub stages: Vec<PipelineStage>,
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageInput {
    pub label: String,
    #[serde(default)]
    pub display_order: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInput {
    pub label: String,
    #[serde(default)]
    pub display_order: Option<i64>,
    #[serde(default)]
    pub stages: Vec<StageInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelinePatch {
    pub label: Option<String>,
    pub display_order: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagePatch {
    pub label: Option<String>,
    pub display_order: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

pub struct PipelineStore<'a> {
    conn: &'a Connection,
}

impl<'a> PipelineStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========== Pipeline Operations ==========

    /// Live pipelines of a type with their live stages
    pub fn list(&self, type_ref: &str) -> Result<Vec<Pipeline>> {
        let type_id = resolve(self.conn, type_ref)?;
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT id, label, display_order, archived, created_at, updated_at
            FROM pipelines WHERE object_type_id = ?1 AND archived = 0
            ORDER BY display_order, id
            "#,
        )?;
        let pipelines = stmt
            .query_map([&type_id], row_to_pipeline)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        pipelines
            .into_iter()
            .map(|mut p| {
                p.stages = self.stages_of(&p.id)?;
                Ok(p)
            })
            .collect()
    }

    pub fn get(&self, type_ref: &str, pipeline_id: &str) -> Result<Pipeline> {
        let type_id = resolve(self.conn, type_ref)?;
        let mut pipeline = self.find(&type_id, pipeline_id)?;
        pipeline.stages = self.stages_of(&pipeline.id)?;
        Ok(pipeline)
    }

    fn find(&self, type_id: &str, pipeline_id: &str) -> Result<Pipeline> {
        self.conn
            .query_row(
                r#"
                SELECT id, label, display_order, archived, created_at, updated_at
                FROM pipelines WHERE id = ?1 AND object_type_id = ?2 AND archived = 0
                "#,
                params![pipeline_id, type_id],
                row_to_pipeline,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("pipeline", pipeline_id))
    }

    /// Create a pipeline and its stages. Ids are numeric strings.
    pub fn create(&self, type_ref: &str, input: PipelineInput) -> Result<Pipeline> {
        let type_id = resolve(self.conn, type_ref)?;
        if input.label.trim().is_empty() {
            return Err(Error::validation("pipeline label is required"));
        }
        let id = next_id(self.conn, "pipelines")?;
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO pipelines (id, object_type_id, label, display_order, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![id, type_id, input.label, input.display_order.unwrap_or(0), now],
        )?;
        for (position, stage) in input.stages.into_iter().enumerate() {
            self.insert_stage(&id, stage, position as i64)?;
        }
        tracing::debug!(object_type = %type_id, pipeline = %id, "created pipeline");
        self.get(&type_id, &id)
    }

    pub fn update(&self, type_ref: &str, pipeline_id: &str, patch: PipelinePatch) -> Result<Pipeline> {
        let type_id = resolve(self.conn, type_ref)?;
        let current = self.find(&type_id, pipeline_id)?;
        self.conn.execute(
            "UPDATE pipelines SET label = ?1, display_order = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                patch.label.unwrap_or(current.label),
                patch.display_order.unwrap_or(current.display_order),
                now_timestamp(),
                current.id,
            ],
        )?;
        self.get(&type_id, pipeline_id)
    }

    /// Archive a pipeline together with its stages
    pub fn archive(&self, type_ref: &str, pipeline_id: &str) -> Result<()> {
        let type_id = resolve(self.conn, type_ref)?;
        let current = self.find(&type_id, pipeline_id)?;
        let now = now_timestamp();
        self.conn.execute(
            "UPDATE pipelines SET archived = 1, updated_at = ?1 WHERE id = ?2",
            params![now, current.id],
        )?;
        self.conn.execute(
            "UPDATE pipeline_stages SET archived = 1, updated_at = ?1 WHERE pipeline_id = ?2",
            params![now, current.id],
        )?;
        Ok(())
    }

    // ========== Stage Operations ==========

    pub fn list_stages(&self, type_ref: &str, pipeline_id: &str) -> Result<Vec<PipelineStage>> {
        let type_id = resolve(self.conn, type_ref)?;
        let pipeline = self.find(&type_id, pipeline_id)?;
        self.stages_of(&pipeline.id)
    }

    pub fn get_stage(&self, type_ref: &str, pipeline_id: &str, stage_id: &str) -> Result<PipelineStage> {
        let type_id = resolve(self.conn, type_ref)?;
        let pipeline = self.find(&type_id, pipeline_id)?;
        self.find_stage(&pipeline.id, stage_id)
    }

    pub fn create_stage(&self, type_ref: &str, pipeline_id: &str, input: StageInput) -> Result<PipelineStage> {
        let type_id = resolve(self.conn, type_ref)?;
        let pipeline = self.find(&type_id, pipeline_id)?;
        let position: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM pipeline_stages WHERE pipeline_id = ?1",
            [&pipeline.id],
            |row| row.get(0),
        )?;
        let id = self.insert_stage(&pipeline.id, input, position)?;
        self.find_stage(&pipeline.id, &id)
    }

    pub fn update_stage(
        &self,
        type_ref: &str,
        pipeline_id: &str,
        stage_id: &str,
        patch: StagePatch,
    ) -> Result<PipelineStage> {
        let type_id = resolve(self.conn, type_ref)?;
        let pipeline = self.find(&type_id, pipeline_id)?;
        let current = self.find_stage(&pipeline.id, stage_id)?;
        let metadata = patch.metadata.unwrap_or(current.metadata);
        self.conn.execute(
            r#"
            UPDATE pipeline_stages SET label = ?1, display_order = ?2, metadata = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                patch.label.unwrap_or(current.label),
                patch.display_order.unwrap_or(current.display_order),
                serde_json::to_string(&metadata)?,
                now_timestamp(),
                current.id,
            ],
        )?;
        self.find_stage(&pipeline.id, stage_id)
    }

    pub fn archive_stage(&self, type_ref: &str, pipeline_id: &str, stage_id: &str) -> Result<()> {
        let type_id = resolve(self.conn, type_ref)?;
        let pipeline = self.find(&type_id, pipeline_id)?;
        let current = self.find_stage(&pipeline.id, stage_id)?;
        self.conn.execute(
            "UPDATE pipeline_stages SET archived = 1, updated_at = ?1 WHERE id = ?2",
            params![now_timestamp(), current.id],
        )?;
        Ok(())
    }

    fn insert_stage(&self, pipeline_id: &str, input: StageInput, position: i64) -> Result<String> {
        if input.label.trim().is_empty() {
            return Err(Error::validation("stage label is required"));
        }
        let id = next_id(self.conn, "pipeline_stages")?;
        let metadata = input
            .metadata
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        let now = now_timestamp();
        self.conn.execute(
            r#"
            INSERT INTO pipeline_stages (id, pipeline_id, label, display_order, metadata, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                id,
                pipeline_id,
                input.label,
                input.display_order.unwrap_or(position),
                serde_json::to_string(&metadata)?,
                now,
            ],
        )?;
        Ok(id)
    }

    fn stages_of(&self, pipeline_id: &str) -> Result<Vec<PipelineStage>> {
        let mut stmt = self.conn.prepare_cached(
            r#"
            SELECT id, label, display_order, metadata, archived, created_at, updated_at
            FROM pipeline_stages WHERE pipeline_id = ?1 AND archived = 0
            ORDER BY display_order, created_at, id
            "#,
        )?;
        let stages = stmt
            .query_map([pipeline_id], row_to_stage)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(stages)
    }

    fn find_stage(&self, pipeline_id: &str, stage_id: &str) -> Result<PipelineStage> {
        self.conn
            .query_row(
                r#"
                SELECT id, label, display_order, metadata, archived, created_at, updated_at
                FROM pipeline_stages WHERE id = ?1 AND pipeline_id = ?2 AND archived = 0
                "#,
                params![stage_id, pipeline_id],
                row_to_stage,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("pipeline stage", stage_id))
    }
}

/// Next numeric id for a table with text ids. Non-numeric ids count as 0.
fn next_id(conn: &Connection, table: &str) -> Result<String> {
    let next: i64 = conn.query_row(
        &format!("SELECT COALESCE(MAX(CAST(id AS INTEGER)), 0) + 1 FROM {}", table),
        [],
        |row| row.get(0),
    )?;
    Ok(next.to_string())
}

fn row_to_pipeline(row: &rusqlite::Row) -> rusqlite::Result<Pipeline> {
    Ok(Pipeline {
        id: row.get(0)?,
        label: row.get(1)?,
        display_order: row.get(2)?,
        archived: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        stages: Vec::new(),
    })
}

fn row_to_stage(row: &rusqlite::Row) -> rusqlite::Result<PipelineStage> {
    let metadata: String = row.get(3)?;
    let metadata = serde_json::from_str(&metadata).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(PipelineStage {
        id: row.get(0)?,
        label: row.get(1)?,
        display_order: row.get(2)?,
        metadata,
        archived: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    fn stage(label: &str) -> StageInput {
        StageInput {
            label: label.to_string(),
            display_order: None,
            metadata: None,
        }
    }

    #[test]
    fn test_seeded_pipelines() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let deals = session.pipelines().list("deals").unwrap();
        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].id, "default");
        assert_eq!(deals[0].stages.first().map(|s| s.id.as_str()), Some("appointmentscheduled"));
        assert_eq!(deals[0].stages.len(), 7);

        let tickets = session.pipelines().get("0-5", "0").unwrap();
        assert_eq!(tickets.label, "Support Pipeline");
        assert_eq!(tickets.stages[3].metadata["ticketState"], "CLOSED");

        assert!(session.pipelines().get("deals", "0").unwrap_err().is_not_found());
    }

    #[test]
    fn test_create_pipeline_with_stages() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let pipelines = session.pipelines();
        let created = pipelines
            .create(
                "deals",
                PipelineInput {
                    label: "Renewals".to_string(),
                    display_order: Some(1),
                    stages: vec![stage("Open"), stage("Won")],
                },
            )
            .unwrap();
        assert_eq!(created.id, "1");
        let labels: Vec<&str> = created.stages.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["Open", "Won"]);
        assert_eq!(pipelines.list("deals").unwrap().len(), 2);
    }

    #[test]
    fn test_stage_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let pipelines = session.pipelines();

        let added = pipelines.create_stage("tickets", "0", stage("Escalated")).unwrap();
        assert_eq!(added.display_order, 4);

        let renamed = pipelines
            .update_stage(
                "tickets",
                "0",
                &added.id,
                StagePatch {
                    label: Some("Escalated to L2".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.label, "Escalated to L2");

        pipelines.archive_stage("tickets", "0", &added.id).unwrap();
        assert_eq!(pipelines.list_stages("tickets", "0").unwrap().len(), 4);
        assert!(pipelines.get_stage("tickets", "0", &added.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_and_archive_pipeline() {
        let store = Store::open_in_memory().unwrap();
        let session = store.session();
        let pipelines = session.pipelines();

        let updated = pipelines
            .update(
                "deals",
                "default",
                PipelinePatch {
                    label: Some("Sales".to_string()),
                    display_order: None,
                },
            )
            .unwrap();
        assert_eq!(updated.label, "Sales");

        pipelines.archive("deals", "default").unwrap();
        assert!(pipelines.list("deals").unwrap().is_empty());
        assert!(pipelines.get("deals", "default").unwrap_err().is_not_found());
    }
}
