use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime, to_i64, to_u64},
    models::SyncCycleRecord,
};
use crate::models::ProjectId;

fn row_to_cycle(row: &Row) -> Result<SyncCycleRecord> {
    let started_at: String = row.get("started_at")?;
    let finished_at: String = row.get("finished_at")?;
    let watermark: Option<String> = row.get("watermark")?;
    let planned: i64 = row.get("planned")?;
    let uploaded: i64 = row.get("uploaded")?;
    let batches: i64 = row.get("batches")?;
    let project_id: Option<i64> = row.get("project_id")?;

    Ok(SyncCycleRecord {
        id: row.get("id")?,
        project_id: project_id.map(ProjectId),
        started_at: parse_datetime(&started_at, "started_at")?,
        finished_at: parse_datetime(&finished_at, "finished_at")?,
        outcome: row.get("outcome")?,
        planned: to_u64(planned, "planned")?,
        uploaded: to_u64(uploaded, "uploaded")?,
        batches: to_u64(batches, "batches")?,
        watermark: parse_optional_datetime(watermark, "watermark")?,
        error: row.get("error")?,
    })
}

impl Database {
    pub async fn insert_sync_cycle(&self, record: &SyncCycleRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sync_cycles
                    (id, project_id, started_at, finished_at, outcome, planned, uploaded, batches, watermark, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    record.project_id.map(|id| id.0),
                    format_datetime(&record.started_at),
                    format_datetime(&record.finished_at),
                    record.outcome,
                    to_i64(record.planned)?,
                    to_i64(record.uploaded)?,
                    to_i64(record.batches)?,
                    record.watermark.as_ref().map(format_datetime),
                    record.error,
                ],
            )
            .context("failed to insert sync cycle")?;
            Ok(())
        })
        .await
    }

    /// Most recent cycles first.
    pub async fn list_recent_sync_cycles(&self, limit: usize) -> Result<Vec<SyncCycleRecord>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, started_at, finished_at, outcome, planned, uploaded, batches, watermark, error
                 FROM sync_cycles
                 ORDER BY started_at DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut cycles = Vec::new();
            while let Some(row) = rows.next()? {
                cycles.push(row_to_cycle(row)?);
            }
            Ok(cycles)
        })
        .await
    }
}
