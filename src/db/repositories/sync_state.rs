use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_optional_datetime},
};
use crate::models::{ProjectId, UserProfile};
use crate::sync::{SyncState, SyncStateStore};

const KEY_LAST_SYNC: &str = "last_sync";
const KEY_LAST_PROJECT_ID: &str = "last_project_id";
const KEY_USER_PROFILE: &str = "user_profile";

fn read_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM sync_state WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .with_context(|| format!("failed to read sync_state key {key}"))
}

fn write_value(conn: &Connection, key: &str, value: &str, now: &DateTime<Utc>) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_state (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, format_datetime(now)],
    )
    .with_context(|| format!("failed to write sync_state key {key}"))?;
    Ok(())
}

impl Database {
    pub async fn get_sync_state(&self) -> Result<SyncState> {
        self.execute(|conn| {
            let last_sync = parse_optional_datetime(read_value(conn, KEY_LAST_SYNC)?, KEY_LAST_SYNC)?;
            let last_project_id = read_value(conn, KEY_LAST_PROJECT_ID)?
                .map(|raw| {
                    raw.parse::<i64>()
                        .map(ProjectId)
                        .with_context(|| format!("invalid {KEY_LAST_PROJECT_ID} '{raw}'"))
                })
                .transpose()?;

            Ok(SyncState {
                last_sync,
                last_project_id,
            })
        })
        .await
    }

    /// Writes watermark and project together; either both land or neither.
    pub async fn set_sync_state(
        &self,
        last_sync: DateTime<Utc>,
        project_id: ProjectId,
    ) -> Result<()> {
        self.execute(move |conn| {
            let now = Utc::now();
            let tx = conn
                .transaction()
                .context("failed to open sync_state transaction")?;
            write_value(&tx, KEY_LAST_SYNC, &format_datetime(&last_sync), &now)?;
            write_value(&tx, KEY_LAST_PROJECT_ID, &project_id.0.to_string(), &now)?;
            tx.commit().context("failed to commit sync_state")?;
            Ok(())
        })
        .await
    }

    pub async fn get_user_profile(&self) -> Result<Option<UserProfile>> {
        self.execute(|conn| {
            read_value(conn, KEY_USER_PROFILE)?
                .map(|json| {
                    serde_json::from_str(&json).context("failed to deserialize user profile")
                })
                .transpose()
        })
        .await
    }

    pub async fn set_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let json = serde_json::to_string(profile).context("failed to serialize user profile")?;
        self.execute(move |conn| write_value(conn, KEY_USER_PROFILE, &json, &Utc::now()))
            .await
    }
}

/// `SyncStateStore` backed by the `sync_state` table.
#[derive(Clone)]
pub struct SqliteStateStore {
    db: Database,
}

impl SqliteStateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SyncStateStore for SqliteStateStore {
    async fn get(&self) -> Result<SyncState> {
        self.db.get_sync_state().await
    }

    async fn set(&self, last_sync: DateTime<Utc>, project_id: ProjectId) -> Result<()> {
        self.db.set_sync_state(last_sync, project_id).await
    }
}
