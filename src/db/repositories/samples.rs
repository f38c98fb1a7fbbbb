use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
    models::{LocationRecord, Sample},
};
use crate::models::{GeoFix, MeasurementKind, MeasurementSnapshot, UserProfile};
use crate::sync::{LocationProvider, MeasurementSource};

impl Database {
    pub async fn insert_samples(&self, samples: &[Sample]) -> Result<usize> {
        let records = samples.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO samples (kind, value, recorded_at) VALUES (?1, ?2, ?3)",
                )?;
                for record in &records {
                    stmt.execute(params![
                        record.kind.as_str(),
                        record.value,
                        format_datetime(&record.recorded_at),
                    ])
                    .context("failed to insert sample")?;
                }
            }
            tx.commit().context("failed to commit samples")?;
            Ok(records.len())
        })
        .await
    }

    pub async fn insert_location(&self, location: &LocationRecord) -> Result<()> {
        let record = location.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO locations (latitude, longitude, recorded_at) VALUES (?1, ?2, ?3)",
                params![
                    record.latitude,
                    record.longitude,
                    format_datetime(&record.recorded_at),
                ],
            )
            .context("failed to insert location")?;
            Ok(())
        })
        .await
    }

    /// Latest value per kind and latest location recorded at or before `at`.
    pub async fn snapshot_at(&self, at: DateTime<Utc>) -> Result<MeasurementSnapshot> {
        self.execute(move |conn| {
            let cutoff = format_datetime(&at);
            let mut snapshot = MeasurementSnapshot::empty(at);

            let mut stmt = conn.prepare(
                "SELECT value FROM samples
                 WHERE kind = ?1 AND recorded_at <= ?2
                 ORDER BY recorded_at DESC, id DESC
                 LIMIT 1",
            )?;
            for kind in MeasurementKind::ALL {
                let value: Option<f64> = stmt
                    .query_row(params![kind.as_str(), cutoff], |row| row.get(0))
                    .optional()
                    .with_context(|| format!("failed to query {}", kind.as_str()))?;
                snapshot.set(kind, value);
            }

            let location: Option<(f64, f64)> = conn
                .query_row(
                    "SELECT latitude, longitude FROM locations
                     WHERE recorded_at <= ?1
                     ORDER BY recorded_at DESC, id DESC
                     LIMIT 1",
                    params![cutoff],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .context("failed to query location")?;
            if let Some((latitude, longitude)) = location {
                snapshot.set_location(latitude, longitude);
            }

            Ok(snapshot)
        })
        .await
    }

    pub async fn latest_location(&self) -> Result<Option<LocationRecord>> {
        self.execute(|conn| {
            let row: Option<(f64, f64, String)> = conn
                .query_row(
                    "SELECT latitude, longitude, recorded_at FROM locations
                     ORDER BY recorded_at DESC, id DESC
                     LIMIT 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            row.map(|(latitude, longitude, recorded_at)| {
                Ok(LocationRecord {
                    latitude,
                    longitude,
                    recorded_at: parse_datetime(&recorded_at, "recorded_at")?,
                })
            })
            .transpose()
        })
        .await
    }
}

/// Measurement source and location provider over the local sample log.
#[derive(Clone)]
pub struct SampleLogSource {
    db: Database,
}

impl SampleLogSource {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MeasurementSource for SampleLogSource {
    async fn snapshot(&self, at: DateTime<Utc>) -> Result<MeasurementSnapshot> {
        self.db.snapshot_at(at).await
    }

    async fn user_profile(&self) -> Result<UserProfile> {
        self.db
            .get_user_profile()
            .await?
            .ok_or_else(|| anyhow!("no user profile recorded"))
    }
}

#[async_trait]
impl LocationProvider for SampleLogSource {
    // Fixes are pushed by the host bridge; there is nothing to poke.
    async fn request_fix(&self) {}

    async fn last_fix(&self) -> Option<GeoFix> {
        match self.db.latest_location().await {
            Ok(location) => location.map(|record| GeoFix {
                latitude: record.latitude,
                longitude: record.longitude,
                captured_at: record.recorded_at,
            }),
            Err(err) => {
                log::warn!("failed to read latest location: {err:#}");
                None
            }
        }
    }
}
