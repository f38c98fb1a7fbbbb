use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ProjectId;
use crate::sync::CycleOutcome;

/// One finished sync cycle as kept in the journal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncCycleRecord {
    pub id: String,
    pub project_id: Option<ProjectId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: String,
    pub planned: u64,
    pub uploaded: u64,
    pub batches: u64,
    pub watermark: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SyncCycleRecord {
    pub fn from_outcome(outcome: &CycleOutcome, finished_fallback: DateTime<Utc>) -> Self {
        let report = outcome.report();
        Self {
            id: report.cycle_id.to_string(),
            project_id: Some(report.project_id),
            started_at: report.started_at,
            finished_at: report.finished_at.unwrap_or(finished_fallback),
            outcome: outcome.as_str().to_string(),
            planned: report.planned as u64,
            uploaded: report.uploaded as u64,
            batches: report.batches as u64,
            watermark: report.watermark,
            error: outcome.error().map(|err| err.to_string()),
        }
    }
}
