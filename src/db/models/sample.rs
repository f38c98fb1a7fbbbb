//! Raw readings recorded by the host bridge.
//!
//! The sample log is what the SQLite measurement source answers snapshot
//! queries from: latest value per kind at or before the requested instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::MeasurementKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub kind: MeasurementKind,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}
