//! Upload batch data models.
//!
//! A `SyncBatch` is the unit of upload atomicity: either the backend accepts
//! every measurement in it or the watermark is left untouched.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

use super::measurement::MeasurementSnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity/demographic fields, fetched once per cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    #[serde(default)]
    pub biological_sex: Option<String>,
    #[serde(default)]
    pub blood_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub project_id: ProjectId,
    #[serde(flatten)]
    pub profile: UserProfile,
}

impl ProjectContext {
    pub fn new(project_id: ProjectId, profile: UserProfile) -> Self {
        Self {
            project_id,
            profile,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBatch {
    #[serde(rename = "userInfo")]
    context: ProjectContext,
    measurements: Vec<MeasurementSnapshot>,
}

impl SyncBatch {
    /// Builds a batch, rejecting empty input and timestamps that go backwards.
    pub fn new(context: ProjectContext, measurements: Vec<MeasurementSnapshot>) -> Result<Self> {
        if measurements.is_empty() {
            return Err(SyncError::EmptyBatch);
        }

        if let Some(pair) = measurements
            .windows(2)
            .find(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(SyncError::UnorderedBatch(pair[1].timestamp));
        }

        Ok(Self {
            context,
            measurements,
        })
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    pub fn project_id(&self) -> ProjectId {
        self.context.project_id
    }

    pub fn measurements(&self) -> &[MeasurementSnapshot] {
        &self.measurements
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn first_timestamp(&self) -> DateTime<Utc> {
        self.measurements[0].timestamp
    }

    /// Timestamp the watermark moves to once this batch is delivered.
    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.measurements[self.measurements.len() - 1].timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn context() -> ProjectContext {
        ProjectContext::new(
            ProjectId(3),
            UserProfile {
                user_id: "u-1".into(),
                provider: Some("apple".into()),
                birth_date: NaiveDate::from_ymd_opt(1990, 4, 1),
                biological_sex: Some("female".into()),
                blood_type: None,
            },
        )
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn empty_batch_is_rejected() {
        let err = SyncBatch::new(context(), Vec::new()).unwrap_err();
        assert_eq!(err, SyncError::EmptyBatch);
    }

    #[test]
    fn unordered_batch_is_rejected() {
        let measurements = vec![
            MeasurementSnapshot::empty(base() + Duration::minutes(1)),
            MeasurementSnapshot::empty(base()),
        ];
        let err = SyncBatch::new(context(), measurements).unwrap_err();
        assert_eq!(err, SyncError::UnorderedBatch(base()));
    }

    #[test]
    fn bounds_follow_measurement_order() {
        let measurements = (0..3)
            .map(|m| MeasurementSnapshot::empty(base() + Duration::minutes(m)))
            .collect();
        let batch = SyncBatch::new(context(), measurements).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.first_timestamp(), base());
        assert_eq!(batch.last_timestamp(), base() + Duration::minutes(2));
        assert_eq!(batch.project_id(), ProjectId(3));
    }

    #[test]
    fn wire_payload_carries_context_and_measurements() {
        let batch = SyncBatch::new(context(), vec![MeasurementSnapshot::empty(base())]).unwrap();
        let json = serde_json::to_value(&batch).unwrap();

        assert_eq!(json["userInfo"]["projectId"], 3);
        assert_eq!(json["userInfo"]["userId"], "u-1");
        assert_eq!(json["userInfo"]["birthDate"], "1990-04-01");
        assert!(json["userInfo"]["bloodType"].is_null());
        assert_eq!(json["measurements"].as_array().unwrap().len(), 1);
    }
}
