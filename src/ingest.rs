//! JSON-lines import into the local sample log.
//!
//! Each non-blank line is one record tagged by `type`:
//!
//! ```text
//! {"type":"profile","userId":"u-1","provider":"apple","birthDate":"1990-04-01"}
//! {"type":"sample","kind":"heartRate","value":72,"recordedAt":"2024-05-01T10:00:00Z"}
//! {"type":"location","latitude":37.5,"longitude":127.0,"recordedAt":"2024-05-01T10:00:00Z"}
//! ```

use std::io::BufRead;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::db::{Database, LocationRecord, Sample};
use crate::models::UserProfile;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImportRecord {
    Sample(Sample),
    Location(LocationRecord),
    Profile(UserProfile),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub samples: usize,
    pub locations: usize,
    pub profiles: usize,
}

/// Lines starting with `#` are comments.
pub fn parse_records<R: BufRead>(reader: R) -> Result<Vec<ImportRecord>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", index + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid record on line {}", index + 1))?;
        records.push(record);
    }
    Ok(records)
}

/// Writes parsed records. The last profile in the input wins.
pub async fn import_records(db: &Database, records: Vec<ImportRecord>) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut samples = Vec::new();

    for record in records {
        match record {
            ImportRecord::Sample(sample) => samples.push(sample),
            ImportRecord::Location(location) => {
                db.insert_location(&location).await?;
                summary.locations += 1;
            }
            ImportRecord::Profile(profile) => {
                db.set_user_profile(&profile).await?;
                summary.profiles += 1;
            }
        }
    }

    if !samples.is_empty() {
        summary.samples = db.insert_samples(&samples).await?;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeasurementKind;
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;

    const INPUT: &str = r#"
# exported from the watch bridge
{"type":"profile","userId":"u-1","provider":"apple","birthDate":"1990-04-01","biologicalSex":"female"}
{"type":"sample","kind":"heartRate","value":72,"recordedAt":"2024-05-01T10:00:00Z"}
{"type":"sample","kind":"stepCount","value":15,"recordedAt":"2024-05-01T10:00:30Z"}

{"type":"location","latitude":37.5,"longitude":127.0,"recordedAt":"2024-05-01T10:00:00Z"}
"#;

    #[test]
    fn parses_tagged_records_and_skips_comments() {
        let records = parse_records(Cursor::new(INPUT)).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(
            records[1],
            ImportRecord::Sample(Sample {
                kind: MeasurementKind::HeartRate,
                value: 72.0,
                recorded_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
            })
        );
    }

    #[test]
    fn reports_the_offending_line() {
        let err = parse_records(Cursor::new("{\"type\":\"sample\"}\n")).unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));

        let err = parse_records(Cursor::new("\n{\"type\":\"weather\"}\n")).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[tokio::test]
    async fn imported_records_feed_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("import.sqlite3")).unwrap();

        let records = parse_records(Cursor::new(INPUT)).unwrap();
        let summary = import_records(&db, records).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                samples: 2,
                locations: 1,
                profiles: 1
            }
        );

        let profile = db.get_user_profile().await.unwrap().unwrap();
        assert_eq!(profile.user_id, "u-1");

        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 1, 0).unwrap();
        let snapshot = db.snapshot_at(at).await.unwrap();
        assert_eq!(snapshot.heart_rate, Some(72.0));
        assert_eq!(snapshot.step_count, Some(15.0));
        assert_eq!(snapshot.latitude, Some(37.5));
    }
}
