use chrono::{DateTime, Duration, Utc};

/// Timestamps that need a snapshot between the watermark and `now`.
///
/// First run (no watermark) collects only the live instant. Afterwards every
/// whole minute since the watermark is reconstructed, watermark included, so a
/// suspension gap becomes a backlog instead of a hole.
pub fn plan_backfill(last_sync: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
    let Some(last_sync) = last_sync else {
        return vec![now];
    };

    // num_minutes truncates, which is floor for the positive gaps we keep.
    let gap_minutes = now.signed_duration_since(last_sync).num_minutes();
    if gap_minutes <= 0 {
        return Vec::new();
    }

    (0..=gap_minutes)
        .map(|minute| last_sync + Duration::minutes(minute))
        .take_while(|timestamp| *timestamp <= now)
        .collect()
}
