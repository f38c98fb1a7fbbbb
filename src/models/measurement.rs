//! Measurement snapshot data model.
//!
//! A snapshot is the set of measurement values available at one instant. Every
//! field is independently optional because the underlying store may lack data
//! for some kinds at that time.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Wall-clock format used on the wire (`2024-05-01T10:00:00`).
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementKind {
    StepCount,
    HeartRate,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    OxygenSaturation,
    BodyTemperature,
    RespiratoryRate,
    Height,
    Weight,
    RunningSpeed,
    ActiveEnergy,
    BasalEnergy,
}

impl MeasurementKind {
    pub const ALL: [MeasurementKind; 12] = [
        MeasurementKind::StepCount,
        MeasurementKind::HeartRate,
        MeasurementKind::BloodPressureSystolic,
        MeasurementKind::BloodPressureDiastolic,
        MeasurementKind::OxygenSaturation,
        MeasurementKind::BodyTemperature,
        MeasurementKind::RespiratoryRate,
        MeasurementKind::Height,
        MeasurementKind::Weight,
        MeasurementKind::RunningSpeed,
        MeasurementKind::ActiveEnergy,
        MeasurementKind::BasalEnergy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeasurementKind::StepCount => "stepCount",
            MeasurementKind::HeartRate => "heartRate",
            MeasurementKind::BloodPressureSystolic => "bloodPressureSystolic",
            MeasurementKind::BloodPressureDiastolic => "bloodPressureDiastolic",
            MeasurementKind::OxygenSaturation => "oxygenSaturation",
            MeasurementKind::BodyTemperature => "bodyTemperature",
            MeasurementKind::RespiratoryRate => "respiratoryRate",
            MeasurementKind::Height => "height",
            MeasurementKind::Weight => "weight",
            MeasurementKind::RunningSpeed => "runningSpeed",
            MeasurementKind::ActiveEnergy => "activeEnergy",
            MeasurementKind::BasalEnergy => "basalEnergy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

/// A location fix reported by the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl GeoFix {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.captured_at) <= max_age
    }
}

/// One per-minute measurement record, serialized exactly as the backend expects.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementSnapshot {
    #[serde(serialize_with = "serialize_local_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub step_count: Option<f64>,
    pub heart_rate: Option<f64>,
    pub blood_pressure_systolic: Option<f64>,
    pub blood_pressure_diastolic: Option<f64>,
    pub oxygen_saturation: Option<f64>,
    pub body_temperature: Option<f64>,
    pub respiratory_rate: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub running_speed: Option<f64>,
    pub active_energy: Option<f64>,
    pub basal_energy: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl MeasurementSnapshot {
    /// A snapshot with every field absent.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            step_count: None,
            heart_rate: None,
            blood_pressure_systolic: None,
            blood_pressure_diastolic: None,
            oxygen_saturation: None,
            body_temperature: None,
            respiratory_rate: None,
            height: None,
            weight: None,
            running_speed: None,
            active_energy: None,
            basal_energy: None,
            latitude: None,
            longitude: None,
        }
    }

    fn slot_mut(&mut self, kind: MeasurementKind) -> &mut Option<f64> {
        match kind {
            MeasurementKind::StepCount => &mut self.step_count,
            MeasurementKind::HeartRate => &mut self.heart_rate,
            MeasurementKind::BloodPressureSystolic => &mut self.blood_pressure_systolic,
            MeasurementKind::BloodPressureDiastolic => &mut self.blood_pressure_diastolic,
            MeasurementKind::OxygenSaturation => &mut self.oxygen_saturation,
            MeasurementKind::BodyTemperature => &mut self.body_temperature,
            MeasurementKind::RespiratoryRate => &mut self.respiratory_rate,
            MeasurementKind::Height => &mut self.height,
            MeasurementKind::Weight => &mut self.weight,
            MeasurementKind::RunningSpeed => &mut self.running_speed,
            MeasurementKind::ActiveEnergy => &mut self.active_energy,
            MeasurementKind::BasalEnergy => &mut self.basal_energy,
        }
    }

    pub fn value(&self, kind: MeasurementKind) -> Option<f64> {
        match kind {
            MeasurementKind::StepCount => self.step_count,
            MeasurementKind::HeartRate => self.heart_rate,
            MeasurementKind::BloodPressureSystolic => self.blood_pressure_systolic,
            MeasurementKind::BloodPressureDiastolic => self.blood_pressure_diastolic,
            MeasurementKind::OxygenSaturation => self.oxygen_saturation,
            MeasurementKind::BodyTemperature => self.body_temperature,
            MeasurementKind::RespiratoryRate => self.respiratory_rate,
            MeasurementKind::Height => self.height,
            MeasurementKind::Weight => self.weight,
            MeasurementKind::RunningSpeed => self.running_speed,
            MeasurementKind::ActiveEnergy => self.active_energy,
            MeasurementKind::BasalEnergy => self.basal_energy,
        }
    }

    pub fn set(&mut self, kind: MeasurementKind, value: Option<f64>) {
        *self.slot_mut(kind) = value;
    }

    pub fn with_value(mut self, kind: MeasurementKind, value: f64) -> Self {
        self.set(kind, Some(value));
        self
    }

    pub fn set_location(&mut self, latitude: f64, longitude: f64) {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
    }

    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.set_location(latitude, longitude);
        self
    }

    pub fn has_location(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    /// Number of populated fields, location counted once.
    pub fn populated_fields(&self) -> usize {
        let measurements = MeasurementKind::ALL
            .iter()
            .filter(|kind| self.value(**kind).is_some())
            .count();
        measurements + usize::from(self.has_location())
    }

    pub fn is_empty(&self) -> bool {
        self.populated_fields() == 0 && self.latitude.is_none() && self.longitude.is_none()
    }
}

fn serialize_local_timestamp<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let local = value.with_timezone(&Local);
    serializer.collect_str(&local.format(WIRE_TIMESTAMP_FORMAT))
}
