pub mod batch;
pub mod measurement;
pub mod project;

pub use batch::{ProjectContext, ProjectId, SyncBatch, UserProfile};
pub use measurement::{GeoFix, MeasurementKind, MeasurementSnapshot, WIRE_TIMESTAMP_FORMAT};
pub use project::{Project, ProjectResponse};
