//! Core domain types for the rescue-dispatch console.
//!
//! This crate provides the records every other crate exchanges:
//! - `Dispatch`, `Personal`, `Incident`: the three domains held client-side
//! - Status/priority enums with their transition rules
//! - Real-time event payloads (`events`)
//! - `ActionError`: the tagged error surfaced by state containers
//! - `storage`: local key/value persistence for auth material

pub mod auth;
pub mod clinical;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod filters;
pub mod incident;
pub mod personnel;
pub mod record;
pub mod storage;

pub use auth::{AuthToken, LoginResponse, UserProfile};
pub use clinical::{
    ClinicalAssessment, ClinicalInput, HospitalRecommendation, SeverityLevel, Vitals,
};
pub use dispatch::{
    AmbulanceRef, CreateDispatchInput, Dispatch, DispatchFeedback, DispatchFilters,
    DispatchStatus,
};
pub use error::{require_reason, ActionError, ErrorKind};
pub use events::{
    AmbulanceLocationUpdated, DispatchCompleted, IncidentAnalysisCompleted,
    IncidentPriorityChanged, StatusChanged,
};
pub use filters::Filters;
pub use incident::{
    AnalysisResult, CreateIncidentInput, Incident, IncidentFilters, IncidentPage,
    IncidentPriority, IncidentStatus,
};
pub use personnel::{
    CreatePersonalInput, Personal, PersonalRole, PersonalStatus, PersonalUpdate,
    PersonnelFilters,
};
pub use record::{GeoPoint, Record, RecordId};
pub use storage::{FileStorage, KeyValueStore, MemoryStorage, StorageError, StorageResult};
