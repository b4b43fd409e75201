//! Dispatch records.
//!
//! A dispatch sends one ambulance to one patient location. Its status moves
//! forward through the lifecycle below; `completado` and `cancelado` are
//! terminal.
//!
//! ```text
//! pending ─► asignado ─► en_camino ─► en_sitio ─► trasladando ─► en_hospital
//!    │           │            │           │  │          │              │
//!    └───────────┴────────────┴─► cancelado  └──────────┴─► completado ◄┘
//! ```

use crate::filters::Filters;
use crate::record::{GeoPoint, Record, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dispatch lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchStatus {
    #[serde(rename = "pending", alias = "pendiente")]
    Pending,
    #[serde(rename = "asignado")]
    Assigned,
    #[serde(rename = "en_camino")]
    EnRoute,
    #[serde(rename = "en_sitio")]
    OnSite,
    #[serde(rename = "trasladando")]
    Transporting,
    #[serde(rename = "en_hospital")]
    AtHospital,
    #[serde(rename = "completado")]
    Completed,
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl DispatchStatus {
    pub const ALL: [Self; 8] = [
        Self::Pending,
        Self::Assigned,
        Self::EnRoute,
        Self::OnSite,
        Self::Transporting,
        Self::AtHospital,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "asignado",
            Self::EnRoute => "en_camino",
            Self::OnSite => "en_sitio",
            Self::Transporting => "trasladando",
            Self::AtHospital => "en_hospital",
            Self::Completed => "completado",
            Self::Cancelled => "cancelado",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Check whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: Self) -> bool {
        use DispatchStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Pending, Cancelled)
                | (Assigned, EnRoute)
                | (Assigned, Cancelled)
                | (EnRoute, OnSite)
                | (EnRoute, Cancelled)
                | (OnSite, Transporting)
                | (OnSite, Completed)
                | (OnSite, Cancelled)
                | (Transporting, AtHospital)
                | (Transporting, Completed)
                | (AtHospital, Completed)
        )
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "pendiente" {
            return Ok(Self::Pending);
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown dispatch status: {s}"))
    }
}

/// Ambulance linked to a dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbulanceRef {
    pub id: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<String>,
    /// Last reported position; patched by real-time location updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// Dispatch record as returned by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispatch {
    pub id: RecordId,
    pub status: DispatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Severity score assigned by triage (1-5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambulance: Option<AmbulanceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Dispatch {
    /// Minimal record with only identity and status set.
    pub fn new(id: impl Into<RecordId>, status: DispatchStatus) -> Self {
        Self {
            id: id.into(),
            status,
            patient_lat: None,
            patient_lon: None,
            patient_address: None,
            description: None,
            severity: None,
            ambulance: None,
            hospital_id: None,
            eta_minutes: None,
            cancel_reason: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn patient_location(&self) -> Option<GeoPoint> {
        match (self.patient_lat, self.patient_lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    pub fn ambulance_id(&self) -> Option<&RecordId> {
        self.ambulance.as_ref().map(|a| &a.id)
    }
}

impl Record for Dispatch {
    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// Input of the `createDispatch` mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDispatchInput {
    pub patient_lat: f64,
    pub patient_lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<RecordId>,
}

impl CreateDispatchInput {
    pub fn new(patient_lat: f64, patient_lon: f64) -> Self {
        Self {
            patient_lat,
            patient_lon,
            patient_address: None,
            description: None,
            severity: None,
            incident_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !GeoPoint::new(self.patient_lat, self.patient_lon).is_valid() {
            return Err(format!(
                "Invalid patient location: {}, {}",
                self.patient_lat, self.patient_lon
            ));
        }
        if let Some(severity) = self.severity {
            if !(1..=5).contains(&severity) {
                return Err(format!("Severity must be between 1 and 5, got {severity}"));
            }
        }
        Ok(())
    }
}

/// Optional crew feedback submitted when a dispatch is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchFeedback {
    /// 1-5 rating of the outcome.
    pub rating: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Dispatch list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DispatchStatus>,
    /// Only dispatches created within the last N hours.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambulance_id: Option<RecordId>,
}

impl Filters for DispatchFilters {
    fn merge(&mut self, other: Self) {
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.hours.is_some() {
            self.hours = other.hours;
        }
        if other.ambulance_id.is_some() {
            self.ambulance_id = other.ambulance_id;
        }
    }
}
