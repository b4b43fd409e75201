//! Payloads of real-time domain events.
//!
//! "created" and "updated" events carry a full record and decode directly
//! into `Dispatch`, `Personal` or `Incident`. The types here cover the
//! patch-style events, which carry an identity plus only the changed fields.

use crate::dispatch::DispatchStatus;
use crate::incident::{AnalysisResult, IncidentPriority, IncidentStatus};
use crate::record::{GeoPoint, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `<domain>:status-changed` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChanged<S> {
    pub id: RecordId,
    pub status: S,
}

/// `dispatch:completed` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchCompleted {
    pub id: RecordId,
    #[serde(default)]
    pub status: Option<DispatchStatus>,
}

impl DispatchCompleted {
    /// Terminal status to apply: the payload's marker when it is terminal,
    /// `completado` otherwise.
    pub fn terminal_status(&self) -> DispatchStatus {
        self.status
            .filter(DispatchStatus::is_terminal)
            .unwrap_or(DispatchStatus::Completed)
    }
}

/// `ambulance:location-updated` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbulanceLocationUpdated {
    pub ambulance_id: RecordId,
    pub location: GeoPoint,
}

/// `incident:analysis-completed` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentAnalysisCompleted {
    pub id: RecordId,
    pub status: IncidentStatus,
    pub analysis: AnalysisResult,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// `incident:priority-changed` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentPriorityChanged {
    pub id: RecordId,
    pub priority: IncidentPriority,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completed_marker_defaults_to_completado() {
        let bare: DispatchCompleted = serde_json::from_value(json!({"id": "1"})).unwrap();
        assert_eq!(bare.terminal_status(), DispatchStatus::Completed);

        let cancelled: DispatchCompleted =
            serde_json::from_value(json!({"id": "1", "status": "cancelado"})).unwrap();
        assert_eq!(cancelled.terminal_status(), DispatchStatus::Cancelled);

        let bogus: DispatchCompleted =
            serde_json::from_value(json!({"id": "1", "status": "en_camino"})).unwrap();
        assert_eq!(bogus.terminal_status(), DispatchStatus::Completed);
    }

    #[test]
    fn test_location_payload() {
        let p: AmbulanceLocationUpdated = serde_json::from_value(json!({
            "ambulanceId": "amb-1",
            "location": {"lat": 4.6, "lon": -74.08}
        }))
        .unwrap();
        assert_eq!(p.ambulance_id, "amb-1");
        assert_eq!(p.location, GeoPoint::new(4.6, -74.08));
    }
}
