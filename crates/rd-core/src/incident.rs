//! Incident report records.
//!
//! Incoming reports are triaged: the backend's clinical analysis scores
//! them, a dispatcher approves or rejects them, and approved incidents are
//! dispatched and eventually closed.

use crate::filters::Filters;
use crate::record::{Record, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Pendiente,
    EnAnalisis,
    Analizado,
    Aprobado,
    Rechazado,
    Despachado,
    Cerrado,
}

impl IncidentStatus {
    pub const ALL: [Self; 7] = [
        Self::Pendiente,
        Self::EnAnalisis,
        Self::Analizado,
        Self::Aprobado,
        Self::Rechazado,
        Self::Despachado,
        Self::Cerrado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pendiente => "pendiente",
            Self::EnAnalisis => "en_analisis",
            Self::Analizado => "analizado",
            Self::Aprobado => "aprobado",
            Self::Rechazado => "rechazado",
            Self::Despachado => "despachado",
            Self::Cerrado => "cerrado",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rechazado | Self::Cerrado)
    }

    pub fn requires_reason(&self) -> bool {
        matches!(self, Self::Rechazado)
    }

    /// Terminal incidents never change status; everything else may move
    /// to any other status.
    pub fn can_transition_to(&self, next: Self) -> bool {
        !self.is_terminal() && *self != next
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown incident status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentPriority {
    Baja,
    Media,
    Alta,
    Critica,
}

impl IncidentPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baja => "baja",
            Self::Media => "media",
            Self::Alta => "alta",
            Self::Critica => "critica",
        }
    }
}

impl fmt::Display for IncidentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the backend's clinical analysis of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub severity_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_hospital_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Incident report record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: RecordId,
    pub status: IncidentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<IncidentPriority>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Incident {
    pub fn new(id: impl Into<RecordId>, status: IncidentStatus) -> Self {
        Self {
            id: id.into(),
            status,
            priority: None,
            description: String::new(),
            reporter_name: None,
            reporter_phone: None,
            address: None,
            lat: None,
            lon: None,
            analysis: None,
            analyzed_at: None,
            rejection_reason: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Record for Incident {
    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// Input of the `createIncident` mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncidentInput {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<IncidentPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

/// One page of the `incidents` query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentPage {
    pub items: Vec<Incident>,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<IncidentPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<u32>,
}

impl Filters for IncidentFilters {
    fn merge(&mut self, other: Self) {
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.priority.is_some() {
            self.priority = other.priority;
        }
        if other.hours.is_some() {
            self.hours = other.hours;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_incident_with_analysis() {
        let incident: Incident = serde_json::from_value(json!({
            "id": "i1",
            "status": "analizado",
            "priority": "alta",
            "description": "Fall from height",
            "analysis": {"severityScore": 7.5, "recommendedHospitalId": "h2"},
            "analyzedAt": "2026-10-18T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(incident.status, IncidentStatus::Analizado);
        assert_eq!(incident.priority, Some(IncidentPriority::Alta));
        let analysis = incident.analysis.unwrap();
        assert_eq!(analysis.severity_score, 7.5);
        assert_eq!(analysis.recommended_hospital_id, Some(RecordId::new("h2")));
        assert!(incident.analyzed_at.is_some());
    }

    #[test]
    fn test_terminal_statuses_are_frozen() {
        assert!(!IncidentStatus::Cerrado.can_transition_to(IncidentStatus::Aprobado));
        assert!(!IncidentStatus::Rechazado.can_transition_to(IncidentStatus::Pendiente));
        assert!(IncidentStatus::Analizado.can_transition_to(IncidentStatus::Aprobado));
        assert!(!IncidentStatus::Aprobado.can_transition_to(IncidentStatus::Aprobado));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(IncidentPriority::Critica > IncidentPriority::Alta);
        assert!(IncidentPriority::Baja < IncidentPriority::Media);
    }
}
