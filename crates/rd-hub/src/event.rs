//! Event vocabulary and wire envelope.
//!
//! Every frame on the push connection, in both directions, is a JSON text
//! frame of the form `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recognised event names.
///
/// The domain events are delivered by the server. `Connected`,
/// `Disconnected` and `Error` are raised locally by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubEvent {
    DispatchCreated,
    DispatchStatusChanged,
    DispatchCompleted,
    AmbulanceLocationUpdated,
    PersonalCreated,
    PersonalUpdated,
    PersonalStatusChanged,
    IncidentCreated,
    IncidentUpdated,
    IncidentStatusChanged,
    IncidentAnalysisCompleted,
    IncidentPriorityChanged,
    Error,
    Connected,
    Disconnected,
}

impl HubEvent {
    pub const ALL: [Self; 15] = [
        Self::DispatchCreated,
        Self::DispatchStatusChanged,
        Self::DispatchCompleted,
        Self::AmbulanceLocationUpdated,
        Self::PersonalCreated,
        Self::PersonalUpdated,
        Self::PersonalStatusChanged,
        Self::IncidentCreated,
        Self::IncidentUpdated,
        Self::IncidentStatusChanged,
        Self::IncidentAnalysisCompleted,
        Self::IncidentPriorityChanged,
        Self::Error,
        Self::Connected,
        Self::Disconnected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DispatchCreated => "dispatch:created",
            Self::DispatchStatusChanged => "dispatch:status-changed",
            Self::DispatchCompleted => "dispatch:completed",
            Self::AmbulanceLocationUpdated => "ambulance:location-updated",
            Self::PersonalCreated => "personal:created",
            Self::PersonalUpdated => "personal:updated",
            Self::PersonalStatusChanged => "personal:status-changed",
            Self::IncidentCreated => "incident:created",
            Self::IncidentUpdated => "incident:updated",
            Self::IncidentStatusChanged => "incident:status-changed",
            Self::IncidentAnalysisCompleted => "incident:analysis-completed",
            Self::IncidentPriorityChanged => "incident:priority-changed",
            Self::Error => "error",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }

    /// Raised by the transport itself rather than sent by the server.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Connected | Self::Disconnected)
    }
}

impl fmt::Display for HubEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HubEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| format!("unrecognised event: {s}"))
    }
}

/// Wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}
