//! Clinical decision support lookup.
//!
//! Scoring and hospital matching run on the backend; this module only
//! carries the request and its result.

use crate::record::{GeoPoint, RecordId};
use serde::{Deserialize, Serialize};

/// Vital signs captured at the scene. Every reading is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systolic_bp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diastolic_bp: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<u32>,
    /// Oxygen saturation, percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<u32>,
    /// Body temperature, Celsius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Glasgow coma scale (3-15).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glasgow: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalInput {
    pub location: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub vitals: Vitals,
}

impl ClinicalInput {
    pub fn new(location: GeoPoint) -> Self {
        Self {
            location,
            age: None,
            symptoms: Vec::new(),
            vitals: Vitals::default(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.location.is_valid() {
            return Err(format!(
                "Invalid location: {}, {}",
                self.location.lat, self.location.lon
            ));
        }
        if let Some(spo2) = self.vitals.spo2 {
            if spo2 > 100 {
                return Err(format!("SpO2 must be at most 100, got {spo2}"));
            }
        }
        if let Some(gcs) = self.vitals.glasgow {
            if !(3..=15).contains(&gcs) {
                return Err(format!("Glasgow score must be between 3 and 15, got {gcs}"));
            }
        }
        if let Some(temp) = self.vitals.temperature {
            if !(20.0..=45.0).contains(&temp) {
                return Err(format!("Implausible temperature: {temp}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityLevel {
    Leve,
    Moderado,
    Grave,
    Critico,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalRecommendation {
    pub hospital_id: RecordId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_beds: Option<u32>,
    /// Match score; higher is better.
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicalAssessment {
    pub severity_score: f64,
    pub severity_level: SeverityLevel,
    #[serde(default)]
    pub recommendations: Vec<HospitalRecommendation>,
}

impl ClinicalAssessment {
    /// Highest scoring hospital, if any was recommended.
    pub fn best_hospital(&self) -> Option<&HospitalRecommendation> {
        self.recommendations
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }
}
