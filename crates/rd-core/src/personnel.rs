//! Personnel records.

use crate::filters::Filters;
use crate::record::{Record, RecordId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Availability of a crew member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalStatus {
    Disponible,
    EnServicio,
    FueraDeServicio,
    DeLicencia,
}

impl PersonalStatus {
    pub const ALL: [Self; 4] = [
        Self::Disponible,
        Self::EnServicio,
        Self::FueraDeServicio,
        Self::DeLicencia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disponible => "disponible",
            Self::EnServicio => "en_servicio",
            Self::FueraDeServicio => "fuera_de_servicio",
            Self::DeLicencia => "de_licencia",
        }
    }

    /// Taking someone off the roster must be justified.
    pub fn requires_reason(&self) -> bool {
        matches!(self, Self::FueraDeServicio | Self::DeLicencia)
    }
}

impl fmt::Display for PersonalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown personnel status: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalRole {
    Paramedico,
    Conductor,
    Medico,
    Enfermero,
    Despachador,
}

/// Crew member record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personal {
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub role: PersonalRole,
    pub status: PersonalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Ambulance the member is currently assigned to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambulance_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
}

impl Personal {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_available(&self) -> bool {
        self.status == PersonalStatus::Disponible
    }
}

impl Record for Personal {
    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// Input of the `createPersonal` mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePersonalInput {
    pub first_name: String,
    pub last_name: String,
    pub role: PersonalRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
}

/// Partial update of a crew member. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<PersonalRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambulance_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift: Option<String>,
}

impl PersonalUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Patch `target` with the fields set on this update.
    pub fn apply_to(&self, target: &mut Personal) {
        if let Some(v) = &self.first_name {
            target.first_name = v.clone();
        }
        if let Some(v) = &self.last_name {
            target.last_name = v.clone();
        }
        if let Some(v) = self.role {
            target.role = v;
        }
        if let Some(v) = &self.phone {
            target.phone = Some(v.clone());
        }
        if let Some(v) = &self.email {
            target.email = Some(v.clone());
        }
        if let Some(v) = &self.ambulance_id {
            target.ambulance_id = Some(v.clone());
        }
        if let Some(v) = &self.shift {
            target.shift = Some(v.clone());
        }
    }
}

/// Personnel list filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonnelFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PersonalStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<PersonalRole>,
    /// Free-text match on name, phone or email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl Filters for PersonnelFilters {
    fn merge(&mut self, other: Self) {
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.role.is_some() {
            self.role = other.role;
        }
        if other.search.is_some() {
            self.search = other.search;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paramedic() -> Personal {
        serde_json::from_value(json!({
            "id": "p1",
            "firstName": "Ana",
            "lastName": "Rojas",
            "role": "paramedico",
            "status": "disponible"
        }))
        .unwrap()
    }

    #[test]
    fn test_deserialize_personal() {
        let p = paramedic();
        assert_eq!(p.full_name(), "Ana Rojas");
        assert!(p.is_available());
        assert_eq!(p.role, PersonalRole::Paramedico);
    }

    #[test]
    fn test_update_patches_only_set_fields() {
        let mut p = paramedic();
        let update = PersonalUpdate {
            phone: Some("3001234567".to_string()),
            ..Default::default()
        };
        update.apply_to(&mut p);
        assert_eq!(p.phone.as_deref(), Some("3001234567"));
        assert_eq!(p.first_name, "Ana");
        assert_eq!(p.status, PersonalStatus::Disponible);
    }

    #[test]
    fn test_status_reason_rule() {
        assert!(PersonalStatus::DeLicencia.requires_reason());
        assert!(!PersonalStatus::EnServicio.requires_reason());
        assert_eq!(
            "fuera_de_servicio".parse::<PersonalStatus>().unwrap(),
            PersonalStatus::FueraDeServicio
        );
    }
}
