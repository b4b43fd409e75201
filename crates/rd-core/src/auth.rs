//! Authentication records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::record::RecordId;

/// Profile of the signed-in operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: RecordId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Bearer token held for the gateway and the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Payload of the `login` mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds from issuance.
    pub expires_in: i64,
    pub user: UserProfile,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl LoginResponse {
    pub fn token(&self, issued_at: DateTime<Utc>) -> AuthToken {
        AuthToken {
            access_token: self.access_token.clone(),
            token_type: self.token_type.clone(),
            expires_at: issued_at + Duration::seconds(self.expires_in),
        }
    }
}
