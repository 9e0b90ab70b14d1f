use serde::{Deserialize, Serialize};

use super::UserProfile;

/// Credential set issued by sign-in and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    /// Absent when the authority does not issue refresh tokens to this client.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds, informational only.
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: UserProfile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub login_id: String,
    pub email: String,
    pub password: String,
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_year: Option<i32>,
}

/// Availability of registration identifiers. Only the queried fields are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    #[serde(default)]
    pub login_id_available: Option<bool>,
    #[serde(default)]
    pub email_available: Option<bool>,
}

impl Availability {
    /// True when nothing queried is taken
    pub fn all_available(&self) -> bool {
        self.login_id_available.unwrap_or(true) && self.email_available.unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerificationTicket {
    pub verification_id: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Acknowledgement of an exchange that returns no payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    pub message: Option<String>,
}
