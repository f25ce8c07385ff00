use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub email: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
}

/// Response of the login and refresh endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    pub success: bool,
    #[serde(rename = "accessToken")]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
    pub message: Option<String>,
}

impl TokenResponse {
    /// The new access token, if the response counts as a success.
    pub fn granted_token(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn rotated_refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Identity persisted under the `user` credential key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct UserInfo {
    pub email: String,
    pub name: String,
}

impl UserInfo {
    /// The backend does not return a profile on login, so the name defaults
    /// to the local part of the email.
    pub fn from_email(email: &str) -> Self {
        let name = email.split('@').next().unwrap_or(email).to_string();
        Self {
            email: email.to_string(),
            name,
        }
    }
}
