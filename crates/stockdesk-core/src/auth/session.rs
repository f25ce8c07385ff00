//! Login/logout lifecycle and permission predicates.
//!
//! The session is explicit: it is built once at startup around an `ApiClient`
//! and passed to whatever needs it. Claims are always derived from the token
//! currently stored, so they follow refreshes automatically.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{Ack, EmailConfirmation, LoginRequest, Registration, UserInfo};

use super::credentials::{CredentialStore, REFRESH_TOKEN_KEY};
use super::{AuthEvent, Claims};

const LOGIN_FAILED: &str = "Login failed";

#[derive(Clone)]
pub struct SessionManager {
    client: ApiClient,
}

impl SessionManager {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    fn store(&self) -> &Arc<dyn CredentialStore> {
        self.client.credentials()
    }

    /// Log in and persist the session. Returns the stored identity.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserInfo, ApiError> {
        let request = LoginRequest {
            email: email.trim().to_string(),
            password: password.to_string(),
        };

        let response = match self.client.login(&request).await {
            Ok(response) => response,
            Err(ApiError::RequestFailed { message, .. }) => {
                return Err(ApiError::LoginFailed(message));
            }
            Err(e) => return Err(e),
        };

        let Some(access_token) = response.granted_token() else {
            let message = response
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| LOGIN_FAILED.to_string());
            return Err(ApiError::LoginFailed(message));
        };

        let user = UserInfo::from_email(&request.email);
        let store = self.store();
        store.store_tokens(access_token, response.rotated_refresh_token())?;
        store.store_user(&user)?;
        self.client.reset_refresh_state();

        info!(email = %user.email, "Logged in");
        self.client.emit(AuthEvent::LoggedIn {
            email: user.email.clone(),
        });
        Ok(user)
    }

    /// Log out. The server call is best-effort; local state is always cleared.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if self.store().access_token()?.is_some() {
            if let Err(e) = self.client.logout().await {
                warn!(error = %e, "Logout request failed");
            }
        }
        self.store().clear()?;
        info!("Logged out");
        self.client.emit(AuthEvent::LoggedOut);
        Ok(())
    }

    /// Restore a session saved by a previous run.
    ///
    /// With a stored refresh token the session is refreshed right away to
    /// extend it; if that fails the session is cleared. Returns whether the
    /// user is authenticated afterwards.
    pub async fn restore(&self) -> Result<bool, ApiError> {
        if !self.is_authenticated()? {
            return Ok(false);
        }

        if self.store().get(REFRESH_TOKEN_KEY)?.is_some() {
            match self.client.refresh_session().await {
                Ok(()) => info!("Restored session refreshed"),
                Err(e) => {
                    warn!(error = %e, "Could not refresh restored session");
                    return Ok(false);
                }
            }
        }

        self.is_authenticated()
    }

    /// True when both an access token and a user are stored.
    pub fn is_authenticated(&self) -> Result<bool, ApiError> {
        Ok(self.store().access_token()?.is_some() && self.store().user()?.is_some())
    }

    pub fn user(&self) -> Result<Option<UserInfo>, ApiError> {
        Ok(self.store().user()?)
    }

    /// Claims of the stored access token; empty when logged out.
    pub fn claims(&self) -> Result<Claims, ApiError> {
        Ok(self
            .store()
            .access_token()?
            .map(|token| Claims::from_token(&token))
            .unwrap_or_default())
    }

    pub fn has_role(&self, role: &str) -> Result<bool, ApiError> {
        Ok(self.claims()?.has_role(role))
    }

    pub fn has_permission(&self, permission: &str) -> Result<bool, ApiError> {
        Ok(self.claims()?.has_permission(permission))
    }

    pub fn bypass_headers(&self) -> Result<Vec<(&'static str, &'static str)>, ApiError> {
        Ok(self.claims()?.bypass_headers())
    }

    /// Start a registration; the backend sends a one-time code by email.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<Ack, ApiError> {
        let registration = Registration::new(name, email, password, confirm_password);
        self.client.register(&registration).await
    }

    pub async fn confirm_email(&self, email: &str, otp: &str) -> Result<Ack, ApiError> {
        let confirmation = EmailConfirmation {
            email: email.trim().to_lowercase(),
            otp: otp.trim().to_string(),
        };
        self.client.confirm_email(&confirmation).await
    }
}
