//! Authentication: credentials, token claims and session lifecycle.
//!
//! This module provides:
//! - `CredentialStore`: persistence for the access token, refresh token and user
//!   (memory, JSON file and OS keychain backends)
//! - `Claims`: roles and permissions decoded from the access token
//! - `SessionManager`: login, logout and startup restore
//! - `AuthEvents`: notifications such as "authentication lost"

pub mod claims;
pub mod credentials;
pub mod events;
pub mod session;

pub use claims::Claims;
pub use credentials::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
    RefreshCredentials, REFRESH_TOKEN_KEY, SESSION_KEYS, TOKEN_KEY, USER_KEY,
};
pub use events::{AuthEvent, AuthEvents, AuthLossReason};
pub use session::SessionManager;
