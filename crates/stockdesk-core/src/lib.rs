//! Stockdesk core - a client for the inventory administration backend.
//!
//! The center of the crate is [`ApiClient`]: it attaches the stored bearer
//! token to every request and recovers from an expired access token by
//! refreshing it (one refresh per expiry, shared by all concurrent callers)
//! and retrying the request once. When the session cannot be recovered it
//! clears the stored credentials and emits [`AuthEvent::AuthenticationLost`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use stockdesk_core::{ApiClient, MemoryCredentialStore, PageRequest, SessionManager};
//!
//! let client = ApiClient::new("http://localhost:5000", Arc::new(MemoryCredentialStore::new()))?;
//! let session = SessionManager::new(client.clone());
//! session.login("a@b.com", "secret").await?;
//! let items = client.list_items(&PageRequest::default()).await?;
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiResponse, ClientOptions, RequestDescriptor};
pub use auth::{
    AuthEvent, AuthLossReason, Claims, CredentialStore, FileCredentialStore,
    KeyringCredentialStore, MemoryCredentialStore, SessionManager,
};
pub use config::Config;
pub use models::{PageRequest, Paged};
