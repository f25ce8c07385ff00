//! REST API client module for the inventory backend.
//!
//! This module provides the `ApiClient` for talking to the backend's item,
//! category, employee and auth endpoints.
//!
//! The API uses JWT bearer tokens. Expired access tokens are refreshed with
//! the stored refresh token, once per expiry, and the failed request is
//! retried a single time.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod refresh;
pub mod request;

pub use client::{ApiClient, ClientOptions};
pub use error::ApiError;
pub use request::{ApiResponse, FilePart, MultipartForm, RequestBody, RequestDescriptor};
