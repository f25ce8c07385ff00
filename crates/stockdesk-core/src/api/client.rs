//! API client for the inventory backend.
//!
//! `ApiClient::execute` attaches the stored access token to every request.
//! When the backend answers 401 it refreshes the token (one refresh per
//! expiry, shared by every concurrent caller) and retries the request once.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthEvent, AuthEvents, AuthLossReason, Claims, CredentialStore};
use crate::models::{RefreshRequest, TokenResponse};

use super::refresh::{RefreshCoordinator, RefreshOutcome};
use super::request::{ApiResponse, RequestBody, RequestDescriptor};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Token refresh endpoint.
pub const REFRESH_PATH: &str = "/api/Auth/Refresh";

/// Client behaviour that comes from configuration.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    /// Attach `X-Bypass-*` headers derived from the token's permissions.
    pub send_bypass_headers: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            send_bypass_headers: true,
        }
    }
}

struct ClientInner {
    http: Client,
    base_url: String,
    credentials: Arc<dyn CredentialStore>,
    refresh: RefreshCoordinator,
    events: AuthEvents,
    send_bypass_headers: bool,
}

impl ClientInner {
    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

/// API client for the inventory backend.
/// Clone is cheap - all state, including the refresh coordinator, is shared.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    /// Create a client with default options
    pub fn new(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, ApiError> {
        Self::with_options(base_url, credentials, ClientOptions::default())
    }

    pub fn with_options(
        base_url: impl Into<String>,
        credentials: Arc<dyn CredentialStore>,
        options: ClientOptions,
    ) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(options.request_timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                credentials,
                refresh: RefreshCoordinator::new(),
                events: AuthEvents::new(),
                send_bypass_headers: options.send_bypass_headers,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.credentials
    }

    /// Subscribe to session lifecycle events such as `AuthenticationLost`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        self.inner.events.emit(event);
    }

    /// Forget the outcome of the previous refresh, e.g. after a new login.
    pub(crate) fn reset_refresh_state(&self) {
        self.inner.refresh.reset();
    }

    // ===== Request execution =====

    /// Perform a request, refreshing the access token once on 401.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        self.execute_with_cancel(request, &CancellationToken::new()).await
    }

    /// Like `execute`, but abandons the call when `cancel` fires. A refresh
    /// that is already running keeps going for the other callers.
    pub async fn execute_with_cancel(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        let token = self.inner.credentials.access_token()?;
        let response = self.send(request, token.as_deref(), cancel).await?;

        if response.status() != StatusCode::UNAUTHORIZED || !request.refresh_on_unauthorized {
            return Self::read_response(response, cancel).await;
        }

        debug!(method = %request.method, path = %request.path, "Access token rejected, refreshing");
        let new_token = self.refresh_token(token.as_deref(), cancel).await?;

        // Retried response is final, even if it is another 401
        let retried = self.send(request, Some(&new_token), cancel).await?;
        Self::read_response(retried, cancel).await
    }

    /// Execute and decode the body. A no-content response yields `None`.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Option<T>, ApiError> {
        self.execute(request).await?.decode()
    }

    /// Refresh the access token now, joining a refresh already in flight.
    /// Used at startup to extend a restored session.
    pub async fn refresh_session(&self) -> Result<(), ApiError> {
        let token = self.inner.credentials.access_token()?;
        self.refresh_token(token.as_deref(), &CancellationToken::new())
            .await
            .map(|_| ())
    }

    async fn refresh_token(
        &self,
        rejected: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, ApiError> {
        let inner = Arc::clone(&self.inner);
        let refresh = self
            .inner
            .refresh
            .refresh_or_join(rejected, move || refresh_access_token(inner));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
            outcome = refresh => outcome,
        }
    }

    async fn send(
        &self,
        request: &RequestDescriptor,
        token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Response, ApiError> {
        let headers = self.request_headers(request, token)?;
        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), self.inner.url(&request.path))
            .headers(headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match request.body {
            None => builder,
            Some(RequestBody::Json(ref value)) => builder.json(value),
            Some(RequestBody::Bytes { ref data, .. }) => builder.body(data.clone()),
            Some(RequestBody::Multipart(ref form)) => builder.multipart(form.to_form()?),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
            result = builder.send() => result.map_err(|e| {
                warn!(path = %request.path, error = %e, "Request did not complete");
                ApiError::from(e)
            }),
        }
    }

    /// Headers for one attempt: client defaults, then the bearer token and
    /// bypass headers, then the caller's headers, which win on a clash.
    fn request_headers(
        &self,
        request: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        if let Some(RequestBody::Bytes { ref content_type, .. }) = request.body {
            let value = HeaderValue::from_str(content_type).map_err(|_| {
                ApiError::InvalidRequest(format!("invalid content type {:?}", content_type))
            })?;
            headers.insert(header::CONTENT_TYPE, value);
        }

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ApiError::InvalidRequest("access token is not a valid header value".to_string())
            })?;
            headers.insert(header::AUTHORIZATION, value);

            if self.inner.send_bypass_headers {
                for (name, value) in Claims::from_token(token).bypass_headers() {
                    headers.insert(
                        HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                            ApiError::InvalidRequest(format!("invalid header name {:?}", name))
                        })?,
                        HeaderValue::from_static(value),
                    );
                }
            }
        }

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ApiError::InvalidRequest(format!("invalid header name {:?}", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ApiError::InvalidRequest(format!("invalid value for header {}", name)))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }

    /// Read the body unless `cancel` fires first.
    async fn read_response(
        response: Response,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ApiError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
            result = Self::handle_response(response) => result,
        }
    }

    /// Map a response to its payload, or to `RequestFailed` for non-2xx.
    async fn handle_response(response: Response) -> Result<ApiResponse, ApiError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                body = %ApiError::truncate_body(&body),
                "Request failed"
            );
            return Err(ApiError::from_status(status, &body));
        }

        if status == StatusCode::NO_CONTENT {
            debug!("No content");
            return Ok(ApiResponse::Empty);
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(ApiResponse::Empty);
        }

        if is_json {
            serde_json::from_str(&text)
                .map(ApiResponse::Json)
                .map_err(|e| ApiError::InvalidResponse(format!("malformed JSON body: {}", e)))
        } else {
            Ok(ApiResponse::Text(text))
        }
    }
}

/// The refresh itself. Runs once per expiry inside the coordinator's task.
///
/// On success the new tokens are persisted before any waiter sees them. On
/// failure, a panic in the credential store included, the whole session is
/// cleared and `AuthenticationLost` is emitted,
/// once, no matter how many requests were waiting.
async fn refresh_access_token(inner: Arc<ClientInner>) -> RefreshOutcome {
    let outcome = AssertUnwindSafe(request_new_token(&inner))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            warn!("Token refresh panicked");
            Err(ApiError::AuthenticationRequired)
        });

    match outcome {
        Ok(_) => {
            info!("Access token refreshed");
            inner.events.emit(AuthEvent::TokenRefreshed);
        }
        Err(ref e) => {
            warn!(error = %e, "Token refresh failed, clearing session");
            if let Err(clear_err) = inner.credentials.clear() {
                warn!(error = %clear_err, "Failed to clear credentials");
            }
            let reason = match e {
                ApiError::RefreshUnavailable => AuthLossReason::RefreshUnavailable,
                _ => AuthLossReason::RefreshFailed,
            };
            inner.events.emit(AuthEvent::AuthenticationLost { reason });
        }
    }

    outcome
}

async fn request_new_token(inner: &ClientInner) -> RefreshOutcome {
    let credentials = inner
        .credentials
        .refresh_credentials()
        .map_err(|e| {
            warn!(error = %e, "Could not read refresh credentials");
            ApiError::RefreshUnavailable
        })?
        .ok_or(ApiError::RefreshUnavailable)?;

    let body = RefreshRequest {
        email: credentials.email,
        refresh_token: credentials.refresh_token,
    };

    let response = inner
        .http
        .post(inner.url(REFRESH_PATH))
        .header(header::ACCEPT, "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| {
            warn!(error = %e, "Refresh request did not complete");
            ApiError::AuthenticationRequired
        })?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %ApiError::truncate_body(&text), "Refresh rejected");
        return Err(ApiError::AuthenticationRequired);
    }

    let parsed: TokenResponse = response.json().await.map_err(|e| {
        warn!(error = %e, "Failed to parse refresh response");
        ApiError::AuthenticationRequired
    })?;

    let Some(access_token) = parsed.granted_token() else {
        warn!(message = ?parsed.message, "Refresh response did not grant a token");
        return Err(ApiError::AuthenticationRequired);
    };

    inner
        .credentials
        .store_tokens(access_token, parsed.rotated_refresh_token())
        .map_err(|e| {
            warn!(error = %e, "Failed to persist refreshed tokens");
            ApiError::AuthenticationRequired
        })?;

    Ok(access_token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentialStore;

    fn client(base_url: &str) -> ApiClient {
        ApiClient::new(base_url, Arc::new(MemoryCredentialStore::new())).expect("client should build")
    }

    #[test]
    fn test_url_joining() {
        let api = client("http://localhost:5000/");
        assert_eq!(api.base_url(), "http://localhost:5000");
        assert_eq!(api.inner.url("/api/Item"), "http://localhost:5000/api/Item");
        assert_eq!(api.inner.url("api/Item"), "http://localhost:5000/api/Item");
    }

    #[test]
    fn test_caller_headers_win() {
        let api = client("http://localhost");
        let request = RequestDescriptor::get("/api/Item")
            .header("Authorization", "Custom abc")
            .header("X-Trace", "1");
        let headers = api.request_headers(&request, Some("T1")).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Custom abc");
        assert_eq!(headers.get("x-trace").unwrap(), "1");
        assert_eq!(headers.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn test_no_token_means_no_authorization() {
        let api = client("http://localhost");
        let headers = api
            .request_headers(&RequestDescriptor::get("/api/Item"), None)
            .unwrap();
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn test_invalid_caller_header_is_rejected() {
        let api = client("http://localhost");
        let request = RequestDescriptor::get("/").header("bad header", "x");
        assert!(matches!(
            api.request_headers(&request, None),
            Err(ApiError::InvalidRequest(_))
        ));
    }
}
