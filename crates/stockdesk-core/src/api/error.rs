use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the API client.
///
/// Clone is required because a single token refresh outcome is shared by
/// every request that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("No refresh credentials available - please log in again")]
    RefreshUnavailable,

    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Credential store error: {0}")]
    Credentials(String),

    #[error("{0}")]
    LoginFailed(String),
}

/// Maximum length for error response bodies in log output
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build a `RequestFailed` from a non-success status and its raw body.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ApiError::RequestFailed {
            status: status.as_u16(),
            message: error_message(status, body),
        }
    }

    /// Errors after which the caller must send the user back to a login flow.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ApiError::AuthenticationRequired | ApiError::RefreshUnavailable
        )
    }

    /// HTTP status for `RequestFailed`, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Credentials(format!("{:#}", err))
    }
}

/// Normalize a backend error body into a single human-readable message.
///
/// Field-validation maps (`errors`) win over `message`, `title` and `error`.
/// Anything unparseable falls back to the status line.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let fallback = format!("HTTP error! status: {}", status.as_u16());

    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return fallback;
    };

    match value {
        Value::Object(map) => {
            if let Some(Value::Object(errors)) = map.get("errors") {
                let messages: Vec<String> = errors.values().flat_map(flatten_messages).collect();
                return if messages.is_empty() {
                    fallback
                } else {
                    messages.join("; ")
                };
            }

            ["message", "title", "error"]
                .iter()
                .find_map(|key| map.get(*key).and_then(message_text))
                .unwrap_or(fallback)
        }
        Value::String(s) if !s.is_empty() => s,
        _ => fallback,
    }
}

/// Text for a truthy JSON value; `None` for null, false, 0 and "".
fn message_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

// One level of flattening: `{"Name": ["a", "b"], "Qty": "c"}` -> a, b, c
fn flatten_messages(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(message_text).collect(),
        other => message_text(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_joined() {
        let body = r#"{"title":"One or more validation errors occurred.","errors":{"ItemName":["The ItemName field is required."],"Quantity":["Must be positive.",""]}}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, body),
            "The ItemName field is required.; Must be positive."
        );
    }

    #[test]
    fn test_empty_errors_map_falls_back_to_status() {
        let body = r#"{"errors":{},"message":"ignored"}"#;
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, body),
            "HTTP error! status: 400"
        );
    }

    #[test]
    fn test_message_title_error_precedence() {
        let status = StatusCode::CONFLICT;
        assert_eq!(
            error_message(status, r#"{"message":"Category exists","title":"Conflict"}"#),
            "Category exists"
        );
        assert_eq!(error_message(status, r#"{"title":"Conflict","error":"x"}"#), "Conflict");
        assert_eq!(error_message(status, r#"{"error":"Duplicate"}"#), "Duplicate");
        assert_eq!(error_message(status, r#"{"message":""}"#), "HTTP error! status: 409");
    }

    #[test]
    fn test_string_and_unparseable_bodies() {
        assert_eq!(
            error_message(StatusCode::FORBIDDEN, r#""Not allowed""#),
            "Not allowed"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>Bad Gateway</html>"),
            "HTTP error! status: 502"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "HTTP error! status: 500"
        );
    }

    #[test]
    fn test_truncate_body() {
        let short = "short body";
        assert_eq!(ApiError::truncate_body(short), short);

        let long = "é".repeat(400);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.ends_with("(truncated, 800 total bytes)"));
    }

    #[test]
    fn test_auth_failure_classification() {
        assert!(ApiError::AuthenticationRequired.is_auth_failure());
        assert!(ApiError::RefreshUnavailable.is_auth_failure());
        let failed = ApiError::from_status(StatusCode::NOT_FOUND, "{}");
        assert!(!failed.is_auth_failure());
        assert_eq!(failed.status(), Some(404));
        assert_eq!(failed.to_string(), "HTTP error! status: 404");
    }
}
