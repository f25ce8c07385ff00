//! Access token claim decoding.
//!
//! Tokens are decoded without signature verification. The claims only drive
//! client-side affordances (menus, bypass headers); the backend remains the
//! authority on what a token may do.

use std::collections::BTreeSet;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// base64url that tolerates padded and unpadded segments.
const JWT_SEGMENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const ROLE_CLAIMS: [&str; 3] = [
    "role",
    "roles",
    "http://schemas.microsoft.com/ws/2008/06/identity/claims/role",
];

const PERMISSION_CLAIMS: [&str; 6] = [
    "permission",
    "permissions",
    "perms",
    "CanAdd",
    "CanEdit",
    "CanDelete",
];

/// Permissions that map to `X-Bypass-*` request headers.
const BYPASS_HEADERS: [(&str, &str); 3] = [
    ("CanAdd", "X-Bypass-CanAdd"),
    ("CanEdit", "X-Bypass-CanEdit"),
    ("CanDelete", "X-Bypass-CanDelete"),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Claims {
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
    pub raw: Map<String, Value>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Claims {
    /// Claims of a token. Anything undecodable yields empty claims.
    pub fn from_token(token: &str) -> Self {
        match decode_payload(token) {
            Some(payload) => Self::from_payload(payload),
            None => Self::default(),
        }
    }

    pub fn from_payload(payload: Map<String, Value>) -> Self {
        let mut roles = BTreeSet::new();
        let mut permissions = BTreeSet::new();

        for key in ROLE_CLAIMS {
            collect_values(payload.get(key), &mut roles);
        }
        for key in PERMISSION_CLAIMS {
            collect_values(payload.get(key), &mut permissions);
        }

        // "Can Add" is also granted as "CanAdd"
        if let Some(Value::Array(entries)) = payload.get("permission") {
            for entry in entries {
                if let Value::String(perm) = entry {
                    permissions.insert(perm.split_whitespace().collect::<String>());
                }
            }
        }

        let expires_at = payload
            .get("exp")
            .and_then(Value::as_i64)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        Self {
            roles,
            permissions,
            raw: payload,
            expires_at,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        !role.is_empty() && self.roles.contains(role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        !permission.is_empty() && self.permissions.contains(permission)
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Utc::now() >= exp).unwrap_or(false)
    }

    /// `X-Bypass-*` headers for the permissions this token claims.
    /// Backend-testing affordance only; the server must not trust them.
    pub fn bypass_headers(&self) -> Vec<(&'static str, &'static str)> {
        BYPASS_HEADERS
            .iter()
            .filter(|(permission, _)| self.permissions.contains(*permission))
            .map(|(_, header)| (*header, "true"))
            .collect()
    }
}

/// Decode the payload segment of a three-segment JWT.
pub fn decode_payload(token: &str) -> Option<Map<String, Value>> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return None;
    }

    let bytes = match JWT_SEGMENT.decode(segments[1]) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Token payload is not base64url");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Token payload is not a JSON object");
            None
        }
    }
}

fn collect_values(value: Option<&Value>, target: &mut BTreeSet<String>) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(text) = scalar_text(item) {
                    target.insert(text);
                }
            }
        }
        Some(other) => {
            target.insert(value_text(other));
        }
    }
}

// Array entries that are empty, null, false or 0 are skipped
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(value_text(other)),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_with(payload: Value) -> String {
        let header = JWT_SEGMENT.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = JWT_SEGMENT.encode(payload.to_string());
        format!("{}.{}.signature", header, body)
    }

    #[test]
    fn test_roles_from_all_claim_names() {
        let token = token_with(json!({
            "role": "Admin",
            "roles": ["Manager", ""],
            "http://schemas.microsoft.com/ws/2008/06/identity/claims/role": ["Auditor"],
        }));
        let claims = Claims::from_token(&token);
        let roles: Vec<&str> = claims.roles.iter().map(String::as_str).collect();
        assert_eq!(roles, vec!["Admin", "Auditor", "Manager"]);
        assert!(claims.has_role("Admin"));
        assert!(!claims.has_role(""));
    }

    #[test]
    fn test_spaced_permissions_are_normalized() {
        let token = token_with(json!({
            "permission": ["Can Add", "Can Delete"],
            "CanEdit": "CanEdit",
        }));
        let claims = Claims::from_token(&token);
        assert!(claims.has_permission("Can Add"));
        assert!(claims.has_permission("CanAdd"));
        assert!(claims.has_permission("CanDelete"));
        assert!(claims.has_permission("CanEdit"));
        assert!(!claims.has_permission(""));
        assert_eq!(
            claims.bypass_headers(),
            vec![
                ("X-Bypass-CanAdd", "true"),
                ("X-Bypass-CanEdit", "true"),
                ("X-Bypass-CanDelete", "true"),
            ]
        );
    }

    #[test]
    fn test_expiry_claim() {
        let claims = Claims::from_token(&token_with(json!({ "exp": 1_000 })));
        assert_eq!(claims.expires_at.map(|e| e.timestamp()), Some(1_000));
        assert!(claims.is_expired());

        let far = Utc::now().timestamp() + 3_600;
        assert!(!Claims::from_token(&token_with(json!({ "exp": far }))).is_expired());
    }

    #[test]
    fn test_padded_segments_decode() {
        let header = base64::engine::general_purpose::URL_SAFE.encode(b"{}");
        let body = base64::engine::general_purpose::URL_SAFE.encode(br#"{"role":"Admin"}"#);
        let claims = Claims::from_token(&format!("{}.{}.sig", header, body));
        assert!(claims.has_role("Admin"));
    }

    #[test]
    fn test_malformed_tokens_yield_empty_claims() {
        assert_eq!(Claims::from_token(""), Claims::default());
        assert_eq!(Claims::from_token("opaque-token"), Claims::default());
        assert_eq!(Claims::from_token("a.b.c.d"), Claims::default());
        assert_eq!(Claims::from_token("a.!!!.c"), Claims::default());
        let array_payload = JWT_SEGMENT.encode("[1,2]");
        assert_eq!(Claims::from_token(&format!("a.{}.c", array_payload)), Claims::default());
        assert!(Claims::default().bypass_headers().is_empty());
    }
}
