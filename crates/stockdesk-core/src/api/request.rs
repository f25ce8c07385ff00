//! Request descriptors and response payloads for `ApiClient::execute`.

use std::collections::BTreeMap;

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::ApiError;

/// Body of an outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Bytes { data: Vec<u8>, content_type: String },
    Multipart(MultipartForm),
}

/// Multipart form with text fields and at most one file attachment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub file: Option<FilePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, file: FilePart) -> Self {
        self.file = Some(file);
        self
    }

    /// Build a fresh reqwest form. Forms are consumed on send, so a retried
    /// request needs a new one.
    pub(crate) fn to_form(&self) -> Result<Form, ApiError> {
        let mut form = Form::new();
        for (name, value) in &self.fields {
            form = form.text(name.clone(), value.clone());
        }
        if let Some(ref file) = self.file {
            let mut part = Part::bytes(file.data.clone()).file_name(file.file_name.clone());
            if let Some(ref content_type) = file.content_type {
                part = part.mime_str(content_type).map_err(|e| {
                    ApiError::InvalidRequest(format!("bad content type {:?}: {}", content_type, e))
                })?;
            }
            form = form.part(file.field.clone(), part);
        }
        Ok(form)
    }
}

/// A single call against the backend. Built per call, cloned for the retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    /// When false, a 401 is reported as `RequestFailed` instead of
    /// triggering a token refresh. Used by the anonymous auth endpoints.
    pub refresh_on_unauthorized: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            refresh_on_unauthorized: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    /// Caller headers win over headers the client attaches itself.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("failed to serialize body: {}", e)))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn bytes(mut self, data: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Bytes {
            data,
            content_type: content_type.into(),
        });
        self
    }

    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = Some(RequestBody::Multipart(form));
        self
    }

    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }
}

/// Successful response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// No-content status or empty body.
    Empty,
    Json(Value),
    /// Body whose content type was not JSON, returned unparsed.
    Text(String),
}

impl ApiResponse {
    pub fn is_empty(&self) -> bool {
        matches!(self, ApiResponse::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Decode into a typed result. `Empty` maps to `None`; text bodies are
    /// decoded as JSON when they happen to contain it.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Option<T>, ApiError> {
        match self {
            ApiResponse::Empty => Ok(None),
            ApiResponse::Json(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| ApiError::InvalidResponse(e.to_string())),
            ApiResponse::Text(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|_| {
                    ApiError::InvalidResponse(format!(
                        "expected JSON, got text: {}",
                        ApiError::truncate_body(&text)
                    ))
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Thing {
        id: i64,
    }

    #[test]
    fn test_builder_collects_parts() {
        let request = RequestDescriptor::get("/api/Item")
            .query("pageIndex", 2)
            .query("pageSize", 6)
            .header("X-Trace", "abc");

        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.query,
            vec![
                ("pageIndex".to_string(), "2".to_string()),
                ("pageSize".to_string(), "6".to_string())
            ]
        );
        assert_eq!(request.headers.get("X-Trace").map(String::as_str), Some("abc"));
        assert!(request.refresh_on_unauthorized);
        assert!(!request.clone().without_refresh().refresh_on_unauthorized);
    }

    #[test]
    fn test_decode_variants() {
        assert_eq!(ApiResponse::Empty.decode::<Thing>().unwrap(), None);
        assert_eq!(
            ApiResponse::Json(serde_json::json!({"id": 5})).decode::<Thing>().unwrap(),
            Some(Thing { id: 5 })
        );
        assert_eq!(
            ApiResponse::Text(r#"{"id": 7}"#.to_string()).decode::<Thing>().unwrap(),
            Some(Thing { id: 7 })
        );
        assert!(matches!(
            ApiResponse::Text("plain".to_string()).decode::<Thing>(),
            Err(ApiError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_multipart_rejects_bad_mime() {
        let form = MultipartForm::new().text("itemName", "Drill").file(FilePart {
            field: "file".to_string(),
            file_name: "drill.png".to_string(),
            content_type: Some("not a mime".to_string()),
            data: vec![1, 2, 3],
        });
        assert!(matches!(form.to_form(), Err(ApiError::InvalidRequest(_))));
    }
}
