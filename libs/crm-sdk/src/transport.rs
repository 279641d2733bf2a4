//! Transport seam between the engines and the remote service.
//!
//! The engines only build [`RemoteRequest`]s and read [`RemoteResponse`]s;
//! URL layout, authentication and connection handling belong to the
//! transport implementation.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use uuid::Uuid;

/// One request against an entity set.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteRequest {
    pub method: Method,
    /// Entity set name, e.g. `contacts`.
    pub resource: String,
    /// Single-entity address: `{resource}({key})`.
    pub key: Option<Uuid>,
    /// Query parameters, already in wire form (`fetchXml`, `$select`).
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl RemoteRequest {
    #[must_use]
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            method,
            resource: resource.into(),
            key: None,
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_key(mut self, key: Uuid) -> Self {
        self.key = Some(key);
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// First query parameter named `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Relative path: `contacts` or `contacts(00000000-...)`.
    #[must_use]
    pub fn path(&self) -> String {
        match self.key {
            Some(key) => format!("{}({key})", self.resource),
            None => self.resource.clone(),
        }
    }
}

/// A fully read response. Returned for every HTTP status.
#[derive(Clone, Debug)]
pub struct RemoteResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RemoteResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// JSON response with status 200.
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(StatusCode::OK, value.to_string())
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    /// [`TransportError::Payload`] when the body is not valid JSON.
    pub fn json_body(&self) -> Result<serde_json::Value, TransportError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Map a non-2xx answer to [`TransportError::Status`], using the Web
    /// API's `error.message` when present.
    ///
    /// # Errors
    /// Returns the status error for non-success codes.
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let message = serde_json::from_slice::<serde_json::Value>(&self.body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_owned))
            .unwrap_or_else(|| String::from_utf8_lossy(&self.body).into_owned());
        Err(TransportError::Status {
            status: self.status,
            message,
        })
    }
}

/// Sends requests to the remote service.
///
/// Implementations must be safe for concurrent use; the engines share one
/// transport across every clone of a [`Context`](crate::Context).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_path() {
        let id = Uuid::nil();
        let req = RemoteRequest::new(Method::DELETE, "contacts").with_key(id);
        assert_eq!(
            req.path(),
            "contacts(00000000-0000-0000-0000-000000000000)"
        );
        assert_eq!(RemoteRequest::new(Method::GET, "contacts").path(), "contacts");
    }

    #[test]
    fn test_query_param_lookup() {
        let req = RemoteRequest::new(Method::GET, "contacts")
            .with_query("fetchXml", "<fetch/>")
            .with_query("$select", "fullname");
        assert_eq!(req.query_param("fetchXml"), Some("<fetch/>"));
        assert_eq!(req.query_param("$top"), None);
    }

    #[test]
    fn test_error_for_status_prefers_service_message() {
        let body = json!({"error": {"code": "0x80040217", "message": "contact does not exist"}});
        let resp = RemoteResponse::new(StatusCode::NOT_FOUND, body.to_string());
        let err = resp.error_for_status().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Status { status, ref message }
                if status == StatusCode::NOT_FOUND && message == "contact does not exist"
        ));
    }

    #[test]
    fn test_error_for_status_falls_back_to_body() {
        let resp = RemoteResponse::new(StatusCode::BAD_GATEWAY, "upstream down");
        let err = resp.error_for_status().unwrap_err();
        assert_eq!(err.to_string(), "remote returned 502 Bad Gateway: upstream down");
    }
}
