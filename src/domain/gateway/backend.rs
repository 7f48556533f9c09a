//! Backend forwarding contract

use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use super::error::BackendError;

/// A request as handed to a backend target
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Path plus query string, as it should appear on the wire
    pub fn path_and_query(&self) -> String {
        match self.query.as_deref() {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }
}

/// The result of a backend call
///
/// Serializable so it can be stored in the cache as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// End-to-end headers other than Content-Type, lowercase names, in
    /// upstream order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    #[serde(with = "base64_body")]
    pub body: Bytes,
}

impl BackendResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: None,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &serde_json::Value) -> Self {
        Self {
            status,
            content_type: Some("application/json".to_string()),
            headers: Vec::new(),
            body: Bytes::from(value.to_string()),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into().to_ascii_lowercase(), value.into()));
        self
    }

    /// First value of a header, by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Successful and not tied to one caller's session
    pub fn is_cacheable(&self) -> bool {
        self.is_success() && self.header("set-cookie").is_none()
    }
}

/// A callable backend. The gateway never interprets what it returns.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// Forward a request to the named target
    async fn forward(
        &self,
        target: &str,
        request: BackendRequest,
    ) -> Result<BackendResponse, BackendError>;

    /// Whether the named target is configured
    fn has_target(&self, target: &str) -> bool;
}

mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub mod mock {
    //! Scripted backend for pipeline tests

    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    pub struct MockBackend {
        response: Mutex<Result<BackendResponse, BackendError>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        last_request: Mutex<Option<BackendRequest>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self {
                response: Mutex::new(Ok(BackendResponse::json(
                    200,
                    &serde_json::json!({"ok": true}),
                ))),
                delay: None,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        pub fn with_response(self, response: BackendResponse) -> Self {
            *self.response.lock() = Ok(response);
            self
        }

        pub fn with_error(self, error: BackendError) -> Self {
            *self.response.lock() = Err(error);
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_request(&self) -> Option<BackendRequest> {
            self.last_request.lock().clone()
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn forward(
            &self,
            _target: &str,
            request: BackendRequest,
        ) -> Result<BackendResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock() = Some(request);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            self.response.lock().clone()
        }

        fn has_target(&self, _target: &str) -> bool {
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_query() {
        let req = BackendRequest::new(Method::GET, "/api/v1/entities/1");
        assert_eq!(req.path_and_query(), "/api/v1/entities/1");

        let req = req.with_query("page=2");
        assert_eq!(req.path_and_query(), "/api/v1/entities/1?page=2");
    }

    #[test]
    fn test_response_serializes_body_as_base64() {
        let resp = BackendResponse::new(200, &b"\x00binary"[..]).with_content_type("application/octet-stream");
        let json = serde_json::to_string(&resp).unwrap();
        let back: BackendResponse = serde_json::from_str(&json).unwrap();

        assert_eq!(back, resp);
        assert!(!json.contains("binary"));
    }

    #[test]
    fn test_headers_survive_cache_encoding() {
        let resp = BackendResponse::new(201, "")
            .with_header("Location", "/api/v1/entities/7")
            .with_header("etag", "\"v1\"");
        let back: BackendResponse = serde_json::from_str(&serde_json::to_string(&resp).unwrap()).unwrap();

        assert_eq!(back.header("location"), Some("/api/v1/entities/7"));
        assert_eq!(back.header("ETag"), Some("\"v1\""));
    }

    #[test]
    fn test_session_responses_are_not_cacheable() {
        assert!(BackendResponse::new(200, "").is_cacheable());
        assert!(!BackendResponse::new(200, "").with_header("Set-Cookie", "sid=1").is_cacheable());
        assert!(!BackendResponse::new(503, "").is_cacheable());
    }

    #[test]
    fn test_is_success() {
        assert!(BackendResponse::new(204, "").is_success());
        assert!(!BackendResponse::new(404, "").is_success());
        assert!(!BackendResponse::new(500, "").is_success());
    }
}
