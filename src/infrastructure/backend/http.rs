//! reqwest-backed backend client
//!
//! Each named target has a base URL and its own timeout. A request that
//! exceeds the timeout surfaces as `BackendError::Timeout`; any other
//! transport failure as `BackendError::Unreachable`. Backend status codes,
//! 5xx included, are passed through untouched.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::header::{self, HeaderMap, HeaderName};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Backend, BackendError, BackendRequest, BackendResponse, DomainError};
use crate::infrastructure::observability::record_backend_call;

const HOP_BY_HOP: [HeaderName; 5] = [
    header::CONNECTION,
    header::HOST,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

// Connection-scoped response headers; Content-Type travels separately
const RESPONSE_SKIP: [HeaderName; 8] = [
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::CONTENT_TYPE,
    header::PROXY_AUTHENTICATE,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn default_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendTarget {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl BackendTarget {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path_and_query)
    }
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    targets: HashMap<String, BackendTarget>,
}

impl HttpBackend {
    pub fn new(targets: HashMap<String, BackendTarget>) -> Result<Self, DomainError> {
        for (id, target) in &targets {
            reqwest::Url::parse(&target.base_url).map_err(|e| {
                DomainError::configuration(format!(
                    "Backend '{}' has an invalid base URL '{}': {}",
                    id, target.base_url, e
                ))
            })?;
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DomainError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, targets })
    }

    pub fn targets(&self) -> impl Iterator<Item = (&str, &BackendTarget)> {
        self.targets.iter().map(|(id, t)| (id.as_str(), t))
    }

    fn classify(target: &str, error: reqwest::Error) -> BackendError {
        if error.is_timeout() {
            BackendError::timeout(target)
        } else {
            BackendError::unreachable(target, error.to_string())
        }
    }
}

fn returnable_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !RESPONSE_SKIP.contains(name) && name.as_str() != "keep-alive")
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = headers.clone();
    for name in &HOP_BY_HOP {
        forwarded.remove(name);
    }
    forwarded
}

#[async_trait]
impl Backend for HttpBackend {
    async fn forward(
        &self,
        target: &str,
        request: BackendRequest,
    ) -> Result<BackendResponse, BackendError> {
        let Some(config) = self.targets.get(target) else {
            return Err(BackendError::unreachable(target, "no such backend target"));
        };

        let url = config.url_for(&request.path_and_query());
        let started = Instant::now();
        debug!(backend = %target, method = %request.method, url = %url, "Forwarding request");

        let result = async {
            let response = self
                .client
                .request(request.method.clone(), &url)
                .headers(forwardable_headers(&request.headers))
                .body(request.body)
                .timeout(config.timeout())
                .send()
                .await?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let headers = returnable_headers(response.headers());
            let body = response.bytes().await?;

            Ok::<_, reqwest::Error>(BackendResponse {
                status,
                content_type,
                headers,
                body,
            })
        }
        .await;

        match result {
            Ok(response) => {
                record_backend_call(target, Some(response.status), started.elapsed());
                Ok(response)
            }
            Err(e) => {
                record_backend_call(target, None, started.elapsed());
                let error = Self::classify(target, e);
                warn!(backend = %target, url = %url, error = %error, "Backend call failed");
                Err(error)
            }
        }
    }

    fn has_target(&self, target: &str) -> bool {
        self.targets.contains_key(target)
    }
}
