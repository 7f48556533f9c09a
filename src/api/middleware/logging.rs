//! Access log middleware
//!
//! Emits one line per request once the response is known. Credential
//! headers are never logged. Spans come from `TraceLayer`; this middleware
//! must not open its own.

use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{info, warn};

pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = extract_path(&request);
    let request_id = extract_request_id(request.headers());
    let key_presented = presents_api_key(request.headers());

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    let tier = header_str(response.headers(), "x-user-tier").unwrap_or("-");
    let cache = header_str(response.headers(), "x-cache").unwrap_or("-");

    if response.status().is_server_error() {
        warn!(
            method = %method,
            path = %path,
            status,
            duration_ms,
            tier,
            cache,
            request_id = %request_id,
            "Request failed"
        );
    } else {
        info!(
            method = %method,
            path = %path,
            status,
            duration_ms,
            tier,
            cache,
            key_presented,
            request_id = %request_id,
            "Request completed"
        );
    }

    response
}

fn extract_path(request: &Request<Body>) -> String {
    request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

fn extract_request_id(headers: &HeaderMap) -> String {
    header_str(headers, "x-request-id")
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn presents_api_key(headers: &HeaderMap) -> bool {
    headers.contains_key("authorization") || headers.contains_key("x-api-key")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_id_is_reused_or_generated() {
        let mut headers = HeaderMap::new();
        let generated = extract_request_id(&headers);
        assert!(uuid::Uuid::parse_str(&generated).is_ok());

        headers.insert("x-request-id", HeaderValue::from_static("req-123"));
        assert_eq!(extract_request_id(&headers), "req-123");
    }

    #[test]
    fn test_presents_api_key() {
        let mut headers = HeaderMap::new();
        assert!(!presents_api_key(&headers));

        headers.insert("x-api-key", HeaderValue::from_static("sk_test_x"));
        assert!(presents_api_key(&headers));
    }
}
