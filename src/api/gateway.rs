//! Catch-all handler that feeds every unmatched request through the gateway

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::BackendRequest;
use crate::infrastructure::services::{GatewayOutcome, QuotaInfo, USER_TIER_HEADER};

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const CACHE_STATUS: &str = "x-cache";

pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut request = BackendRequest::new(method, uri.path())
        .with_headers(headers)
        .with_body(body);
    if let Some(query) = uri.query() {
        request = request.with_query(query);
    }

    render(state.gateway.handle(request).await)
}

fn render(outcome: GatewayOutcome) -> Response {
    let mut response = match outcome.result {
        Ok(backend) => {
            let status = StatusCode::from_u16(backend.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut response = Response::new(Body::from(backend.body));
            *response.status_mut() = status;

            if let Some(value) = backend
                .content_type
                .as_deref()
                .and_then(|ct| HeaderValue::from_str(ct).ok())
            {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            for (name, value) in &backend.headers {
                if let (Ok(name), Ok(value)) =
                    (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value))
                {
                    response.headers_mut().append(name, value);
                }
            }
            response
        }
        Err(e) => ApiError::from(e).into_response(),
    };

    let headers = response.headers_mut();
    if let Some(quota) = &outcome.quota {
        insert_quota_headers(headers, quota);
    }
    if let Some(status) = outcome.cache {
        headers.insert(
            HeaderName::from_static(CACHE_STATUS),
            HeaderValue::from_static(status.as_str()),
        );
    }

    response
}

fn insert_quota_headers(headers: &mut HeaderMap, quota: &QuotaInfo) {
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_LIMIT),
        HeaderValue::from(quota.limit),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_REMAINING),
        HeaderValue::from(quota.remaining),
    );
    headers.insert(
        HeaderName::from_static(RATE_LIMIT_RESET),
        HeaderValue::from(quota.reset_in_seconds),
    );
    if let Ok(tier) = HeaderValue::from_str(&quota.tier) {
        headers.insert(HeaderName::from_static(USER_TIER_HEADER), tier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BackendResponse, GatewayError, RateLimitError, RoutingError};
    use crate::infrastructure::cache::CacheStatus;

    fn quota() -> QuotaInfo {
        QuotaInfo {
            tier: "basic".to_string(),
            limit: 100,
            remaining: 0,
            reset_in_seconds: 42,
            retry_after: Some(3),
        }
    }

    #[test]
    fn test_render_backend_response() {
        let outcome = GatewayOutcome {
            result: Ok(BackendResponse::json(201, &serde_json::json!({"id": 1}))),
            quota: Some(quota()),
            cache: Some(CacheStatus::Miss),
        };

        let response = render(outcome);

        assert_eq!(response.status(), StatusCode::CREATED);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[RATE_LIMIT_LIMIT], "100");
        assert_eq!(headers[RATE_LIMIT_REMAINING], "0");
        assert_eq!(headers[RATE_LIMIT_RESET], "42");
        assert_eq!(headers[USER_TIER_HEADER], "basic");
        assert_eq!(headers[CACHE_STATUS], "MISS");
        assert!(headers.get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_render_keeps_upstream_headers() {
        let backend = BackendResponse::new(201, "")
            .with_header("location", "/api/v1/entities/7")
            .with_header("etag", "\"v1\"")
            .with_header("vary", "accept")
            .with_header("vary", "accept-encoding");
        let outcome = GatewayOutcome {
            result: Ok(backend),
            quota: Some(quota()),
            cache: None,
        };

        let response = render(outcome);

        let headers = response.headers();
        assert_eq!(headers[header::LOCATION], "/api/v1/entities/7");
        assert_eq!(headers[header::ETAG], "\"v1\"");
        assert_eq!(headers.get_all(header::VARY).iter().count(), 2);
        assert_eq!(headers[RATE_LIMIT_LIMIT], "100");
    }

    #[test]
    fn test_render_rate_limited() {
        let outcome = GatewayOutcome {
            result: Err(GatewayError::from(RateLimitError::QuotaExceeded { retry_after: 3 })),
            quota: Some(quota()),
            cache: None,
        };

        let response = render(outcome);

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
        assert_eq!(response.headers()[RATE_LIMIT_REMAINING], "0");
        assert!(response.headers().get(CACHE_STATUS).is_none());
    }

    #[test]
    fn test_render_error_without_quota() {
        let outcome = GatewayOutcome {
            result: Err(GatewayError::from(RoutingError::NoMatch)),
            quota: None,
            cache: None,
        };

        let response = render(outcome);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get(RATE_LIMIT_LIMIT).is_none());
        assert!(response.headers().get(USER_TIER_HEADER).is_none());
    }
}
