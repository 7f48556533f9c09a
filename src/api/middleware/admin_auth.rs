//! Admin authentication
//!
//! The admin API is guarded by one shared token presented in
//! `X-Admin-Token`. Gateway API keys never grant admin access.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{debug, warn};

use crate::api::state::AppState;
use crate::api::types::ApiError;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Extractor that rejects requests without the configured admin token
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.admin_token.as_deref() else {
            return Err(ApiError::not_found("Admin API is disabled"));
        };

        let presented = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());

        match presented {
            Some(token) if tokens_match(token, expected) => {
                debug!(path = %parts.uri.path(), "Admin request authorized");
                Ok(RequireAdmin)
            }
            Some(_) => {
                warn!(path = %parts.uri.path(), "Admin request with wrong token");
                Err(ApiError::forbidden("Invalid admin token"))
            }
            None => Err(ApiError::unauthorized(
                "Admin access required. Provide 'X-Admin-Token: <token>'",
            )),
        }
    }
}

/// Length-independent comparison over the full expected token
fn tokens_match(presented: &str, expected: &str) -> bool {
    let presented = presented.as_bytes();
    let expected = expected.as_bytes();

    let mut diff = presented.len() ^ expected.len();
    for (i, b) in expected.iter().enumerate() {
        diff |= (*b ^ presented.get(i).copied().unwrap_or(0)) as usize;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::state::test_support::{test_app, ADMIN_TOKEN};
    use crate::domain::gateway::mock::MockBackend;
    use axum::http::{Request, StatusCode};
    use tokio_test::{assert_err, assert_ok, block_on};

    fn parts(token: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/admin/keys");
        if let Some(token) = token {
            builder = builder.header(ADMIN_TOKEN_HEADER, token);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_extractor_accepts_configured_token() {
        let app = test_app(MockBackend::new());
        let mut parts = parts(Some(ADMIN_TOKEN));

        assert_ok!(block_on(RequireAdmin::from_request_parts(&mut parts, &app.state)));
    }

    #[test]
    fn test_extractor_rejections() {
        let app = test_app(MockBackend::new());

        let err = assert_err!(block_on(RequireAdmin::from_request_parts(
            &mut parts(None),
            &app.state
        )));
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = assert_err!(block_on(RequireAdmin::from_request_parts(
            &mut parts(Some("nope")),
            &app.state
        )));
        assert_eq!(err.status, StatusCode::FORBIDDEN);

        let mut state = app.state.clone();
        state.admin_token = None;
        let err = assert_err!(block_on(RequireAdmin::from_request_parts(
            &mut parts(Some(ADMIN_TOKEN)),
            &state
        )));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cre", "s3cret"));
        assert!(!tokens_match("s3cret!", "s3cret"));
        assert!(!tokens_match("", "s3cret"));
        assert!(!tokens_match("S3CRET", "s3cret"));
    }
}
