//! Gateway error taxonomy
//!
//! Each family maps to one HTTP status and carries a stable machine-readable
//! code for the response body.

use thiserror::Error;

/// Authentication failures (401)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("API key required. Provide via 'Authorization: Bearer <key>' or 'X-API-Key: <key>'")]
    MissingKey,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("API key has been revoked")]
    Revoked,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingKey => "MISSING_KEY",
            Self::InvalidKey => "INVALID_KEY",
            Self::Revoked => "REVOKED",
        }
    }
}

/// Admission control failures (429)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    QuotaExceeded { retry_after: u64 },
}

impl RateLimitError {
    pub fn code(&self) -> &'static str {
        "QUOTA_EXCEEDED"
    }

    pub fn retry_after(&self) -> u64 {
        match self {
            Self::QuotaExceeded { retry_after } => *retry_after,
        }
    }
}

/// Route resolution failures (404)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("No route matches the request")]
    NoMatch,
}

impl RoutingError {
    pub fn code(&self) -> &'static str {
        "NO_MATCH"
    }
}

/// Backend forwarding failures (502 / 504)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Backend '{target}' is unreachable: {message}")]
    Unreachable { target: String, message: String },

    #[error("Backend '{target}' timed out")]
    Timeout { target: String },
}

impl BackendError {
    pub fn unreachable(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unreachable {
            target: target.into(),
            message: message.into(),
        }
    }

    pub fn timeout(target: impl Into<String>) -> Self {
        Self::Timeout {
            target: target.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "UNREACHABLE",
            Self::Timeout { .. } => "TIMEOUT",
        }
    }
}

/// Shared cache failures. Always recovered locally, never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("L2 cache unavailable: {0}")]
    L2Unavailable(String),
}

impl CacheError {
    pub fn code(&self) -> &'static str {
        "L2_UNAVAILABLE"
    }
}

/// Any error the pipeline can terminate a request with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.code(),
            Self::RateLimit(e) => e.code(),
            Self::Routing(e) => e.code(),
            Self::Backend(e) => e.code(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Auth(_) => 401,
            Self::RateLimit(_) => 429,
            Self::Routing(_) => 404,
            Self::Backend(BackendError::Unreachable { .. }) => 502,
            Self::Backend(BackendError::Timeout { .. }) => 504,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit(e) => Some(e.retry_after()),
            _ => None,
        }
    }
}
