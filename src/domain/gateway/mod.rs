//! Gateway domain
//!
//! The error taxonomy of the request pipeline and the contract the gateway
//! forwards through.

mod backend;
mod error;

pub use backend::{Backend, BackendRequest, BackendResponse};
pub use error::{AuthError, BackendError, CacheError, GatewayError, RateLimitError, RoutingError};

#[cfg(test)]
pub use backend::mock;
