//! Infrastructure layer - concrete stores, clients and the gateway pipeline

pub mod api_key;
pub mod backend;
pub mod cache;
pub mod observability;
pub mod rate_limit;
pub mod services;
