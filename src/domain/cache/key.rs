//! Cache key derivation
//!
//! Keys follow `{resourceType}:{resourceId}:{variant}` so that a prefix
//! such as `core:/api/v1/entities/` addresses a whole family of entries.

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::DomainError;

/// A namespace-qualified cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from its three namespace components
    pub fn resource(
        resource_type: impl AsRef<str>,
        resource_id: impl AsRef<str>,
        variant: impl AsRef<str>,
    ) -> Self {
        Self(format!(
            "{}:{}:{}",
            resource_type.as_ref(),
            resource_id.as_ref(),
            variant.as_ref()
        ))
    }

    /// Key for a memoized call: namespace plus a stable hash of the arguments
    pub fn for_call<A: Serialize + ?Sized>(namespace: &str, args: &A) -> Result<Self, DomainError> {
        let json = serde_json::to_vec(args).map_err(|e| {
            DomainError::cache(format!("Failed to serialize cache key arguments: {}", e))
        })?;

        Ok(Self(format!("{}:{}", namespace, stable_hash(&json))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex SHA-256 of the input, truncated to 32 characters
pub fn stable_hash(input: &[u8]) -> String {
    let digest = Sha256::digest(input);
    hex::encode(&digest[..16])
}

/// Order-insensitive variant component built from name/value pairs
#[derive(Debug, Clone, Default)]
pub struct CacheKeyParams {
    components: BTreeMap<String, Vec<String>>,
}

impl CacheKeyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw query string. Parameter order does not change the result.
    pub fn from_query(query: Option<&str>) -> Self {
        let mut params = Self::new();

        for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            params = params.with_component(name, value);
        }

        params
    }

    pub fn with_component(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let values = self.components.entry(key.into()).or_default();
        values.push(value.into());
        values.sort();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// `default` when empty, otherwise a hash of the sorted components
    pub fn variant(&self) -> String {
        if self.is_empty() {
            return "default".to_string();
        }

        let canonical = self
            .components
            .iter()
            .flat_map(|(k, vs)| vs.iter().map(move |v| format!("{}={}", k, v)))
            .collect::<Vec<_>>()
            .join("&");

        stable_hash(canonical.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_key_layout() {
        let key = CacheKey::resource("core", "/api/v1/entities/42", "default");
        assert_eq!(key.as_str(), "core:/api/v1/entities/42:default");
        assert!(key.starts_with("core:/api/v1/entities/"));
    }

    #[test]
    fn test_for_call_is_stable() {
        #[derive(Serialize)]
        struct Args<'a> {
            entity: &'a str,
            days: u32,
        }

        let a = CacheKey::for_call("sentiment", &Args { entity: "acme", days: 7 }).unwrap();
        let b = CacheKey::for_call("sentiment", &Args { entity: "acme", days: 7 }).unwrap();
        let c = CacheKey::for_call("sentiment", &Args { entity: "acme", days: 30 }).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("sentiment:"));
        assert_eq!(a.as_str().len(), "sentiment:".len() + 32);
    }

    #[test]
    fn test_query_order_does_not_matter() {
        let a = CacheKeyParams::from_query(Some("b=2&a=1"));
        let b = CacheKeyParams::from_query(Some("a=1&b=2"));
        let c = CacheKeyParams::from_query(Some("a=1&b=3"));

        assert_eq!(a.variant(), b.variant());
        assert_ne!(a.variant(), c.variant());
    }

    #[test]
    fn test_empty_query_is_default_variant() {
        assert_eq!(CacheKeyParams::from_query(None).variant(), "default");
        assert_eq!(CacheKeyParams::from_query(Some("")).variant(), "default");
    }

    #[test]
    fn test_repeated_params_are_kept() {
        let single = CacheKeyParams::from_query(Some("tag=a"));
        let repeated = CacheKeyParams::from_query(Some("tag=a&tag=b"));
        let reordered = CacheKeyParams::from_query(Some("tag=b&tag=a"));

        assert_ne!(single.variant(), repeated.variant());
        assert_eq!(repeated.variant(), reordered.variant());
    }
}
