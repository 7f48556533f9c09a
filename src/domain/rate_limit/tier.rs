//! Rate limit tiers and the immutable tier table

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Admission algorithm a tier is enforced with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
    LeakyBucket,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FixedWindow => "fixed_window",
            Self::SlidingWindow => "sliding_window",
            Self::TokenBucket => "token_bucket",
            Self::LeakyBucket => "leaky_bucket",
        }
    }

    pub fn is_bucket(&self) -> bool {
        matches!(self, Self::TokenBucket | Self::LeakyBucket)
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named quota pair and the algorithm enforcing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitTier {
    pub name: String,
    pub requests_per_hour: u32,
    /// Burst quota; also the bucket capacity for bucket algorithms
    pub requests_per_minute: u32,
    pub algorithm: Algorithm,
}

impl RateLimitTier {
    pub fn new(
        name: impl Into<String>,
        requests_per_hour: u32,
        requests_per_minute: u32,
        algorithm: Algorithm,
    ) -> Self {
        Self {
            name: name.into(),
            requests_per_hour,
            requests_per_minute,
            algorithm,
        }
    }
}

/// Tiers loaded once at startup. Read-only afterwards.
#[derive(Debug, Clone)]
pub struct TierTable {
    tiers: Vec<RateLimitTier>,
    lowest: usize,
}

impl TierTable {
    pub fn new(tiers: Vec<RateLimitTier>) -> Result<Self, DomainError> {
        if tiers.is_empty() {
            return Err(DomainError::configuration("tier table cannot be empty"));
        }

        for (i, tier) in tiers.iter().enumerate() {
            if tier.name.trim().is_empty() {
                return Err(DomainError::configuration("tier name cannot be empty"));
            }
            if tier.requests_per_hour == 0 || tier.requests_per_minute == 0 {
                return Err(DomainError::configuration(format!(
                    "tier '{}' must have non-zero quotas",
                    tier.name
                )));
            }
            if tiers[..i].iter().any(|t| t.name == tier.name) {
                return Err(DomainError::configuration(format!(
                    "duplicate tier '{}'",
                    tier.name
                )));
            }
        }

        let lowest = tiers
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| (t.requests_per_hour, t.requests_per_minute))
            .map(|(i, _)| i)
            .unwrap_or(0);

        Ok(Self { tiers, lowest })
    }

    /// Exact lookup
    pub fn get(&self, name: &str) -> Option<&RateLimitTier> {
        self.tiers.iter().find(|t| t.name == name)
    }

    /// Lookup that never fails: unknown names get the lowest tier
    pub fn resolve(&self, name: &str) -> &RateLimitTier {
        self.get(name).unwrap_or_else(|| self.lowest())
    }

    pub fn lowest(&self) -> &RateLimitTier {
        &self.tiers[self.lowest]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RateLimitTier> {
        self.tiers.iter()
    }

    pub fn default_tiers() -> Vec<RateLimitTier> {
        vec![
            RateLimitTier::new("free", 100, 10, Algorithm::SlidingWindow),
            RateLimitTier::new("basic", 1_000, 100, Algorithm::SlidingWindow),
            RateLimitTier::new("professional", 10_000, 500, Algorithm::TokenBucket),
            RateLimitTier::new("enterprise", 100_000, 5_000, Algorithm::TokenBucket),
        ]
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            tiers: Self::default_tiers(),
            lowest: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = TierTable::default();

        assert_eq!(table.lowest().name, "free");
        assert_eq!(table.resolve("professional").algorithm, Algorithm::TokenBucket);
        assert_eq!(table.resolve("basic").requests_per_minute, 100);
    }

    #[test]
    fn test_unknown_tier_resolves_to_lowest() {
        let table = TierTable::new(vec![
            RateLimitTier::new("gold", 5_000, 50, Algorithm::FixedWindow),
            RateLimitTier::new("bronze", 50, 5, Algorithm::LeakyBucket),
        ])
        .unwrap();

        assert_eq!(table.resolve("platinum").name, "bronze");
        assert_eq!(table.resolve("").name, "bronze");
        assert!(!table.contains("platinum"));
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert!(TierTable::new(vec![]).is_err());
        assert!(TierTable::new(vec![RateLimitTier::new("x", 0, 1, Algorithm::FixedWindow)]).is_err());
        assert!(TierTable::new(vec![
            RateLimitTier::new("x", 10, 1, Algorithm::FixedWindow),
            RateLimitTier::new("x", 20, 2, Algorithm::FixedWindow),
        ])
        .is_err());
    }

    #[test]
    fn test_algorithm_serde() {
        let json = serde_json::to_string(&Algorithm::LeakyBucket).unwrap();
        assert_eq!(json, "\"leaky_bucket\"");

        let algo: Algorithm = serde_json::from_str("\"sliding_window\"").unwrap();
        assert_eq!(algo, Algorithm::SlidingWindow);
    }
}
