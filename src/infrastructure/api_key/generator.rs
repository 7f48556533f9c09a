//! API key generation and hashing
//!
//! Keys look like `sk_live_<43 chars of URL-safe base64>`. The environment
//! prefix is public; only the SHA-256 hash of the full key is stored.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::DomainError;

const LOOKUP_CHARS: usize = 8;

/// Deployment environment encoded in the visible key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEnvironment {
    #[default]
    Live,
    Test,
}

impl KeyEnvironment {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Live => "sk_live_",
            Self::Test => "sk_test_",
        }
    }
}

/// Freshly derived key material
#[derive(Debug, Clone)]
pub struct GeneratedApiKey {
    /// Plaintext key; handed to the caller once and never stored
    pub key: String,
    /// Environment prefix plus the first secret characters, used for lookup
    pub prefix: String,
    pub hash: String,
}

#[derive(Debug, Clone)]
pub struct ApiKeyGenerator {
    environment: KeyEnvironment,
    key_bytes: usize,
}

impl ApiKeyGenerator {
    pub fn new(environment: KeyEnvironment) -> Self {
        Self {
            environment,
            key_bytes: 32,
        }
    }

    pub fn environment(&self) -> KeyEnvironment {
        self.environment
    }

    /// Generate a key from fresh randomness
    pub fn generate(&self) -> GeneratedApiKey {
        let mut random_bytes = vec![0u8; self.key_bytes];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        self.derive(&URL_SAFE_NO_PAD.encode(&random_bytes))
    }

    /// Derive key material from a caller-chosen secret
    pub fn from_secret(&self, secret: &str) -> Result<GeneratedApiKey, DomainError> {
        if secret.len() < LOOKUP_CHARS {
            return Err(DomainError::validation(format!(
                "API key secret must be at least {} characters",
                LOOKUP_CHARS
            )));
        }

        if let Some(c) = secret.chars().find(|c| !is_url_safe(*c)) {
            return Err(DomainError::validation(format!(
                "API key secret contains invalid character: '{}'",
                c
            )));
        }

        Ok(self.derive(secret))
    }

    fn derive(&self, secret: &str) -> GeneratedApiKey {
        let env_prefix = self.environment.prefix();
        let key = format!("{}{}", env_prefix, secret);

        GeneratedApiKey {
            prefix: format!("{}{}", env_prefix, &secret[..LOOKUP_CHARS.min(secret.len())]),
            hash: hash_key(&key),
            key,
        }
    }

    pub fn verify_key(&self, key: &str, stored_hash: &str) -> bool {
        constant_time_eq(hash_key(key).as_bytes(), stored_hash.as_bytes())
    }

    /// Lookup prefix of a presented key, or None if it is not shaped like one of ours
    ///
    /// The environment must match this generator's; a test key never
    /// authenticates against a live deployment.
    pub fn lookup_prefix<'a>(&self, key: &'a str) -> Option<&'a str> {
        let env_prefix = self.environment.prefix();
        let secret = key.strip_prefix(env_prefix)?;

        if secret.len() < LOOKUP_CHARS || !secret.chars().all(is_url_safe) {
            return None;
        }

        Some(&key[..env_prefix.len() + LOOKUP_CHARS])
    }
}

impl Default for ApiKeyGenerator {
    fn default() -> Self {
        Self::new(KeyEnvironment::Live)
    }
}

/// `sha256$` + URL-safe base64 digest
pub fn hash_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("sha256${}", URL_SAFE_NO_PAD.encode(digest))
}

fn is_url_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
