//! API key and owner identifier validation

use thiserror::Error;

/// Errors that can occur while validating key or owner identifiers
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("{0} exceeds maximum length of {1} characters")]
    TooLong(&'static str, usize),

    #[error("{0} must start and end with a letter or number")]
    InvalidBoundary(&'static str),

    #[error("{0} contains invalid character: '{1}'")]
    InvalidCharacter(&'static str, char),

    #[error("Unknown tier: '{0}'")]
    UnknownTier(String),
}

const MAX_API_KEY_ID_LENGTH: usize = 50;
const MAX_OWNER_ID_LENGTH: usize = 128;

/// Validate an API key ID
///
/// Key IDs are alphanumeric with single hyphens, starting and ending with
/// an alphanumeric character.
pub fn validate_api_key_id(id: &str) -> Result<(), ApiKeyValidationError> {
    const KIND: &str = "API key ID";

    if id.is_empty() {
        return Err(ApiKeyValidationError::Empty(KIND));
    }

    if id.len() > MAX_API_KEY_ID_LENGTH {
        return Err(ApiKeyValidationError::TooLong(KIND, MAX_API_KEY_ID_LENGTH));
    }

    check_boundaries(KIND, id)?;

    let mut prev_hyphen = false;

    for c in id.chars() {
        match c {
            '-' if prev_hyphen => return Err(ApiKeyValidationError::InvalidCharacter(KIND, c)),
            '-' => prev_hyphen = true,
            c if c.is_ascii_alphanumeric() => prev_hyphen = false,
            c => return Err(ApiKeyValidationError::InvalidCharacter(KIND, c)),
        }
    }

    Ok(())
}

/// Validate an owner ID
///
/// Owners come from the account system, so the rules are looser: any
/// printable ASCII except whitespace and ':' (reserved by cache namespaces).
pub fn validate_owner_id(id: &str) -> Result<(), ApiKeyValidationError> {
    const KIND: &str = "Owner ID";

    if id.is_empty() {
        return Err(ApiKeyValidationError::Empty(KIND));
    }

    if id.len() > MAX_OWNER_ID_LENGTH {
        return Err(ApiKeyValidationError::TooLong(KIND, MAX_OWNER_ID_LENGTH));
    }

    check_boundaries(KIND, id)?;

    match id.chars().find(|c| !c.is_ascii_graphic() || *c == ':') {
        Some(c) => Err(ApiKeyValidationError::InvalidCharacter(KIND, c)),
        None => Ok(()),
    }
}

fn check_boundaries(kind: &'static str, id: &str) -> Result<(), ApiKeyValidationError> {
    let first = id.chars().next();
    let last = id.chars().next_back();

    match (first, last) {
        (Some(f), Some(l)) if f.is_ascii_alphanumeric() && l.is_ascii_alphanumeric() => Ok(()),
        _ => Err(ApiKeyValidationError::InvalidBoundary(kind)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_api_key_ids() {
        assert!(validate_api_key_id("key-0a1b2c").is_ok());
        assert!(validate_api_key_id("k").is_ok());
        assert!(validate_api_key_id("UPPER-lower-123").is_ok());
    }

    #[test]
    fn test_invalid_api_key_ids() {
        assert_eq!(
            validate_api_key_id(""),
            Err(ApiKeyValidationError::Empty("API key ID"))
        );
        assert_eq!(
            validate_api_key_id("-key"),
            Err(ApiKeyValidationError::InvalidBoundary("API key ID"))
        );
        assert_eq!(
            validate_api_key_id("my_key"),
            Err(ApiKeyValidationError::InvalidCharacter("API key ID", '_'))
        );
        assert_eq!(
            validate_api_key_id("my--key"),
            Err(ApiKeyValidationError::InvalidCharacter("API key ID", '-'))
        );
        assert!(validate_api_key_id(&"a".repeat(51)).is_err());
        assert!(validate_api_key_id(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn test_owner_ids() {
        assert!(validate_owner_id("user_42").is_ok());
        assert!(validate_owner_id("org.acme-7").is_ok());
        assert!(validate_owner_id("").is_err());
        assert!(validate_owner_id("user 42").is_err());
        assert!(validate_owner_id("user:42").is_err());
        assert!(validate_owner_id("_user").is_err());
    }
}
