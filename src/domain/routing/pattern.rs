//! Path patterns: literal segments, `{name}` captures and a trailing `*`

use std::collections::HashMap;

use crate::domain::DomainError;

/// Captured `{name}` segments
pub type PathParams = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A compiled path pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, DomainError> {
        if !pattern.starts_with('/') {
            return Err(DomainError::validation(format!(
                "route pattern '{}' must start with '/'",
                pattern
            )));
        }

        let parts: Vec<&str> = split_path(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());

        for (i, part) in parts.iter().enumerate() {
            let segment = if *part == "*" {
                if i + 1 != parts.len() {
                    return Err(DomainError::validation(format!(
                        "route pattern '{}': '*' is only allowed as the last segment",
                        pattern
                    )));
                }
                Segment::Wildcard
            } else if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(DomainError::validation(format!(
                        "route pattern '{}': invalid parameter segment '{}'",
                        pattern, part
                    )));
                }
                Segment::Param(name.to_string())
            } else if part.contains(['{', '}', '*']) {
                return Err(DomainError::validation(format!(
                    "route pattern '{}': invalid segment '{}'",
                    pattern, part
                )));
            } else {
                Segment::Literal((*part).to_string())
            };

            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match a request path, returning the captures on success
    ///
    /// Paths with dot segments never match: the backend's URL parser would
    /// resolve them to a different path than the one matched here.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        if has_dot_segments(path) {
            return None;
        }

        let mut params = PathParams::new();
        let mut parts = split_path(path);

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => return Some(params),
                Segment::Literal(literal) => {
                    if parts.next()? != literal.as_str() {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), parts.next()?.to_string());
                }
            }
        }

        parts.next().is_none().then_some(params)
    }
}

impl std::fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// True if any segment is `.` or `..`, literal or percent-encoded
pub fn has_dot_segments(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

// Empty segments are ignored, so "/a//b/" and "/a/b" are the same path
fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_match() {
        let p = RoutePattern::parse("/health").unwrap();
        assert!(p.matches("/health").is_some());
        assert!(p.matches("/health/").is_some());
        assert!(p.matches("/healthz").is_none());
        assert!(p.matches("/health/deep").is_none());
    }

    #[test]
    fn test_param_capture() {
        let p = RoutePattern::parse("/api/v1/entities/{id}/mentions").unwrap();
        let params = p.matches("/api/v1/entities/42/mentions").unwrap();

        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(p.matches("/api/v1/entities/mentions").is_none());
    }

    #[test]
    fn test_wildcard_matches_zero_or_more_segments() {
        let p = RoutePattern::parse("/api/v1/entities/*").unwrap();

        assert!(p.matches("/api/v1/entities").is_some());
        assert!(p.matches("/api/v1/entities/42").is_some());
        assert!(p.matches("/api/v1/entities/42/mentions/7").is_some());
        assert!(p.matches("/api/v1/mentions").is_none());
    }

    #[test]
    fn test_dot_segments_never_match() {
        let p = RoutePattern::parse("/api/v1/entities/*").unwrap();

        assert!(p.matches("/api/v1/entities/../../../internal/admin/users").is_none());
        assert!(p.matches("/api/v1/entities/./42").is_none());
        assert!(p.matches("/api/v1/entities/%2e%2E/%2e%2e/internal").is_none());
        assert!(p.matches("/api/v1/entities/.%2e/x").is_none());
        assert!(p.matches("/api/v1/entities/..\\..\\internal").is_none());

        // Dots inside a segment are ordinary characters
        assert!(p.matches("/api/v1/entities/v1.2/report..txt").is_some());
    }

    #[test]
    fn test_has_dot_segments() {
        assert!(has_dot_segments("/a/.."));
        assert!(has_dot_segments("/%2E/a"));
        assert!(!has_dot_segments("/a/.hidden/b"));
        assert!(!has_dot_segments("/a/.../b"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(RoutePattern::parse("api").is_err());
        assert!(RoutePattern::parse("/a/*/b").is_err());
        assert!(RoutePattern::parse("/a/{}").is_err());
        assert!(RoutePattern::parse("/a/b*").is_err());
    }
}
