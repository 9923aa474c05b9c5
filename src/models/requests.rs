//! Request DTOs for the introspection API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

/// What an invalidation request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidateTarget {
    Key(String),
    Tag(String),
    Pattern(String),
}

/// Request body for POST /invalidate
///
/// Exactly one of `key`, `tag` or `pattern` must be given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidateRequest {
    /// Remove a single key
    #[serde(default)]
    pub key: Option<String>,
    /// Remove every entry carrying this tag
    #[serde(default)]
    pub tag: Option<String>,
    /// Remove every key matching this regular expression
    #[serde(default)]
    pub pattern: Option<String>,
}

impl InvalidateRequest {
    /// Validates the request and resolves its single target.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(self) -> Result<InvalidateTarget, String> {
        match (self.key, self.tag, self.pattern) {
            (Some(key), None, None) if !key.is_empty() => Ok(InvalidateTarget::Key(key)),
            (None, Some(tag), None) if !tag.is_empty() => Ok(InvalidateTarget::Tag(tag)),
            (None, None, Some(pattern)) => Ok(InvalidateTarget::Pattern(pattern)),
            (None, None, None) => Err("One of key, tag or pattern is required".to_string()),
            (Some(_), None, None) | (None, Some(_), None) => {
                Err("Key and tag cannot be empty".to_string())
            }
            _ => Err("Only one of key, tag or pattern may be given".to_string()),
        }
    }
}
