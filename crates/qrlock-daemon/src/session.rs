//! Opaque per-caller session identifiers

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Random identifier tying a caller to its ephemeral record.
///
/// Only [`SessionId::short`] should appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh identifier from OS randomness
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a token previously handed to a caller
    pub fn parse(token: &str) -> Option<Self> {
        Uuid::parse_str(token.trim()).ok().map(Self)
    }

    /// First eight characters followed by `...`
    pub fn short(&self) -> String {
        let full = self.0.to_string();
        format!("{}...", &full[..8])
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form() {
        let id = SessionId::generate();
        let short = id.short();
        assert_eq!(short.len(), 11);
        assert!(short.ends_with("..."));
        assert!(id.to_string().starts_with(&short[..8]));
    }

    #[test]
    fn test_parse_round_trip() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(&id.to_string()), Some(id));
        assert_eq!(SessionId::parse("not-a-session"), None);
        assert_eq!(SessionId::parse(""), None);
    }

    #[test]
    fn test_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
