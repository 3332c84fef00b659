use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{IDENTITY_SUFFIX_LEN, MAX_IDENTITY_LEN};
use crate::error::IdentityError;

/// An endpoint's name within the rendezvous broker namespace.
/// Human-readable prefix plus a random numeric suffix, e.g. `campus-417382`.
/// Assigned once per session and reassigned on restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Generate a fresh identity from a prefix and a random suffix.
    pub fn generate(prefix: &str) -> Self {
        let suffix: String = (0..IDENTITY_SUFFIX_LEN)
            .map(|_| char::from(b'0' + rand::rngs::OsRng.gen_range(0..10)))
            .collect();
        Self(format!("{prefix}-{suffix}"))
    }

    /// Validate and wrap a remote identity entered by the user.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }
        if s.len() > MAX_IDENTITY_LEN {
            return Err(IdentityError::TooLong(s.len()));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(IdentityError::InvalidCharacters(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Aggregate connection state exposed to the UI shell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Which side initiated a peer link.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkDirection {
    Outbound,
    Inbound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_has_prefix_and_numeric_suffix() {
        let id = PeerIdentity::generate("campus");
        let s = id.as_str();
        assert!(s.starts_with("campus-"));
        let suffix = &s["campus-".len()..];
        assert_eq!(suffix.len(), IDENTITY_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_parse_accepts_generated() {
        let id = PeerIdentity::generate("campus");
        assert!(PeerIdentity::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            PeerIdentity::parse(""),
            Err(IdentityError::Empty)
        ));
    }

    #[test]
    fn test_parse_rejects_invalid_characters() {
        assert!(matches!(
            PeerIdentity::parse("campus 123"),
            Err(IdentityError::InvalidCharacters(_))
        ));
        assert!(PeerIdentity::parse("campus/123").is_err());
    }

    #[test]
    fn test_parse_rejects_overlong() {
        let long = "a".repeat(MAX_IDENTITY_LEN + 1);
        assert!(matches!(
            PeerIdentity::parse(&long),
            Err(IdentityError::TooLong(_))
        ));
    }
}
