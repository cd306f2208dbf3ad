//! Content identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A content id: the hex-encoded SHA-256 digest of a payload.
///
/// Content ids name payloads on the network; a peer holding a blob for a
/// given id is expected to return bytes that hash back to that id. The
/// identifier is treated as an opaque token everywhere except
/// [`ContentId::from_payload`], so ids minted by peers using a different
/// digest width still round-trip through this type.
#[derive(
    Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display, Serialize, Deserialize,
)]
#[display("{_0}")]
#[serde(transparent)]
pub struct ContentId(String);

/// Error returned when parsing an invalid content id.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidContentId {
    /// The identifier was empty.
    #[error("content id is empty")]
    Empty,
    /// The identifier contained a character outside `[0-9a-zA-Z]`.
    #[error("content id contains invalid character {0:?}")]
    InvalidCharacter(char),
}

impl ContentId {
    /// Derive the content id for a payload.
    pub fn from_payload(payload: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(payload)))
    }

    /// Parse an identifier received from a peer or a URL.
    ///
    /// Identifiers must be non-empty and ASCII-alphanumeric.
    pub fn parse(s: &str) -> Result<Self, InvalidContentId> {
        if s.is_empty() {
            return Err(InvalidContentId::Empty);
        }
        if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(InvalidContentId::InvalidCharacter(c));
        }
        Ok(Self(s.to_owned()))
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ContentId {
    type Err = InvalidContentId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_payload_known_digest() {
        let cid = ContentId::from_payload(b"hello world");
        assert_eq!(
            cid.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_same_payload_same_id() {
        assert_eq!(
            ContentId::from_payload(b"abc"),
            ContentId::from_payload(b"abc")
        );
        assert_ne!(
            ContentId::from_payload(b"abc"),
            ContentId::from_payload(b"abd")
        );
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(ContentId::parse(""), Err(InvalidContentId::Empty));
    }

    #[test]
    fn test_parse_rejects_separator_characters() {
        assert_eq!(
            ContentId::parse("abc/def"),
            Err(InvalidContentId::InvalidCharacter('/'))
        );
        assert_eq!(
            ContentId::parse("abc?x=1"),
            Err(InvalidContentId::InvalidCharacter('?'))
        );
    }

    #[test]
    fn test_serde_transparent() {
        let cid = ContentId::from_payload(b"x");
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{cid}\""));
        let back: ContentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);
    }
}
