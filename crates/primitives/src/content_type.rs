//! Content categories accepted by a storage peer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The set of content categories a peer declares it will store.
///
/// On the wire this is either the literal string `"all"` or an explicit list
/// of category names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AcceptedContentTypes {
    /// The peer accepts every content category.
    #[default]
    All,
    /// The peer accepts only the listed categories.
    Listed(Vec<String>),
}

impl AcceptedContentTypes {
    /// Whether a payload of the given category would be accepted.
    pub fn accepts(&self, content_type: &str) -> bool {
        match self {
            Self::All => true,
            Self::Listed(list) => list.iter().any(|t| t.eq_ignore_ascii_case(content_type)),
        }
    }

    /// Whether every category is accepted.
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl Serialize for AcceptedContentTypes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::All => serializer.serialize_str("all"),
            Self::Listed(list) => list.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Word(String),
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for AcceptedContentTypes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Word(w) if w.eq_ignore_ascii_case("all") => Self::All,
            // A bare word other than "all" is a single-category declaration.
            Repr::Word(w) => Self::Listed(vec![w]),
            Repr::List(list) => Self::Listed(list),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_accepts_everything() {
        assert!(AcceptedContentTypes::All.accepts("image"));
        assert!(AcceptedContentTypes::All.accepts("anything"));
    }

    #[test]
    fn test_listed_matches_case_insensitively() {
        let types = AcceptedContentTypes::Listed(vec!["image".into(), "video".into()]);
        assert!(types.accepts("Image"));
        assert!(types.accepts("video"));
        assert!(!types.accepts("audio"));
    }

    #[test]
    fn test_wire_roundtrip() {
        let all: AcceptedContentTypes = serde_json::from_str("\"all\"").unwrap();
        assert!(all.is_all());
        assert_eq!(serde_json::to_string(&all).unwrap(), "\"all\"");

        let listed: AcceptedContentTypes = serde_json::from_str("[\"image\"]").unwrap();
        assert_eq!(listed, AcceptedContentTypes::Listed(vec!["image".into()]));
        assert_eq!(serde_json::to_string(&listed).unwrap(), "[\"image\"]");
    }
}
