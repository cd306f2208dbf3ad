//! The `hashd://` URL scheme.
//!
//! Consumers reference stored content with URLs of the form
//! `hashd://{content-id}?type={mime}&decrypt={bool}`. Unknown query
//! parameters are ignored; `decrypt` is true only for the literal string
//! `"true"`.

use std::fmt;

use crate::cid::{ContentId, InvalidContentId};

/// Scheme prefix for content URLs.
pub const URL_SCHEME: &str = "hashd://";

/// A parsed `hashd://` content URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentUrl {
    /// The referenced content id.
    pub id: ContentId,
    /// Declared media type, if the URL carries one.
    pub mime_type: Option<String>,
    /// Whether the consumer should decrypt the payload after retrieval.
    pub decrypt: bool,
}

/// Error returned when parsing an invalid content URL.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlError {
    /// The input does not start with `hashd://`.
    #[error("missing {URL_SCHEME} scheme prefix")]
    MissingScheme,
    /// The identifier between the scheme and the query is invalid.
    #[error("invalid content id: {0}")]
    InvalidId(#[from] InvalidContentId),
}

impl ContentUrl {
    /// Create a URL referencing the given content id.
    pub fn new(id: ContentId) -> Self {
        Self {
            id,
            mime_type: None,
            decrypt: false,
        }
    }

    /// Attach a declared media type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Mark the payload as requiring decryption after retrieval.
    pub fn with_decrypt(mut self, decrypt: bool) -> Self {
        self.decrypt = decrypt;
        self
    }

    /// Parse a `hashd://` URL.
    ///
    /// Rejects inputs lacking the scheme prefix and inputs whose identifier
    /// is empty or malformed. Unknown query parameters are ignored.
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let rest = input.strip_prefix(URL_SCHEME).ok_or(UrlError::MissingScheme)?;

        let (id_part, query) = match rest.split_once('?') {
            Some((id, query)) => (id, Some(query)),
            None => (rest, None),
        };
        let id = ContentId::parse(id_part)?;

        let mut mime_type = None;
        let mut decrypt = false;
        if let Some(query) = query {
            for pair in query.split('&') {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                match key {
                    "type" => mime_type = Some(value.to_owned()),
                    "decrypt" => decrypt = value == "true",
                    _ => {}
                }
            }
        }

        Ok(Self {
            id,
            mime_type,
            decrypt,
        })
    }
}

impl fmt::Display for ContentUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URL_SCHEME}{}", self.id)?;
        let mut separator = '?';
        if let Some(mime_type) = &self.mime_type {
            write!(f, "{separator}type={mime_type}")?;
            separator = '&';
        }
        if self.decrypt {
            write!(f, "{separator}decrypt=true")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ContentUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
