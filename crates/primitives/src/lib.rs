//! Core primitives for the hashd content network.
//!
//! This crate defines the vocabulary shared by every other hashd crate:
//!
//! - [`ContentId`]: a digest-derived string naming a stored payload
//! - [`ContentUrl`]: the `hashd://` URL scheme used by consumers to reference
//!   stored content
//! - [`AcceptedContentTypes`]: the set of content categories a storage peer
//!   declares it will accept

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod cid;
mod content_type;
mod url;

pub use cid::{ContentId, InvalidContentId};
pub use content_type::AcceptedContentTypes;
pub use url::{ContentUrl, UrlError, URL_SCHEME};
