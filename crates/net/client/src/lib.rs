//! Request/response protocol client for hashd storage peers.
//!
//! Every named protocol follows the same shape: open a stream to the target
//! peer for a fixed protocol name, write exactly one request frame, read
//! exactly one response frame, close the stream, and return a typed result.
//! Failures never panic; they surface through [`ProtocolError`], whose
//! variants tell the caller whether to try the next candidate
//! ([`ProtocolError::Decline`]) or stop retrying
//! ([`ProtocolError::Application`]).

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod auth;
mod client;
mod error;

pub use auth::{MessageSigner, SignerError, build_authorization, unix_timestamp};
pub use client::{ClientConfig, ProtocolClient, RetrievedContent, StoreReceipt};
pub use error::ProtocolError;
