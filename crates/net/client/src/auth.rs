//! Store-request authorization.
//!
//! When the caller supplies a signer, store requests carry an
//! [`AuthorizationEnvelope`] binding the content digest, application id,
//! timestamp and a random nonce under the sender's signature. The envelope
//! is constructed here and validated by the receiving peer, never locally.

use alloy_primitives::{Address, Signature};
use async_trait::async_trait;
use hashd_net_proto::AuthorizationEnvelope;
use hashd_primitives::ContentId;
use rand::Rng as _;

/// Failure reported by the signer collaborator.
#[derive(Debug, thiserror::Error)]
#[error("signer failure: {0}")]
pub struct SignerError(pub String);

/// The cryptographic signer boundary: an identity address plus message
/// signing. Backed by any [`alloy_signer::Signer`] via the blanket impl.
#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// The sender address the signatures recover to.
    fn address(&self) -> Address;

    /// Sign an arbitrary message.
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError>;
}

#[async_trait]
impl<S> MessageSigner for S
where
    S: alloy_signer::Signer<Signature> + Send + Sync,
{
    fn address(&self) -> Address {
        alloy_signer::Signer::address(self)
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        alloy_signer::Signer::sign_message(self, message)
            .await
            .map_err(|e| SignerError(e.to_string()))
    }
}

/// Seconds since the Unix epoch.
pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Build an authorization envelope over the canonical store message.
///
/// The canonical message binds the content digest, application id,
/// timestamp and nonce: `hashd-store:{digest}:{app_id}:{timestamp}:{nonce}`.
pub async fn build_authorization(
    signer: &dyn MessageSigner,
    app_id: &str,
    cid: &ContentId,
) -> Result<AuthorizationEnvelope, SignerError> {
    let timestamp = unix_timestamp();
    let nonce = hex::encode(rand::rng().random::<[u8; 16]>());
    let canonical = format!("hashd-store:{cid}:{app_id}:{timestamp}:{nonce}");
    let signature = signer.sign_message(canonical.as_bytes()).await?;

    Ok(AuthorizationEnvelope {
        sender: signer.address().to_string(),
        signature: hex::encode(signature.as_bytes()),
        timestamp,
        nonce,
        app_id: app_id.to_owned(),
        content_digest: cid.to_string(),
    })
}
