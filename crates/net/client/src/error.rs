//! Per-call error taxonomy.

use std::time::Duration;

/// Outcome of a failed protocol call against a single peer.
///
/// The variants drive candidate-selection policy: a declining or timed-out
/// peer is skipped in favour of the next candidate, while an application
/// error means the peer answered and retrying it is pointless.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The stream could not be opened or was reset: the peer is
    /// unreachable, or does not speak the protocol.
    #[error("{protocol} declined: {reason}")]
    Decline {
        /// The protocol being attempted.
        protocol: &'static str,
        /// Transport-reported reason.
        reason: String,
    },
    /// The exchange did not settle within its budget.
    #[error("{protocol} timed out after {timeout:?}")]
    Timeout {
        /// The protocol being attempted.
        protocol: &'static str,
        /// The elapsed budget.
        timeout: Duration,
    },
    /// The peer answered and explicitly signalled failure.
    #[error("{protocol} failed: {reason}")]
    Application {
        /// The protocol being attempted.
        protocol: &'static str,
        /// The peer-supplied reason.
        reason: String,
    },
    /// The peer's bytes could not be decoded as a protocol message.
    #[error("{protocol} codec failure: {reason}")]
    Codec {
        /// The protocol being attempted.
        protocol: &'static str,
        /// Decode failure detail.
        reason: String,
    },
}

impl ProtocolError {
    /// The protocol this failure occurred on.
    pub fn protocol(&self) -> &'static str {
        match self {
            Self::Decline { protocol, .. }
            | Self::Timeout { protocol, .. }
            | Self::Application { protocol, .. }
            | Self::Codec { protocol, .. } => protocol,
        }
    }

    /// Whether the peer was unreachable or refused the stream.
    pub fn is_decline(&self) -> bool {
        matches!(self, Self::Decline { .. })
    }

    /// Whether the exchange exceeded its time budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the peer answered with an explicit failure.
    pub fn is_application(&self) -> bool {
        matches!(self, Self::Application { .. })
    }
}
