//! Error taxonomy shared by both role engines

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The failure classes a session can terminate with.
///
/// Every session failure produces exactly one structured diagnostic
/// record carrying one of these kinds; no error is retried
/// transparently by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Malformed environment or missing PKI material; fatal at startup
    Config,
    /// EXI or V2GTP malformed; close without responding
    Codec,
    /// Unexpected message, bad session id, bad sequence
    Protocol,
    /// Chain, signature, or certificate validation failed
    Security,
    /// A message timer expired
    Timeout,
    /// Socket or TLS failure
    Transport,
    /// The abstract controller reported a fault
    Controller,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FaultKind::Config => "config",
            FaultKind::Codec => "codec",
            FaultKind::Protocol => "protocol",
            FaultKind::Security => "security",
            FaultKind::Timeout => "timeout",
            FaultKind::Transport => "transport",
            FaultKind::Controller => "controller",
        };
        f.write_str(s)
    }
}

/// Sequencing violations detected by the message router.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The transition table has no entry for (state, message kind)
    #[error("unexpected {kind} in state {state}")]
    UnexpectedMessage { state: String, kind: String },

    /// The echoed session identifier differs from the assigned one
    #[error("session id {got} does not match established id {expected}")]
    SessionIdMismatch { expected: String, got: String },

    /// The peer selected something the prior response never offered
    #[error("selection not offered: {0}")]
    SelectionNotOffered(String),

    /// The peer answered with a FAILED_* response code
    #[error("peer reported {0}")]
    PeerFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_kind_serializes_snake_case() {
        let s = serde_json::to_string(&FaultKind::Security).unwrap();
        assert_eq!(s, "\"security\"");
    }
}
