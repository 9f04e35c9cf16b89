//! PKI error type

use thiserror::Error;

/// Certificate, chain, or signature validation failure. The role
/// engines map these onto the FAILED_Certificate* / FAILED_Signature*
/// response codes.
#[derive(Debug, Error)]
pub enum PkiError {
    #[error("certificate parse error: {0}")]
    Parse(String),

    #[error("certificate expired (notAfter {not_after})")]
    Expired { not_after: i64 },

    #[error("certificate not yet valid (notBefore {not_before})")]
    NotYetValid { not_before: i64 },

    #[error("signature verification failed at chain position {position}")]
    BadChainSignature { position: usize },

    #[error("detached signature verification failed")]
    BadSignature,

    #[error("certificate at position {position} lacks required key usage {usage}")]
    BadKeyUsage { position: usize, usage: &'static str },

    #[error("issuer/subject mismatch at chain position {position}")]
    BrokenChain { position: usize },

    #[error("chain root does not match any {role} trust anchor")]
    UnknownRoot { role: &'static str },

    #[error("certificate revoked (serial {serial})")]
    Revoked { serial: String },

    #[error("empty certificate chain")]
    EmptyChain,

    #[error("missing PKI material: {0}")]
    MissingMaterial(String),

    #[error("invalid private key: {0}")]
    BadKey(String),

    #[error("PKI I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
