//! EVCC session error type

use thiserror::Error;

use v2g_codec::CodecError;
use v2g_core::config::ConfigError;
use v2g_core::dialect::TimerKind;
use v2g_core::error::{FaultKind, ProtocolError};
use v2g_pki::PkiError;
use v2g_transport::TransportError;

/// Anything that terminates an EVCC session (or prevents it starting).
#[derive(Debug, Error)]
pub enum EvccError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("security: {0}")]
    Security(#[from] PkiError),

    #[error("{0:?} timer expired")]
    Timeout(TimerKind),

    #[error("controller: {0}")]
    Controller(String),

    /// External shutdown raised mid-exchange. The session still sends
    /// its SessionStop when the dialogue allows one, then closes; this
    /// is a stop cause, not a fault.
    #[error("externally cancelled")]
    Cancelled,
}

impl EvccError {
    /// The diagnostic fault class this error belongs to.
    pub fn kind(&self) -> FaultKind {
        match self {
            EvccError::Config(_) => FaultKind::Config,
            EvccError::Codec(_) => FaultKind::Codec,
            EvccError::Transport(TransportError::SdpExhausted { .. }) => FaultKind::Timeout,
            EvccError::Transport(_) => FaultKind::Transport,
            EvccError::Protocol(_) => FaultKind::Protocol,
            EvccError::Security(_) => FaultKind::Security,
            EvccError::Timeout(_) => FaultKind::Timeout,
            EvccError::Controller(_) => FaultKind::Controller,
            EvccError::Cancelled => FaultKind::Transport,
        }
    }
}
