//! SECC session error type and FAILED_* code mapping

use thiserror::Error;

use v2g_codec::CodecError;
use v2g_core::config::ConfigError;
use v2g_core::dialect::TimerKind;
use v2g_core::error::{FaultKind, ProtocolError};
use v2g_core::messages::iso2::ResponseCodeV2;
use v2g_core::messages::iso20::ResponseCodeV20;
use v2g_pki::PkiError;
use v2g_transport::TransportError;

/// Dialect-neutral failure class; rendered to the schema's FAILED_*
/// code when the SECC still owes the EVCC a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailCode {
    Sequence,
    UnknownSession,
    CertificateExpired,
    CertChainError,
    CertificateRevoked,
    SignatureError,
    ChallengeInvalid,
    WrongEnergyTransferMode,
    PaymentSelectionInvalid,
    ServiceSelectionInvalid,
    WrongChargeParameter,
    TariffSelectionInvalid,
    Generic,
}

impl FailCode {
    pub fn v2(self) -> ResponseCodeV2 {
        match self {
            FailCode::Sequence => ResponseCodeV2::FailedSequenceError,
            FailCode::UnknownSession => ResponseCodeV2::FailedUnknownSession,
            FailCode::CertificateExpired => ResponseCodeV2::FailedCertificateExpired,
            FailCode::CertChainError => ResponseCodeV2::FailedCertChainError,
            FailCode::CertificateRevoked => ResponseCodeV2::FailedCertificateRevoked,
            FailCode::SignatureError => ResponseCodeV2::FailedSignatureError,
            FailCode::ChallengeInvalid => ResponseCodeV2::FailedChallengeInvalid,
            FailCode::WrongEnergyTransferMode => ResponseCodeV2::FailedWrongEnergyTransferMode,
            FailCode::PaymentSelectionInvalid => ResponseCodeV2::FailedPaymentSelectionInvalid,
            FailCode::ServiceSelectionInvalid => ResponseCodeV2::FailedServiceSelectionInvalid,
            FailCode::WrongChargeParameter => ResponseCodeV2::FailedWrongChargeParameter,
            FailCode::TariffSelectionInvalid => ResponseCodeV2::FailedTariffSelectionInvalid,
            FailCode::Generic => ResponseCodeV2::Failed,
        }
    }

    pub fn v20(self) -> ResponseCodeV20 {
        match self {
            FailCode::Sequence => ResponseCodeV20::FailedSequenceError,
            FailCode::UnknownSession => ResponseCodeV20::FailedUnknownSession,
            FailCode::CertificateExpired => ResponseCodeV20::FailedCertificateExpired,
            FailCode::CertChainError => ResponseCodeV20::FailedCertificateChainError,
            FailCode::CertificateRevoked => ResponseCodeV20::FailedCertificateRevoked,
            FailCode::SignatureError => ResponseCodeV20::FailedSignatureError,
            FailCode::ChallengeInvalid => ResponseCodeV20::FailedChallengeInvalid,
            FailCode::WrongEnergyTransferMode => ResponseCodeV20::FailedWrongChargeParameter,
            FailCode::PaymentSelectionInvalid => ResponseCodeV20::FailedAuthorizationSelectionInvalid,
            FailCode::ServiceSelectionInvalid => ResponseCodeV20::FailedServiceSelectionInvalid,
            FailCode::WrongChargeParameter => ResponseCodeV20::FailedWrongChargeParameter,
            FailCode::TariffSelectionInvalid => ResponseCodeV20::FailedScheduleSelectionInvalid,
            FailCode::Generic => ResponseCodeV20::Failed,
        }
    }
}

/// Anything that terminates a SECC session (or prevents it starting).
#[derive(Debug, Error)]
pub enum SeccError {
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

    #[error("{0:?} timer expired waiting for the next request")]
    Timeout(TimerKind),

    #[error("controller: {0}")]
    Controller(String),

    /// A request failed validation; the SECC still answers with the
    /// mapped FAILED_* code before closing.
    #[error("rejected: {detail}")]
    Reject { code: FailCode, detail: String },
}

impl SeccError {
    pub fn kind(&self) -> FaultKind {
        match self {
            SeccError::Config(_) => FaultKind::Config,
            SeccError::Codec(_) => FaultKind::Codec,
            SeccError::Transport(_) => FaultKind::Transport,
            SeccError::Protocol(_) => FaultKind::Protocol,
            SeccError::Security(_) => FaultKind::Security,
            SeccError::Timeout(_) => FaultKind::Timeout,
            SeccError::Controller(_) => FaultKind::Controller,
            SeccError::Reject { .. } => FaultKind::Protocol,
        }
    }

    /// The FAILED_* class owed to the EVCC, when a response is still
    /// possible. Codec and transport faults get no response at all.
    pub fn fail_code(&self) -> Option<FailCode> {
        match self {
            SeccError::Codec(_) | SeccError::Transport(_) | SeccError::Timeout(_) => None,
            SeccError::Config(_) => Some(FailCode::Generic),
            SeccError::Protocol(ProtocolError::SessionIdMismatch { .. }) => {
                Some(FailCode::UnknownSession)
            }
            SeccError::Protocol(_) => Some(FailCode::Sequence),
            SeccError::Security(e) => Some(match e {
                PkiError::Expired { .. } => FailCode::CertificateExpired,
                PkiError::NotYetValid { .. } => FailCode::CertificateExpired,
                PkiError::Revoked { .. } => FailCode::CertificateRevoked,
                PkiError::BadSignature => FailCode::SignatureError,
                _ => FailCode::CertChainError,
            }),
            SeccError::Controller(_) => Some(FailCode::Sequence),
            SeccError::Reject { code, .. } => Some(*code),
        }
    }
}
