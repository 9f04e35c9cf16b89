//! SupportedAppProtocol handshake messages
//!
//! These are the only messages exchanged before a dialect is selected;
//! they live in their own schema namespace.

use crate::dialect::AppProtocol;

/// EVCC's list of supported application protocols, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedAppProtocolReq {
    pub app_protocols: Vec<AppProtocol>,
}

/// SECC's pick, referencing a schema id from the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedAppProtocolRes {
    pub response_code: SapResponseCode,
    /// Present unless negotiation failed
    pub schema_id: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SapResponseCode {
    OkSuccessfulNegotiation,
    OkSuccessfulNegotiationWithMinorDeviation,
    FailedNoNegotiation,
}

impl SapResponseCode {
    pub fn is_ok(&self) -> bool {
        !matches!(self, SapResponseCode::FailedNoNegotiation)
    }
}
