//! Application dialects and the per-dialect timer table

use std::time::Duration;

/// V2GTP payload type identifiers (ISO 15118-2 table 10, -20 table 15)
pub mod payload_type {
    /// EXI stream, SupportedAppProtocol or ISO 15118-2 namespace
    pub const EXI_SAP_V2: u16 = 0x8001;
    /// EXI stream, ISO 15118-20 common-message namespace
    pub const EXI_V20: u16 = 0x8002;
    /// SDP discovery request
    pub const SDP_REQUEST: u16 = 0x9000;
    /// SDP discovery response
    pub const SDP_RESPONSE: u16 = 0x9001;
}

/// XML namespaces negotiated during SupportedAppProtocol
pub mod namespace {
    pub const SAP: &str = "urn:iso:15118:2:2010:AppProtocol";
    pub const ISO_2: &str = "urn:iso:15118:2:2013:MsgDef";
    pub const ISO_20_COMMON: &str = "urn:iso:std:iso:15118:-20:CommonMessages";
    pub const ISO_20_DC: &str = "urn:iso:std:iso:15118:-20:DC";
}

/// One of the two message families a session can speak.
///
/// Selected once at SupportedAppProtocol negotiation and fixed for the
/// remainder of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// ISO 15118-2:2014 (legacy)
    Iso2,
    /// ISO 15118-20:2022
    Iso20,
}

/// The named deadlines a session arms, one per outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Ordinary request/response exchange
    Sequence,
    /// Exchanges the peer may answer with EVSEProcessing=Ongoing
    Ongoing,
    /// Charging-loop exchanges (CurrentDemand / ChargingStatus / DcChargeLoop)
    Performance,
}

impl Dialect {
    /// Namespace of the message schema for this dialect.
    pub fn exi_namespace(&self) -> &'static str {
        match self {
            Dialect::Iso2 => namespace::ISO_2,
            Dialect::Iso20 => namespace::ISO_20_COMMON,
        }
    }

    /// V2GTP payload type carrying this dialect's EXI streams.
    pub fn exi_payload_type(&self) -> u16 {
        match self {
            Dialect::Iso2 => payload_type::EXI_SAP_V2,
            Dialect::Iso20 => payload_type::EXI_V20,
        }
    }

    /// Maximum accepted V2GTP payload length; anything larger is a
    /// protocol error that closes the connection.
    pub fn max_payload_len(&self) -> u32 {
        match self {
            Dialect::Iso2 => 8192,
            Dialect::Iso20 => 65536,
        }
    }

    /// Deadline value for a timer of the given kind.
    pub fn timeout(&self, kind: TimerKind) -> Duration {
        match (self, kind) {
            (Dialect::Iso2, TimerKind::Sequence) => Duration::from_secs(40),
            (Dialect::Iso2, TimerKind::Ongoing) => Duration::from_secs(60),
            (Dialect::Iso2, TimerKind::Performance) => Duration::from_millis(4500),
            (Dialect::Iso20, TimerKind::Sequence) => Duration::from_secs(40),
            (Dialect::Iso20, TimerKind::Ongoing) => Duration::from_secs(55),
            (Dialect::Iso20, TimerKind::Performance) => Duration::from_millis(4500),
        }
    }

    /// Cap for the SDP retransmission back-off.
    pub fn sdp_retry_cap(&self) -> Duration {
        match self {
            Dialect::Iso2 => Duration::from_millis(4000),
            Dialect::Iso20 => Duration::from_millis(2000),
        }
    }
}

/// An entry in the SupportedAppProtocolReq list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppProtocol {
    pub namespace: String,
    pub version_major: u32,
    pub version_minor: u32,
    pub schema_id: u8,
    /// 1 is highest; the SECC picks the supported entry with the lowest
    /// priority value.
    pub priority: u8,
}

impl AppProtocol {
    /// The dialect this protocol entry names, if the stack supports it.
    pub fn dialect(&self) -> Option<Dialect> {
        match self.namespace.as_str() {
            namespace::ISO_2 => Some(Dialect::Iso2),
            namespace::ISO_20_COMMON | namespace::ISO_20_DC => Some(Dialect::Iso20),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance_timeout_is_sub_sequence() {
        for d in [Dialect::Iso2, Dialect::Iso20] {
            assert!(d.timeout(TimerKind::Performance) < d.timeout(TimerKind::Sequence));
        }
    }

    #[test]
    fn unknown_namespace_has_no_dialect() {
        let p = AppProtocol {
            namespace: "urn:din:70121:2012:MsgDef".into(),
            version_major: 2,
            version_minor: 0,
            schema_id: 3,
            priority: 3,
        };
        assert_eq!(p.dialect(), None);
    }
}
