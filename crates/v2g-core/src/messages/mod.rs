//! The message sum type and request/response pairing
//!
//! State machines and the router only ever see [`Message`]; bytes stay
//! in the codec crate.

pub mod app_protocol;
pub mod common;
pub mod iso2;
pub mod iso20;

use crate::dialect::Dialect;
use crate::session::SessionId;

use app_protocol::{SupportedAppProtocolReq, SupportedAppProtocolRes};
use iso2::{BodyV2, MessageV2};
use iso20::{BodyV20, MessageV20};

/// A decoded application message of either dialect, or one of the
/// dialect-independent SupportedAppProtocol handshake messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    SupportedAppProtocolReq(SupportedAppProtocolReq),
    SupportedAppProtocolRes(SupportedAppProtocolRes),
    V2(MessageV2),
    V20(MessageV20),
}

impl Message {
    /// Dialect this message belongs to; `None` for the SAP handshake.
    pub fn dialect(&self) -> Option<Dialect> {
        match self {
            Message::SupportedAppProtocolReq(_) | Message::SupportedAppProtocolRes(_) => None,
            Message::V2(_) => Some(Dialect::Iso2),
            Message::V20(_) => Some(Dialect::Iso20),
        }
    }

    /// Session id echoed in the header; `None` for SAP messages.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Message::V2(m) => Some(m.header.session_id),
            Message::V20(m) => Some(m.header.session_id),
            _ => None,
        }
    }

    /// The kind tag used for routing and pairing.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::SupportedAppProtocolReq(_) => MessageKind::SupportedAppProtocolReq,
            Message::SupportedAppProtocolRes(_) => MessageKind::SupportedAppProtocolRes,
            Message::V2(m) => kind_of_v2(&m.body),
            Message::V20(m) => kind_of_v20(&m.body),
        }
    }

    /// Schema name of the response code this message carries, for
    /// diagnostics. `None` on requests.
    pub fn response_code_label(&self) -> Option<String> {
        match self {
            Message::SupportedAppProtocolRes(r) => Some(format!("{:?}", r.response_code)),
            Message::V2(m) => m.response_code().map(|c| format!("{:?}", c)),
            Message::V20(m) => m.response_code().map(|c| format!("{:?}", c)),
            _ => None,
        }
    }

    /// Whether the peer's response code signals failure. `false` for
    /// requests and for responses with OK/Warning codes.
    pub fn is_failed_response(&self) -> bool {
        match self {
            Message::SupportedAppProtocolRes(r) => !r.response_code.is_ok(),
            Message::V2(m) => m.response_code().map(|c| !c.is_ok()).unwrap_or(false),
            Message::V20(m) => m.response_code().map(|c| !c.is_ok()).unwrap_or(false),
            _ => false,
        }
    }
}

/// Flat kind tag across SAP, -2, and -20. Kinds with identical names in
/// both dialects share a variant; the dialect tag on [`Message`]
/// disambiguates where it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    SupportedAppProtocolReq,
    SupportedAppProtocolRes,
    SessionSetupReq,
    SessionSetupRes,
    ServiceDiscoveryReq,
    ServiceDiscoveryRes,
    ServiceDetailReq,
    ServiceDetailRes,
    PaymentServiceSelectionReq,
    PaymentServiceSelectionRes,
    PaymentDetailsReq,
    PaymentDetailsRes,
    CertificateInstallationReq,
    CertificateInstallationRes,
    AuthorizationSetupReq,
    AuthorizationSetupRes,
    AuthorizationReq,
    AuthorizationRes,
    ChargeParameterDiscoveryReq,
    ChargeParameterDiscoveryRes,
    ServiceSelectionReq,
    ServiceSelectionRes,
    ScheduleExchangeReq,
    ScheduleExchangeRes,
    CableCheckReq,
    CableCheckRes,
    PreChargeReq,
    PreChargeRes,
    PowerDeliveryReq,
    PowerDeliveryRes,
    ChargingStatusReq,
    ChargingStatusRes,
    CurrentDemandReq,
    CurrentDemandRes,
    ChargeLoopReq,
    ChargeLoopRes,
    MeteringReceiptReq,
    MeteringReceiptRes,
    WeldingDetectionReq,
    WeldingDetectionRes,
    SessionStopReq,
    SessionStopRes,
}

impl MessageKind {
    /// The response kind paired with this request kind, or `None` if
    /// this is already a response.
    pub fn paired_response(&self) -> Option<MessageKind> {
        use MessageKind::*;
        let res = match self {
            SupportedAppProtocolReq => SupportedAppProtocolRes,
            SessionSetupReq => SessionSetupRes,
            ServiceDiscoveryReq => ServiceDiscoveryRes,
            ServiceDetailReq => ServiceDetailRes,
            PaymentServiceSelectionReq => PaymentServiceSelectionRes,
            PaymentDetailsReq => PaymentDetailsRes,
            CertificateInstallationReq => CertificateInstallationRes,
            AuthorizationSetupReq => AuthorizationSetupRes,
            AuthorizationReq => AuthorizationRes,
            ChargeParameterDiscoveryReq => ChargeParameterDiscoveryRes,
            ServiceSelectionReq => ServiceSelectionRes,
            ScheduleExchangeReq => ScheduleExchangeRes,
            CableCheckReq => CableCheckRes,
            PreChargeReq => PreChargeRes,
            PowerDeliveryReq => PowerDeliveryRes,
            ChargingStatusReq => ChargingStatusRes,
            CurrentDemandReq => CurrentDemandRes,
            ChargeLoopReq => ChargeLoopRes,
            MeteringReceiptReq => MeteringReceiptRes,
            WeldingDetectionReq => WeldingDetectionRes,
            SessionStopReq => SessionStopRes,
            _ => return None,
        };
        Some(res)
    }

    pub fn is_request(&self) -> bool {
        self.paired_response().is_some()
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl MessageV2 {
    /// Kind tag of this message's body.
    pub fn body_kind(&self) -> MessageKind {
        kind_of_v2(&self.body)
    }
}

impl MessageV20 {
    /// Kind tag of this message's body.
    pub fn body_kind(&self) -> MessageKind {
        kind_of_v20(&self.body)
    }
}

fn kind_of_v2(body: &BodyV2) -> MessageKind {
    match body {
        BodyV2::SessionSetupReq(_) => MessageKind::SessionSetupReq,
        BodyV2::SessionSetupRes(_) => MessageKind::SessionSetupRes,
        BodyV2::ServiceDiscoveryReq(_) => MessageKind::ServiceDiscoveryReq,
        BodyV2::ServiceDiscoveryRes(_) => MessageKind::ServiceDiscoveryRes,
        BodyV2::ServiceDetailReq(_) => MessageKind::ServiceDetailReq,
        BodyV2::ServiceDetailRes(_) => MessageKind::ServiceDetailRes,
        BodyV2::PaymentServiceSelectionReq(_) => MessageKind::PaymentServiceSelectionReq,
        BodyV2::PaymentServiceSelectionRes(_) => MessageKind::PaymentServiceSelectionRes,
        BodyV2::PaymentDetailsReq(_) => MessageKind::PaymentDetailsReq,
        BodyV2::PaymentDetailsRes(_) => MessageKind::PaymentDetailsRes,
        BodyV2::CertificateInstallationReq(_) => MessageKind::CertificateInstallationReq,
        BodyV2::CertificateInstallationRes(_) => MessageKind::CertificateInstallationRes,
        BodyV2::AuthorizationReq(_) => MessageKind::AuthorizationReq,
        BodyV2::AuthorizationRes(_) => MessageKind::AuthorizationRes,
        BodyV2::ChargeParameterDiscoveryReq(_) => MessageKind::ChargeParameterDiscoveryReq,
        BodyV2::ChargeParameterDiscoveryRes(_) => MessageKind::ChargeParameterDiscoveryRes,
        BodyV2::CableCheckReq(_) => MessageKind::CableCheckReq,
        BodyV2::CableCheckRes(_) => MessageKind::CableCheckRes,
        BodyV2::PreChargeReq(_) => MessageKind::PreChargeReq,
        BodyV2::PreChargeRes(_) => MessageKind::PreChargeRes,
        BodyV2::PowerDeliveryReq(_) => MessageKind::PowerDeliveryReq,
        BodyV2::PowerDeliveryRes(_) => MessageKind::PowerDeliveryRes,
        BodyV2::ChargingStatusReq(_) => MessageKind::ChargingStatusReq,
        BodyV2::ChargingStatusRes(_) => MessageKind::ChargingStatusRes,
        BodyV2::CurrentDemandReq(_) => MessageKind::CurrentDemandReq,
        BodyV2::CurrentDemandRes(_) => MessageKind::CurrentDemandRes,
        BodyV2::MeteringReceiptReq(_) => MessageKind::MeteringReceiptReq,
        BodyV2::MeteringReceiptRes(_) => MessageKind::MeteringReceiptRes,
        BodyV2::WeldingDetectionReq(_) => MessageKind::WeldingDetectionReq,
        BodyV2::WeldingDetectionRes(_) => MessageKind::WeldingDetectionRes,
        BodyV2::SessionStopReq(_) => MessageKind::SessionStopReq,
        BodyV2::SessionStopRes(_) => MessageKind::SessionStopRes,
    }
}

fn kind_of_v20(body: &BodyV20) -> MessageKind {
    match body {
        BodyV20::SessionSetupReq(_) => MessageKind::SessionSetupReq,
        BodyV20::SessionSetupRes(_) => MessageKind::SessionSetupRes,
        BodyV20::AuthorizationSetupReq(_) => MessageKind::AuthorizationSetupReq,
        BodyV20::AuthorizationSetupRes(_) => MessageKind::AuthorizationSetupRes,
        BodyV20::AuthorizationReq(_) => MessageKind::AuthorizationReq,
        BodyV20::AuthorizationRes(_) => MessageKind::AuthorizationRes,
        BodyV20::ServiceDiscoveryReq(_) => MessageKind::ServiceDiscoveryReq,
        BodyV20::ServiceDiscoveryRes(_) => MessageKind::ServiceDiscoveryRes,
        BodyV20::ServiceDetailReq(_) => MessageKind::ServiceDetailReq,
        BodyV20::ServiceDetailRes(_) => MessageKind::ServiceDetailRes,
        BodyV20::ServiceSelectionReq(_) => MessageKind::ServiceSelectionReq,
        BodyV20::ServiceSelectionRes(_) => MessageKind::ServiceSelectionRes,
        BodyV20::DcChargeParameterDiscoveryReq(_) => MessageKind::ChargeParameterDiscoveryReq,
        BodyV20::DcChargeParameterDiscoveryRes(_) => MessageKind::ChargeParameterDiscoveryRes,
        BodyV20::ScheduleExchangeReq(_) => MessageKind::ScheduleExchangeReq,
        BodyV20::ScheduleExchangeRes(_) => MessageKind::ScheduleExchangeRes,
        BodyV20::DcCableCheckReq(_) => MessageKind::CableCheckReq,
        BodyV20::DcCableCheckRes(_) => MessageKind::CableCheckRes,
        BodyV20::DcPreChargeReq(_) => MessageKind::PreChargeReq,
        BodyV20::DcPreChargeRes(_) => MessageKind::PreChargeRes,
        BodyV20::PowerDeliveryReq(_) => MessageKind::PowerDeliveryReq,
        BodyV20::PowerDeliveryRes(_) => MessageKind::PowerDeliveryRes,
        BodyV20::DcChargeLoopReq(_) => MessageKind::ChargeLoopReq,
        BodyV20::DcChargeLoopRes(_) => MessageKind::ChargeLoopRes,
        BodyV20::DcWeldingDetectionReq(_) => MessageKind::WeldingDetectionReq,
        BodyV20::DcWeldingDetectionRes(_) => MessageKind::WeldingDetectionRes,
        BodyV20::SessionStopReq(_) => MessageKind::SessionStopReq,
        BodyV20::SessionStopRes(_) => MessageKind::SessionStopRes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_is_total_over_requests() {
        let reqs = [
            MessageKind::SupportedAppProtocolReq,
            MessageKind::SessionSetupReq,
            MessageKind::CurrentDemandReq,
            MessageKind::ChargeLoopReq,
            MessageKind::SessionStopReq,
        ];
        for r in reqs {
            let res = r.paired_response().unwrap();
            assert!(!res.is_request());
        }
    }

    #[test]
    fn responses_have_no_pair() {
        assert_eq!(MessageKind::SessionSetupRes.paired_response(), None);
        assert_eq!(MessageKind::SupportedAppProtocolRes.paired_response(), None);
    }
}
