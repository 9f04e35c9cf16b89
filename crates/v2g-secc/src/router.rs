//! The SECC transition table
//!
//! The single authority on which request kinds are legal in which
//! state. A miss maps to FAILED_SequenceError and session termination.

use v2g_core::messages::MessageKind;

/// SECC states, named for the phase whose requests they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeccState {
    SupportedAppProtocol,
    SessionSetup,
    /// -20 only: between SessionSetup and Authorization
    AuthorizationSetup,
    Authorization,
    ServiceDiscovery,
    /// ServiceDetail / PaymentServiceSelection (-2) or ServiceDetail /
    /// ServiceSelection (-20)
    ServiceSelection,
    /// CertificateInstallation / PaymentDetails / Authorization (-2 PnC)
    Payment,
    ChargeParameterDiscovery,
    /// -20 only: after charge parameter discovery
    ScheduleExchange,
    /// PowerDelivery(Start) or the DC pre-charging branch
    ChargeLoopEntry,
    CableCheck,
    PreCharge,
    ChargingLoop,
    /// After PowerDelivery(Stop)
    PostCharge,
    Terminated,
}

impl std::fmt::Display for SeccState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Whether `kind` is a legal request in `state`.
pub fn allowed(state: SeccState, kind: MessageKind) -> bool {
    use MessageKind::*;
    match state {
        SeccState::SupportedAppProtocol => matches!(kind, SupportedAppProtocolReq),
        SeccState::SessionSetup => matches!(kind, SessionSetupReq),
        SeccState::AuthorizationSetup => matches!(kind, AuthorizationSetupReq | SessionStopReq),
        SeccState::Authorization => matches!(kind, AuthorizationReq | SessionStopReq),
        SeccState::ServiceDiscovery => matches!(kind, ServiceDiscoveryReq | SessionStopReq),
        SeccState::ServiceSelection => matches!(
            kind,
            ServiceDetailReq | PaymentServiceSelectionReq | ServiceSelectionReq | SessionStopReq
        ),
        SeccState::Payment => matches!(
            kind,
            CertificateInstallationReq | PaymentDetailsReq | AuthorizationReq | SessionStopReq
        ),
        SeccState::ChargeParameterDiscovery => {
            matches!(kind, ChargeParameterDiscoveryReq | SessionStopReq)
        }
        SeccState::ScheduleExchange => matches!(kind, ScheduleExchangeReq | SessionStopReq),
        SeccState::ChargeLoopEntry => {
            matches!(kind, PowerDeliveryReq | CableCheckReq | SessionStopReq)
        }
        SeccState::CableCheck => matches!(kind, CableCheckReq | PreChargeReq | SessionStopReq),
        SeccState::PreCharge => matches!(kind, PreChargeReq | PowerDeliveryReq | SessionStopReq),
        SeccState::ChargingLoop => matches!(
            kind,
            ChargingStatusReq
                | CurrentDemandReq
                | ChargeLoopReq
                | MeteringReceiptReq
                | PowerDeliveryReq
                | SessionStopReq
        ),
        SeccState::PostCharge => matches!(kind, WeldingDetectionReq | SessionStopReq),
        SeccState::Terminated => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_accepts_only_session_setup() {
        assert!(allowed(SeccState::SessionSetup, MessageKind::SessionSetupReq));
        assert!(!allowed(
            SeccState::SessionSetup,
            MessageKind::ChargeParameterDiscoveryReq
        ));
        assert!(!allowed(SeccState::SessionSetup, MessageKind::SessionStopReq));
    }

    #[test]
    fn charging_loop_accepts_loop_and_stop() {
        for kind in [
            MessageKind::ChargingStatusReq,
            MessageKind::CurrentDemandReq,
            MessageKind::ChargeLoopReq,
            MessageKind::PowerDeliveryReq,
            MessageKind::MeteringReceiptReq,
            MessageKind::SessionStopReq,
        ] {
            assert!(allowed(SeccState::ChargingLoop, kind), "{:?}", kind);
        }
        assert!(!allowed(SeccState::ChargingLoop, MessageKind::SessionSetupReq));
    }

    #[test]
    fn terminated_accepts_nothing() {
        assert!(!allowed(SeccState::Terminated, MessageKind::SessionStopReq));
    }

    #[test]
    fn responses_are_never_legal_requests() {
        assert!(!allowed(
            SeccState::ChargingLoop,
            MessageKind::CurrentDemandRes
        ));
        assert!(!allowed(
            SeccState::SupportedAppProtocol,
            MessageKind::SupportedAppProtocolRes
        ));
    }
}
