//! ISO 15118-20 message bodies (common messages plus the DC branch)
//!
//! The -20 header always carries a timestamp; physical quantities use
//! the RationalNumber form.

use super::common::{
    CertificateChain, ChargingSession, DetachedSignature, MeterInfo, RationalNumber,
};
use crate::session::SessionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderV20 {
    pub session_id: SessionId,
    /// Unix epoch seconds at send time
    pub timestamp: u64,
    pub signature: Option<DetachedSignature>,
}

impl HeaderV20 {
    pub fn new(session_id: SessionId, timestamp: u64) -> Self {
        Self {
            session_id,
            timestamp,
            signature: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCodeV20 {
    Ok,
    OkCertificateExpiresSoon,
    OkNewSessionEstablished,
    OkOldSessionJoined,
    OkPowerToleranceConfirmed,
    WarningAuthorizationSelectionInvalid,
    WarningCertificateExpired,
    WarningChallengeInvalid,
    Failed,
    FailedSequenceError,
    FailedUnknownSession,
    FailedAuthorizationSelectionInvalid,
    FailedCertificateExpired,
    FailedCertificateChainError,
    FailedCertificateRevoked,
    FailedSignatureError,
    FailedChallengeInvalid,
    FailedWrongChargeParameter,
    FailedScheduleSelectionInvalid,
    FailedPowerDeliveryNotApplied,
    FailedServiceSelectionInvalid,
    FailedNoEnergyTransferServiceSelected,
}

impl ResponseCodeV20 {
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            ResponseCodeV20::Ok
                | ResponseCodeV20::OkCertificateExpiresSoon
                | ResponseCodeV20::OkNewSessionEstablished
                | ResponseCodeV20::OkOldSessionJoined
                | ResponseCodeV20::OkPowerToleranceConfirmed
        ) || self.is_warning()
    }

    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ResponseCodeV20::WarningAuthorizationSelectionInvalid
                | ResponseCodeV20::WarningCertificateExpired
                | ResponseCodeV20::WarningChallengeInvalid
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processing {
    Finished,
    Ongoing,
    OngoingWaitingForCustomerInteraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationType {
    Eim,
    Pnc,
}

/// EVSE-to-EV instruction carried in the -20 charge loop status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvseNotificationV20 {
    Pause,
    ExitStandby,
    Terminate,
    ScheduleRenegotiation,
    ServiceRenegotiation,
    MeteringConfirmation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvseStatusV20 {
    pub notification_max_delay: u16,
    pub evse_notification: EvseNotificationV20,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceV20 {
    pub service_id: u16,
    pub free_service: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedServiceV20 {
    pub service_id: u16,
    pub parameter_set_id: u16,
}

// =============================================================================
// Request / response bodies
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetupReqV20 {
    pub evcc_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetupResV20 {
    pub response_code: ResponseCodeV20,
    pub evse_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationSetupReq;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationSetupRes {
    pub response_code: ResponseCodeV20,
    pub authorization_services: Vec<AuthorizationType>,
    pub certificate_installation_service: bool,
    /// Present iff PnC is offered
    pub gen_challenge: Option<[u8; 16]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationReqV20 {
    pub selected_authorization_service: AuthorizationType,
    /// PnC only: echoed challenge, signed via the header signature
    pub gen_challenge: Option<[u8; 16]>,
    pub contract_certificate_chain: Option<CertificateChain>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResV20 {
    pub response_code: ResponseCodeV20,
    pub evse_processing: Processing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDiscoveryReqV20 {
    pub supported_service_ids: Option<Vec<u16>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDiscoveryResV20 {
    pub response_code: ResponseCodeV20,
    pub service_renegotiation_supported: bool,
    pub energy_transfer_service_list: Vec<ServiceV20>,
    pub vas_list: Vec<ServiceV20>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetailReqV20 {
    pub service_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetailResV20 {
    pub response_code: ResponseCodeV20,
    pub service_id: u16,
    pub parameter_set_ids: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSelectionReq {
    pub selected_energy_transfer_service: SelectedServiceV20,
    pub selected_vas_list: Vec<SelectedServiceV20>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSelectionRes {
    pub response_code: ResponseCodeV20,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcChargeParameterDiscoveryReq {
    pub ev_maximum_charge_power: RationalNumber,
    pub ev_minimum_charge_power: RationalNumber,
    pub ev_maximum_charge_current: RationalNumber,
    pub ev_minimum_charge_current: RationalNumber,
    pub ev_maximum_voltage: RationalNumber,
    pub ev_minimum_voltage: RationalNumber,
    pub target_soc: Option<i8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcChargeParameterDiscoveryRes {
    pub response_code: ResponseCodeV20,
    pub evse_maximum_charge_power: RationalNumber,
    pub evse_minimum_charge_power: RationalNumber,
    pub evse_maximum_charge_current: RationalNumber,
    pub evse_minimum_charge_current: RationalNumber,
    pub evse_maximum_voltage: RationalNumber,
    pub evse_minimum_voltage: RationalNumber,
    pub evse_power_ramp_limitation: Option<RationalNumber>,
}

/// One supporting point of a -20 schedule (offset + power ceiling).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerScheduleEntryV20 {
    pub duration: u32,
    pub power: RationalNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleTupleV20 {
    pub schedule_tuple_id: u8,
    pub schedule_entries: Vec<PowerScheduleEntryV20>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleExchangeReq {
    pub maximum_supporting_points: u16,
    pub departure_time: Option<u32>,
    pub ev_target_energy_request: Option<RationalNumber>,
    pub ev_maximum_energy_request: Option<RationalNumber>,
    pub ev_minimum_energy_request: Option<RationalNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleExchangeRes {
    pub response_code: ResponseCodeV20,
    pub evse_processing: Processing,
    pub schedule_tuples: Vec<ScheduleTupleV20>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcCableCheckReq;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcCableCheckRes {
    pub response_code: ResponseCodeV20,
    pub evse_processing: Processing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcPreChargeReq {
    pub ev_processing: Processing,
    pub ev_present_voltage: RationalNumber,
    pub ev_target_voltage: RationalNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcPreChargeRes {
    pub response_code: ResponseCodeV20,
    pub evse_present_voltage: RationalNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeProgressV20 {
    Start,
    Stop,
    Standby,
    ScheduleRenegotiation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerDeliveryReqV20 {
    pub ev_processing: Processing,
    pub charge_progress: ChargeProgressV20,
    pub selected_schedule_tuple_id: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerDeliveryResV20 {
    pub response_code: ResponseCodeV20,
    pub evse_status: Option<EvseStatusV20>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcChargeLoopReq {
    pub ev_present_voltage: RationalNumber,
    pub ev_target_current: RationalNumber,
    pub ev_target_voltage: RationalNumber,
    pub present_soc: Option<i8>,
    pub charging_complete: bool,
    pub meter_info_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcChargeLoopRes {
    pub response_code: ResponseCodeV20,
    pub evse_present_current: RationalNumber,
    pub evse_present_voltage: RationalNumber,
    pub evse_power_limit_achieved: bool,
    pub evse_current_limit_achieved: bool,
    pub evse_voltage_limit_achieved: bool,
    pub evse_status: Option<EvseStatusV20>,
    pub meter_info: Option<MeterInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcWeldingDetectionReq {
    pub ev_processing: Processing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcWeldingDetectionRes {
    pub response_code: ResponseCodeV20,
    pub evse_present_voltage: RationalNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStopReqV20 {
    pub charging_session: ChargingSession,
    pub ev_termination_code: Option<String>,
    pub ev_termination_explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStopResV20 {
    pub response_code: ResponseCodeV20,
}

/// All -20 bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyV20 {
    SessionSetupReq(SessionSetupReqV20),
    SessionSetupRes(SessionSetupResV20),
    AuthorizationSetupReq(AuthorizationSetupReq),
    AuthorizationSetupRes(AuthorizationSetupRes),
    AuthorizationReq(AuthorizationReqV20),
    AuthorizationRes(AuthorizationResV20),
    ServiceDiscoveryReq(ServiceDiscoveryReqV20),
    ServiceDiscoveryRes(ServiceDiscoveryResV20),
    ServiceDetailReq(ServiceDetailReqV20),
    ServiceDetailRes(ServiceDetailResV20),
    ServiceSelectionReq(ServiceSelectionReq),
    ServiceSelectionRes(ServiceSelectionRes),
    DcChargeParameterDiscoveryReq(DcChargeParameterDiscoveryReq),
    DcChargeParameterDiscoveryRes(DcChargeParameterDiscoveryRes),
    ScheduleExchangeReq(ScheduleExchangeReq),
    ScheduleExchangeRes(ScheduleExchangeRes),
    DcCableCheckReq(DcCableCheckReq),
    DcCableCheckRes(DcCableCheckRes),
    DcPreChargeReq(DcPreChargeReq),
    DcPreChargeRes(DcPreChargeRes),
    PowerDeliveryReq(PowerDeliveryReqV20),
    PowerDeliveryRes(PowerDeliveryResV20),
    DcChargeLoopReq(DcChargeLoopReq),
    DcChargeLoopRes(DcChargeLoopRes),
    DcWeldingDetectionReq(DcWeldingDetectionReq),
    DcWeldingDetectionRes(DcWeldingDetectionRes),
    SessionStopReq(SessionStopReqV20),
    SessionStopRes(SessionStopResV20),
}

/// A complete -20 message: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageV20 {
    pub header: HeaderV20,
    pub body: BodyV20,
}

impl MessageV20 {
    pub fn new(session_id: SessionId, timestamp: u64, body: BodyV20) -> Self {
        Self {
            header: HeaderV20::new(session_id, timestamp),
            body,
        }
    }

    pub fn response_code(&self) -> Option<ResponseCodeV20> {
        match &self.body {
            BodyV20::SessionSetupRes(b) => Some(b.response_code),
            BodyV20::AuthorizationSetupRes(b) => Some(b.response_code),
            BodyV20::AuthorizationRes(b) => Some(b.response_code),
            BodyV20::ServiceDiscoveryRes(b) => Some(b.response_code),
            BodyV20::ServiceDetailRes(b) => Some(b.response_code),
            BodyV20::ServiceSelectionRes(b) => Some(b.response_code),
            BodyV20::DcChargeParameterDiscoveryRes(b) => Some(b.response_code),
            BodyV20::ScheduleExchangeRes(b) => Some(b.response_code),
            BodyV20::DcCableCheckRes(b) => Some(b.response_code),
            BodyV20::DcPreChargeRes(b) => Some(b.response_code),
            BodyV20::PowerDeliveryRes(b) => Some(b.response_code),
            BodyV20::DcChargeLoopRes(b) => Some(b.response_code),
            BodyV20::DcWeldingDetectionRes(b) => Some(b.response_code),
            BodyV20::SessionStopRes(b) => Some(b.response_code),
            _ => None,
        }
    }
}
