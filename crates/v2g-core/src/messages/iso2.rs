//! ISO 15118-2 message bodies
//!
//! One struct per request/response, fields trimmed to the schema's
//! mandatory elements plus the optionals the state machines act on.
//! All physical quantities keep the schema's unit-and-multiplier form.

use super::common::{
    CertificateChain, ChargingSession, DetachedSignature, EnergyTransferMode, EvseNotification,
    EvseProcessing, MeterInfo, PaymentOption, PhysicalValue,
};
use crate::session::SessionId;

/// V2G message header (-2): session id plus an optional detached
/// signature for the PnC flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderV2 {
    pub session_id: SessionId,
    pub signature: Option<DetachedSignature>,
}

impl HeaderV2 {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            signature: None,
        }
    }
}

/// Response codes of the -2 schema (subset the stack produces and
/// reacts to; FAILED_* obliges the EVCC to terminate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCodeV2 {
    Ok,
    OkNewSessionEstablished,
    OkOldSessionJoined,
    OkCertificateExpiresSoon,
    Failed,
    FailedSequenceError,
    FailedServiceIdInvalid,
    FailedUnknownSession,
    FailedServiceSelectionInvalid,
    FailedPaymentSelectionInvalid,
    FailedCertificateExpired,
    FailedSignatureError,
    FailedNoCertificateAvailable,
    FailedCertChainError,
    FailedChallengeInvalid,
    FailedContractCanceled,
    FailedWrongChargeParameter,
    FailedPowerDeliveryNotApplied,
    FailedTariffSelectionInvalid,
    FailedChargingProfileInvalid,
    FailedMeteringSignatureNotValid,
    FailedNoChargeService,
    FailedWrongEnergyTransferMode,
    FailedContactorError,
    FailedCertificateNotAllowedAtThisEvse,
    FailedCertificateRevoked,
}

impl ResponseCodeV2 {
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            ResponseCodeV2::Ok
                | ResponseCodeV2::OkNewSessionEstablished
                | ResponseCodeV2::OkOldSessionJoined
                | ResponseCodeV2::OkCertificateExpiresSoon
        )
    }
}

// =============================================================================
// EVSE / EV status types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcEvseStatus {
    pub notification_max_delay: u16,
    pub evse_notification: EvseNotification,
    pub rcd: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Invalid,
    Valid,
    Warning,
    Fault,
    NoImd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcEvseStatusCode {
    NotReady,
    Ready,
    Shutdown,
    UtilityInterruptEvent,
    IsolationMonitoringActive,
    EmergencyShutdown,
    Malfunction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcEvseStatus {
    pub notification_max_delay: u16,
    pub evse_notification: EvseNotification,
    pub evse_isolation_status: Option<IsolationLevel>,
    pub evse_status_code: DcEvseStatusCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcEvErrorCode {
    NoError,
    FailedRessTemperatureInhibit,
    FailedEvShiftPosition,
    FailedChargerConnectorLockFault,
    FailedEvRessMalfunction,
    FailedChargingCurrentDifferential,
    FailedChargingVoltageOutOfRange,
    ReservedByIso,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcEvStatus {
    pub ev_ready: bool,
    pub ev_error_code: DcEvErrorCode,
    /// State of charge, 0..=100
    pub ev_ress_soc: i8,
}

/// Either-side EVSE status as used by PowerDelivery / MeteringReceipt
/// responses, where the schema picks AC or DC by energy mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvseStatus {
    Ac(AcEvseStatus),
    Dc(DcEvseStatus),
}

impl EvseStatus {
    pub fn notification(&self) -> EvseNotification {
        match self {
            EvseStatus::Ac(s) => s.evse_notification,
            EvseStatus::Dc(s) => s.evse_notification,
        }
    }
}

// =============================================================================
// Service discovery types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCategory {
    EvCharging,
    Internet,
    ContractCertificate,
    OtherCustom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeService {
    pub service_id: u16,
    pub service_name: Option<String>,
    pub free_service: bool,
    pub supported_energy_transfer_modes: Vec<EnergyTransferMode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub service_id: u16,
    pub service_name: Option<String>,
    pub service_category: ServiceCategory,
    pub free_service: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedService {
    pub service_id: u16,
    pub parameter_set_id: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterValue {
    Bool(bool),
    Int(i32),
    Physical(PhysicalValue),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: ParameterValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    pub parameter_set_id: u16,
    pub parameters: Vec<Parameter>,
}

// =============================================================================
// Charge parameter / schedule types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcEvChargeParameter {
    pub departure_time: Option<u32>,
    pub e_amount: PhysicalValue,
    pub ev_max_voltage: PhysicalValue,
    pub ev_max_current: PhysicalValue,
    pub ev_min_current: PhysicalValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcEvChargeParameter {
    pub departure_time: Option<u32>,
    pub dc_ev_status: DcEvStatus,
    pub ev_maximum_current_limit: PhysicalValue,
    pub ev_maximum_power_limit: Option<PhysicalValue>,
    pub ev_maximum_voltage_limit: PhysicalValue,
    pub ev_energy_capacity: Option<PhysicalValue>,
    pub ev_energy_request: Option<PhysicalValue>,
    pub full_soc: Option<i8>,
    pub bulk_soc: Option<i8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvChargeParameter {
    Ac(AcEvChargeParameter),
    Dc(DcEvChargeParameter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcEvseChargeParameter {
    pub ac_evse_status: AcEvseStatus,
    pub evse_nominal_voltage: PhysicalValue,
    pub evse_max_current: PhysicalValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DcEvseChargeParameter {
    pub dc_evse_status: DcEvseStatus,
    pub evse_maximum_current_limit: PhysicalValue,
    pub evse_maximum_power_limit: PhysicalValue,
    pub evse_maximum_voltage_limit: PhysicalValue,
    pub evse_minimum_current_limit: PhysicalValue,
    pub evse_minimum_voltage_limit: PhysicalValue,
    pub evse_peak_current_ripple: PhysicalValue,
    pub evse_energy_to_be_delivered: Option<PhysicalValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvseChargeParameter {
    Ac(AcEvseChargeParameter),
    Dc(DcEvseChargeParameter),
}

/// One power ceiling window of a PMaxSchedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PMaxScheduleEntry {
    /// Seconds from schedule start
    pub start: u32,
    /// Window length in seconds; last entry may leave it open
    pub duration: Option<u32>,
    pub p_max: PhysicalValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesTariffEntry {
    pub start: u32,
    pub duration: Option<u32>,
    pub e_price_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesTariff {
    pub sales_tariff_id: u8,
    pub sales_tariff_description: Option<String>,
    pub entries: Vec<SalesTariffEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaScheduleTuple {
    pub sa_schedule_tuple_id: u8,
    pub p_max_schedule: Vec<PMaxScheduleEntry>,
    pub sales_tariff: Option<SalesTariff>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeProgress {
    Start,
    Stop,
    Renegotiate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargingProfileEntry {
    pub start: u32,
    pub max_power: PhysicalValue,
    pub max_phases: Option<i8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargingProfile {
    pub entries: Vec<ChargingProfileEntry>,
}

// =============================================================================
// Request / response bodies
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetupReq {
    /// EVCC MAC-derived identifier
    pub evcc_id: [u8; 6],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetupRes {
    pub response_code: ResponseCodeV2,
    pub evse_id: String,
    pub evse_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDiscoveryReq {
    pub service_scope: Option<String>,
    pub service_category: Option<ServiceCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDiscoveryRes {
    pub response_code: ResponseCodeV2,
    pub payment_options: Vec<PaymentOption>,
    pub charge_service: ChargeService,
    pub service_list: Vec<Service>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetailReq {
    pub service_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDetailRes {
    pub response_code: ResponseCodeV2,
    pub service_id: u16,
    pub service_parameter_list: Vec<ParameterSet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentServiceSelectionReq {
    pub selected_payment_option: PaymentOption,
    pub selected_services: Vec<SelectedService>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentServiceSelectionRes {
    pub response_code: ResponseCodeV2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetailsReq {
    pub emaid: String,
    pub contract_certificate_chain: CertificateChain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetailsRes {
    pub response_code: ResponseCodeV2,
    pub gen_challenge: [u8; 16],
    pub evse_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInstallationReq {
    /// Fragment id the header signature refers to
    pub id: String,
    pub oem_provisioning_certificate_chain: CertificateChain,
    pub list_of_root_certificate_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInstallationRes {
    pub response_code: ResponseCodeV2,
    pub sa_provisioning_certificate_chain: CertificateChain,
    pub contract_signature_cert_chain: CertificateChain,
    pub encrypted_private_key: Vec<u8>,
    pub dh_public_key: Vec<u8>,
    pub emaid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationReq {
    /// Fragment id the header signature refers to (PnC only)
    pub id: Option<String>,
    pub gen_challenge: Option<[u8; 16]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRes {
    pub response_code: ResponseCodeV2,
    pub evse_processing: EvseProcessing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeParameterDiscoveryReq {
    pub max_entries_sa_schedule_tuple: Option<u16>,
    pub requested_energy_transfer_mode: EnergyTransferMode,
    pub ev_charge_parameter: EvChargeParameter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeParameterDiscoveryRes {
    pub response_code: ResponseCodeV2,
    pub evse_processing: EvseProcessing,
    pub sa_schedule_list: Vec<SaScheduleTuple>,
    pub evse_charge_parameter: EvseChargeParameter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CableCheckReq {
    pub dc_ev_status: DcEvStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CableCheckRes {
    pub response_code: ResponseCodeV2,
    pub dc_evse_status: DcEvseStatus,
    pub evse_processing: EvseProcessing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreChargeReq {
    pub dc_ev_status: DcEvStatus,
    pub ev_target_voltage: PhysicalValue,
    pub ev_target_current: PhysicalValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreChargeRes {
    pub response_code: ResponseCodeV2,
    pub dc_evse_status: DcEvseStatus,
    pub evse_present_voltage: PhysicalValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerDeliveryReq {
    pub charge_progress: ChargeProgress,
    pub sa_schedule_tuple_id: u8,
    pub charging_profile: Option<ChargingProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerDeliveryRes {
    pub response_code: ResponseCodeV2,
    pub evse_status: EvseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargingStatusReq;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargingStatusRes {
    pub response_code: ResponseCodeV2,
    pub evse_id: String,
    pub sa_schedule_tuple_id: u8,
    pub evse_max_current: Option<PhysicalValue>,
    pub meter_info: Option<MeterInfo>,
    pub receipt_required: Option<bool>,
    pub ac_evse_status: AcEvseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentDemandReq {
    pub dc_ev_status: DcEvStatus,
    pub ev_target_current: PhysicalValue,
    pub ev_target_voltage: PhysicalValue,
    pub ev_maximum_voltage_limit: Option<PhysicalValue>,
    pub ev_maximum_current_limit: Option<PhysicalValue>,
    pub ev_maximum_power_limit: Option<PhysicalValue>,
    pub bulk_charging_complete: Option<bool>,
    pub charging_complete: bool,
    pub remaining_time_to_full_soc: Option<PhysicalValue>,
    pub remaining_time_to_bulk_soc: Option<PhysicalValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentDemandRes {
    pub response_code: ResponseCodeV2,
    pub dc_evse_status: DcEvseStatus,
    pub evse_present_voltage: PhysicalValue,
    pub evse_present_current: PhysicalValue,
    pub evse_current_limit_achieved: bool,
    pub evse_voltage_limit_achieved: bool,
    pub evse_power_limit_achieved: bool,
    pub evse_maximum_voltage_limit: Option<PhysicalValue>,
    pub evse_maximum_current_limit: Option<PhysicalValue>,
    pub evse_maximum_power_limit: Option<PhysicalValue>,
    pub evse_id: String,
    pub sa_schedule_tuple_id: u8,
    pub meter_info: Option<MeterInfo>,
    pub receipt_required: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteringReceiptReq {
    pub id: Option<String>,
    pub session_id: SessionId,
    pub sa_schedule_tuple_id: Option<u8>,
    pub meter_info: MeterInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeteringReceiptRes {
    pub response_code: ResponseCodeV2,
    pub evse_status: EvseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeldingDetectionReq {
    pub dc_ev_status: DcEvStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeldingDetectionRes {
    pub response_code: ResponseCodeV2,
    pub dc_evse_status: DcEvseStatus,
    pub evse_present_voltage: PhysicalValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStopReq {
    pub charging_session: ChargingSession,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStopRes {
    pub response_code: ResponseCodeV2,
}

/// All -2 bodies, one variant per schema element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyV2 {
    SessionSetupReq(SessionSetupReq),
    SessionSetupRes(SessionSetupRes),
    ServiceDiscoveryReq(ServiceDiscoveryReq),
    ServiceDiscoveryRes(ServiceDiscoveryRes),
    ServiceDetailReq(ServiceDetailReq),
    ServiceDetailRes(ServiceDetailRes),
    PaymentServiceSelectionReq(PaymentServiceSelectionReq),
    PaymentServiceSelectionRes(PaymentServiceSelectionRes),
    PaymentDetailsReq(PaymentDetailsReq),
    PaymentDetailsRes(PaymentDetailsRes),
    CertificateInstallationReq(CertificateInstallationReq),
    CertificateInstallationRes(CertificateInstallationRes),
    AuthorizationReq(AuthorizationReq),
    AuthorizationRes(AuthorizationRes),
    ChargeParameterDiscoveryReq(ChargeParameterDiscoveryReq),
    ChargeParameterDiscoveryRes(ChargeParameterDiscoveryRes),
    CableCheckReq(CableCheckReq),
    CableCheckRes(CableCheckRes),
    PreChargeReq(PreChargeReq),
    PreChargeRes(PreChargeRes),
    PowerDeliveryReq(PowerDeliveryReq),
    PowerDeliveryRes(PowerDeliveryRes),
    ChargingStatusReq(ChargingStatusReq),
    ChargingStatusRes(ChargingStatusRes),
    CurrentDemandReq(CurrentDemandReq),
    CurrentDemandRes(CurrentDemandRes),
    MeteringReceiptReq(MeteringReceiptReq),
    MeteringReceiptRes(MeteringReceiptRes),
    WeldingDetectionReq(WeldingDetectionReq),
    WeldingDetectionRes(WeldingDetectionRes),
    SessionStopReq(SessionStopReq),
    SessionStopRes(SessionStopRes),
}

/// A complete -2 message: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageV2 {
    pub header: HeaderV2,
    pub body: BodyV2,
}

impl MessageV2 {
    pub fn new(session_id: SessionId, body: BodyV2) -> Self {
        Self {
            header: HeaderV2::new(session_id),
            body,
        }
    }

    /// Response code carried by this body, if it is a response.
    pub fn response_code(&self) -> Option<ResponseCodeV2> {
        match &self.body {
            BodyV2::SessionSetupRes(b) => Some(b.response_code),
            BodyV2::ServiceDiscoveryRes(b) => Some(b.response_code),
            BodyV2::ServiceDetailRes(b) => Some(b.response_code),
            BodyV2::PaymentServiceSelectionRes(b) => Some(b.response_code),
            BodyV2::PaymentDetailsRes(b) => Some(b.response_code),
            BodyV2::CertificateInstallationRes(b) => Some(b.response_code),
            BodyV2::AuthorizationRes(b) => Some(b.response_code),
            BodyV2::ChargeParameterDiscoveryRes(b) => Some(b.response_code),
            BodyV2::CableCheckRes(b) => Some(b.response_code),
            BodyV2::PreChargeRes(b) => Some(b.response_code),
            BodyV2::PowerDeliveryRes(b) => Some(b.response_code),
            BodyV2::ChargingStatusRes(b) => Some(b.response_code),
            BodyV2::CurrentDemandRes(b) => Some(b.response_code),
            BodyV2::MeteringReceiptRes(b) => Some(b.response_code),
            BodyV2::WeldingDetectionRes(b) => Some(b.response_code),
            BodyV2::SessionStopRes(b) => Some(b.response_code),
            _ => None,
        }
    }
}
