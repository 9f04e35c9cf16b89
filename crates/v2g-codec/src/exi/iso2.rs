//! Schema-informed grammar for the ISO 15118-2 message set
//!
//! One writer/reader pair per schema type. Event codes follow the
//! declaration order of the body elements; enumeration tables follow
//! the schema's lexical order. Strict mode: any deviation is a
//! [`CodecError`], never a silent repair.

use v2g_core::messages::common::{
    CertificateChain, ChargingSession, DetachedSignature, EnergyTransferMode, EvseNotification,
    EvseProcessing, MeterInfo, PaymentOption, PhysicalValue, UnitSymbol,
};
use v2g_core::messages::iso2::*;
use v2g_core::session::SessionId;

use super::primitives::*;
use crate::bitio::{BitReader, BitWriter};
use crate::error::CodecError;

// =============================================================================
// Enumeration tables
// =============================================================================

const RESPONSE_CODES: &[ResponseCodeV2] = &[
    ResponseCodeV2::Ok,
    ResponseCodeV2::OkNewSessionEstablished,
    ResponseCodeV2::OkOldSessionJoined,
    ResponseCodeV2::OkCertificateExpiresSoon,
    ResponseCodeV2::Failed,
    ResponseCodeV2::FailedSequenceError,
    ResponseCodeV2::FailedServiceIdInvalid,
    ResponseCodeV2::FailedUnknownSession,
    ResponseCodeV2::FailedServiceSelectionInvalid,
    ResponseCodeV2::FailedPaymentSelectionInvalid,
    ResponseCodeV2::FailedCertificateExpired,
    ResponseCodeV2::FailedSignatureError,
    ResponseCodeV2::FailedNoCertificateAvailable,
    ResponseCodeV2::FailedCertChainError,
    ResponseCodeV2::FailedChallengeInvalid,
    ResponseCodeV2::FailedContractCanceled,
    ResponseCodeV2::FailedWrongChargeParameter,
    ResponseCodeV2::FailedPowerDeliveryNotApplied,
    ResponseCodeV2::FailedTariffSelectionInvalid,
    ResponseCodeV2::FailedChargingProfileInvalid,
    ResponseCodeV2::FailedMeteringSignatureNotValid,
    ResponseCodeV2::FailedNoChargeService,
    ResponseCodeV2::FailedWrongEnergyTransferMode,
    ResponseCodeV2::FailedContactorError,
    ResponseCodeV2::FailedCertificateNotAllowedAtThisEvse,
    ResponseCodeV2::FailedCertificateRevoked,
];

const UNIT_SYMBOLS: &[UnitSymbol] = &[
    UnitSymbol::Hours,
    UnitSymbol::Minutes,
    UnitSymbol::Seconds,
    UnitSymbol::Amperes,
    UnitSymbol::Volts,
    UnitSymbol::Watts,
    UnitSymbol::WattHours,
];

const PAYMENT_OPTIONS: &[PaymentOption] =
    &[PaymentOption::Contract, PaymentOption::ExternalPayment];

const ENERGY_TRANSFER_MODES: &[EnergyTransferMode] = &[
    EnergyTransferMode::AcSinglePhaseCore,
    EnergyTransferMode::AcThreePhaseCore,
    EnergyTransferMode::DcCore,
    EnergyTransferMode::DcExtended,
    EnergyTransferMode::DcComboCore,
    EnergyTransferMode::DcUnique,
];

const EVSE_PROCESSING: &[EvseProcessing] = &[
    EvseProcessing::Finished,
    EvseProcessing::Ongoing,
    EvseProcessing::OngoingWaitingForCustomerInteraction,
];

const EVSE_NOTIFICATIONS: &[EvseNotification] = &[
    EvseNotification::None,
    EvseNotification::StopCharging,
    EvseNotification::ReNegotiation,
];

const ISOLATION_LEVELS: &[IsolationLevel] = &[
    IsolationLevel::Invalid,
    IsolationLevel::Valid,
    IsolationLevel::Warning,
    IsolationLevel::Fault,
    IsolationLevel::NoImd,
];

const DC_EVSE_STATUS_CODES: &[DcEvseStatusCode] = &[
    DcEvseStatusCode::NotReady,
    DcEvseStatusCode::Ready,
    DcEvseStatusCode::Shutdown,
    DcEvseStatusCode::UtilityInterruptEvent,
    DcEvseStatusCode::IsolationMonitoringActive,
    DcEvseStatusCode::EmergencyShutdown,
    DcEvseStatusCode::Malfunction,
];

const DC_EV_ERROR_CODES: &[DcEvErrorCode] = &[
    DcEvErrorCode::NoError,
    DcEvErrorCode::FailedRessTemperatureInhibit,
    DcEvErrorCode::FailedEvShiftPosition,
    DcEvErrorCode::FailedChargerConnectorLockFault,
    DcEvErrorCode::FailedEvRessMalfunction,
    DcEvErrorCode::FailedChargingCurrentDifferential,
    DcEvErrorCode::FailedChargingVoltageOutOfRange,
    DcEvErrorCode::ReservedByIso,
];

const SERVICE_CATEGORIES: &[ServiceCategory] = &[
    ServiceCategory::EvCharging,
    ServiceCategory::Internet,
    ServiceCategory::ContractCertificate,
    ServiceCategory::OtherCustom,
];

const CHARGE_PROGRESS: &[ChargeProgress] = &[
    ChargeProgress::Start,
    ChargeProgress::Stop,
    ChargeProgress::Renegotiate,
];

const CHARGING_SESSIONS: &[ChargingSession] =
    &[ChargingSession::Terminate, ChargingSession::Pause];

// =============================================================================
// Shared complex types
// =============================================================================

pub fn write_session_id(w: &mut BitWriter, id: &SessionId) {
    write_bytes(w, id.as_bytes());
}

pub fn read_session_id(r: &mut BitReader) -> Result<SessionId, CodecError> {
    Ok(SessionId(read_bytes_exact::<8>(r, "Header.SessionID")?))
}

fn write_signature(w: &mut BitWriter, s: &DetachedSignature) -> Result<(), CodecError> {
    write_string(w, &s.referenced_id);
    write_bytes(w, &s.digest);
    write_bytes(w, &s.signature_value);
    Ok(())
}

fn read_signature(r: &mut BitReader) -> Result<DetachedSignature, CodecError> {
    Ok(DetachedSignature {
        referenced_id: read_string(r)?,
        digest: read_bytes(r)?,
        signature_value: read_bytes(r)?,
    })
}

pub fn write_header(w: &mut BitWriter, h: &HeaderV2) -> Result<(), CodecError> {
    write_session_id(w, &h.session_id);
    write_option_res(w, &h.signature, write_signature)
}

pub fn read_header(r: &mut BitReader) -> Result<HeaderV2, CodecError> {
    Ok(HeaderV2 {
        session_id: read_session_id(r)?,
        signature: read_option(r, read_signature)?,
    })
}

fn write_physical_value(w: &mut BitWriter, p: &PhysicalValue) -> Result<(), CodecError> {
    write_i8(w, p.multiplier);
    write_enum(w, UNIT_SYMBOLS, p.unit, "PhysicalValue.Unit")?;
    write_i16(w, p.value);
    Ok(())
}

fn read_physical_value(r: &mut BitReader) -> Result<PhysicalValue, CodecError> {
    Ok(PhysicalValue {
        multiplier: read_i8(r, "PhysicalValue.Multiplier")?,
        unit: read_enum(r, UNIT_SYMBOLS, "PhysicalValue.Unit")?,
        value: read_i16(r, "PhysicalValue.Value")?,
    })
}

fn write_response_code(w: &mut BitWriter, c: ResponseCodeV2) -> Result<(), CodecError> {
    write_enum(w, RESPONSE_CODES, c, "ResponseCode")
}

fn read_response_code(r: &mut BitReader) -> Result<ResponseCodeV2, CodecError> {
    read_enum(r, RESPONSE_CODES, "ResponseCode")
}

fn write_ac_evse_status(w: &mut BitWriter, s: &AcEvseStatus) -> Result<(), CodecError> {
    write_u16(w, s.notification_max_delay);
    write_enum(w, EVSE_NOTIFICATIONS, s.evse_notification, "EVSENotification")?;
    write_bool(w, s.rcd);
    Ok(())
}

fn read_ac_evse_status(r: &mut BitReader) -> Result<AcEvseStatus, CodecError> {
    Ok(AcEvseStatus {
        notification_max_delay: read_u16(r, "AC_EVSEStatus.NotificationMaxDelay")?,
        evse_notification: read_enum(r, EVSE_NOTIFICATIONS, "EVSENotification")?,
        rcd: read_bool(r)?,
    })
}

fn write_dc_evse_status(w: &mut BitWriter, s: &DcEvseStatus) -> Result<(), CodecError> {
    write_u16(w, s.notification_max_delay);
    write_enum(w, EVSE_NOTIFICATIONS, s.evse_notification, "EVSENotification")?;
    write_option_res(w, &s.evse_isolation_status, |w, l| {
        write_enum(w, ISOLATION_LEVELS, *l, "EVSEIsolationStatus")
    })?;
    write_enum(w, DC_EVSE_STATUS_CODES, s.evse_status_code, "EVSEStatusCode")
}

fn read_dc_evse_status(r: &mut BitReader) -> Result<DcEvseStatus, CodecError> {
    Ok(DcEvseStatus {
        notification_max_delay: read_u16(r, "DC_EVSEStatus.NotificationMaxDelay")?,
        evse_notification: read_enum(r, EVSE_NOTIFICATIONS, "EVSENotification")?,
        evse_isolation_status: read_option(r, |r| {
            read_enum(r, ISOLATION_LEVELS, "EVSEIsolationStatus")
        })?,
        evse_status_code: read_enum(r, DC_EVSE_STATUS_CODES, "EVSEStatusCode")?,
    })
}

fn write_dc_ev_status(w: &mut BitWriter, s: &DcEvStatus) -> Result<(), CodecError> {
    write_bool(w, s.ev_ready);
    write_enum(w, DC_EV_ERROR_CODES, s.ev_error_code, "EVErrorCode")?;
    write_soc(w, s.ev_ress_soc);
    Ok(())
}

fn read_dc_ev_status(r: &mut BitReader) -> Result<DcEvStatus, CodecError> {
    Ok(DcEvStatus {
        ev_ready: read_bool(r)?,
        ev_error_code: read_enum(r, DC_EV_ERROR_CODES, "EVErrorCode")?,
        ev_ress_soc: read_soc(r)?,
    })
}

fn write_evse_status(w: &mut BitWriter, s: &EvseStatus) -> Result<(), CodecError> {
    match s {
        EvseStatus::Ac(ac) => {
            w.write_bit(false);
            write_ac_evse_status(w, ac)
        }
        EvseStatus::Dc(dc) => {
            w.write_bit(true);
            write_dc_evse_status(w, dc)
        }
    }
}

fn read_evse_status(r: &mut BitReader) -> Result<EvseStatus, CodecError> {
    if r.read_bit()? {
        Ok(EvseStatus::Dc(read_dc_evse_status(r)?))
    } else {
        Ok(EvseStatus::Ac(read_ac_evse_status(r)?))
    }
}

fn write_certificate_chain(w: &mut BitWriter, c: &CertificateChain) -> Result<(), CodecError> {
    write_option(w, &c.id, |w, id| write_string(w, id));
    write_list(w, &c.certificates, |w, der| {
        write_bytes(w, der);
        Ok(())
    })
}

fn read_certificate_chain(r: &mut BitReader) -> Result<CertificateChain, CodecError> {
    Ok(CertificateChain {
        id: read_option(r, read_string)?,
        certificates: read_list(r, 5, "CertificateChain.Certificate", read_bytes)?,
    })
}

fn write_meter_info(w: &mut BitWriter, m: &MeterInfo) -> Result<(), CodecError> {
    write_string(w, &m.meter_id);
    write_option(w, &m.meter_reading, |w, v| write_uint(w, *v));
    write_option(w, &m.sig_meter_reading, |w, v| write_bytes(w, v));
    write_option_res(w, &m.meter_status, |w, v| {
        write_i16(w, *v);
        Ok(())
    })?;
    write_option_res(w, &m.t_meter, |w, v| {
        write_int(w, *v);
        Ok(())
    })
}

fn read_meter_info(r: &mut BitReader) -> Result<MeterInfo, CodecError> {
    Ok(MeterInfo {
        meter_id: read_string(r)?,
        meter_reading: read_option(r, read_uint)?,
        sig_meter_reading: read_option(r, read_bytes)?,
        meter_status: read_option(r, |r| read_i16(r, "MeterInfo.MeterStatus"))?,
        t_meter: read_option(r, read_int)?,
    })
}

fn write_service_category(w: &mut BitWriter, c: ServiceCategory) -> Result<(), CodecError> {
    write_enum(w, SERVICE_CATEGORIES, c, "ServiceCategory")
}

fn write_charge_service(w: &mut BitWriter, s: &ChargeService) -> Result<(), CodecError> {
    write_u16(w, s.service_id);
    write_option(w, &s.service_name, |w, n| write_string(w, n));
    write_bool(w, s.free_service);
    write_list(w, &s.supported_energy_transfer_modes, |w, m| {
        write_enum(w, ENERGY_TRANSFER_MODES, *m, "EnergyTransferMode")
    })
}

fn read_charge_service(r: &mut BitReader) -> Result<ChargeService, CodecError> {
    Ok(ChargeService {
        service_id: read_u16(r, "ChargeService.ServiceID")?,
        service_name: read_option(r, read_string)?,
        free_service: read_bool(r)?,
        supported_energy_transfer_modes: read_list(r, 6, "EnergyTransferMode", |r| {
            read_enum(r, ENERGY_TRANSFER_MODES, "EnergyTransferMode")
        })?,
    })
}

fn write_service(w: &mut BitWriter, s: &Service) -> Result<(), CodecError> {
    write_u16(w, s.service_id);
    write_option(w, &s.service_name, |w, n| write_string(w, n));
    write_service_category(w, s.service_category)?;
    write_bool(w, s.free_service);
    Ok(())
}

fn read_service(r: &mut BitReader) -> Result<Service, CodecError> {
    Ok(Service {
        service_id: read_u16(r, "Service.ServiceID")?,
        service_name: read_option(r, read_string)?,
        service_category: read_enum(r, SERVICE_CATEGORIES, "ServiceCategory")?,
        free_service: read_bool(r)?,
    })
}

fn write_selected_service(w: &mut BitWriter, s: &SelectedService) -> Result<(), CodecError> {
    write_u16(w, s.service_id);
    write_option(w, &s.parameter_set_id, |w, v| write_u16(w, *v));
    Ok(())
}

fn read_selected_service(r: &mut BitReader) -> Result<SelectedService, CodecError> {
    Ok(SelectedService {
        service_id: read_u16(r, "SelectedService.ServiceID")?,
        parameter_set_id: read_option(r, |r| read_u16(r, "SelectedService.ParameterSetID"))?,
    })
}

fn write_parameter(w: &mut BitWriter, p: &Parameter) -> Result<(), CodecError> {
    write_string(w, &p.name);
    match &p.value {
        ParameterValue::Bool(b) => {
            w.write_bits(0, 2);
            write_bool(w, *b);
        }
        ParameterValue::Int(i) => {
            w.write_bits(1, 2);
            write_int(w, i64::from(*i));
        }
        ParameterValue::Physical(v) => {
            w.write_bits(2, 2);
            write_physical_value(w, v)?;
        }
        ParameterValue::Text(s) => {
            w.write_bits(3, 2);
            write_string(w, s);
        }
    }
    Ok(())
}

fn read_parameter(r: &mut BitReader) -> Result<Parameter, CodecError> {
    let name = read_string(r)?;
    let value = match r.read_bits(2)? {
        0 => ParameterValue::Bool(read_bool(r)?),
        1 => {
            let v = read_int(r)?;
            let v = i32::try_from(v).map_err(|_| CodecError::ValueOutOfRange {
                context: "Parameter.intValue",
                value: v,
            })?;
            ParameterValue::Int(v)
        }
        2 => ParameterValue::Physical(read_physical_value(r)?),
        _ => ParameterValue::Text(read_string(r)?),
    };
    Ok(Parameter { name, value })
}

fn write_parameter_set(w: &mut BitWriter, s: &ParameterSet) -> Result<(), CodecError> {
    write_u16(w, s.parameter_set_id);
    write_list(w, &s.parameters, write_parameter)
}

fn read_parameter_set(r: &mut BitReader) -> Result<ParameterSet, CodecError> {
    Ok(ParameterSet {
        parameter_set_id: read_u16(r, "ParameterSet.ParameterSetID")?,
        parameters: read_list(r, 16, "ParameterSet.Parameter", read_parameter)?,
    })
}

fn write_ac_ev_charge_parameter(
    w: &mut BitWriter,
    p: &AcEvChargeParameter,
) -> Result<(), CodecError> {
    write_option(w, &p.departure_time, |w, v| write_u32(w, *v));
    write_physical_value(w, &p.e_amount)?;
    write_physical_value(w, &p.ev_max_voltage)?;
    write_physical_value(w, &p.ev_max_current)?;
    write_physical_value(w, &p.ev_min_current)
}

fn read_ac_ev_charge_parameter(r: &mut BitReader) -> Result<AcEvChargeParameter, CodecError> {
    Ok(AcEvChargeParameter {
        departure_time: read_option(r, |r| read_u32(r, "AC_EVChargeParameter.DepartureTime"))?,
        e_amount: read_physical_value(r)?,
        ev_max_voltage: read_physical_value(r)?,
        ev_max_current: read_physical_value(r)?,
        ev_min_current: read_physical_value(r)?,
    })
}

fn write_dc_ev_charge_parameter(
    w: &mut BitWriter,
    p: &DcEvChargeParameter,
) -> Result<(), CodecError> {
    write_option(w, &p.departure_time, |w, v| write_u32(w, *v));
    write_dc_ev_status(w, &p.dc_ev_status)?;
    write_physical_value(w, &p.ev_maximum_current_limit)?;
    write_option_res(w, &p.ev_maximum_power_limit, write_physical_value)?;
    write_physical_value(w, &p.ev_maximum_voltage_limit)?;
    write_option_res(w, &p.ev_energy_capacity, write_physical_value)?;
    write_option_res(w, &p.ev_energy_request, write_physical_value)?;
    write_option(w, &p.full_soc, |w, v| write_soc(w, *v));
    write_option(w, &p.bulk_soc, |w, v| write_soc(w, *v));
    Ok(())
}

fn read_dc_ev_charge_parameter(r: &mut BitReader) -> Result<DcEvChargeParameter, CodecError> {
    Ok(DcEvChargeParameter {
        departure_time: read_option(r, |r| read_u32(r, "DC_EVChargeParameter.DepartureTime"))?,
        dc_ev_status: read_dc_ev_status(r)?,
        ev_maximum_current_limit: read_physical_value(r)?,
        ev_maximum_power_limit: read_option(r, read_physical_value)?,
        ev_maximum_voltage_limit: read_physical_value(r)?,
        ev_energy_capacity: read_option(r, read_physical_value)?,
        ev_energy_request: read_option(r, read_physical_value)?,
        full_soc: read_option(r, read_soc)?,
        bulk_soc: read_option(r, read_soc)?,
    })
}

fn write_ev_charge_parameter(w: &mut BitWriter, p: &EvChargeParameter) -> Result<(), CodecError> {
    match p {
        EvChargeParameter::Ac(ac) => {
            w.write_bit(false);
            write_ac_ev_charge_parameter(w, ac)
        }
        EvChargeParameter::Dc(dc) => {
            w.write_bit(true);
            write_dc_ev_charge_parameter(w, dc)
        }
    }
}

fn read_ev_charge_parameter(r: &mut BitReader) -> Result<EvChargeParameter, CodecError> {
    if r.read_bit()? {
        Ok(EvChargeParameter::Dc(read_dc_ev_charge_parameter(r)?))
    } else {
        Ok(EvChargeParameter::Ac(read_ac_ev_charge_parameter(r)?))
    }
}

fn write_ac_evse_charge_parameter(
    w: &mut BitWriter,
    p: &AcEvseChargeParameter,
) -> Result<(), CodecError> {
    write_ac_evse_status(w, &p.ac_evse_status)?;
    write_physical_value(w, &p.evse_nominal_voltage)?;
    write_physical_value(w, &p.evse_max_current)
}

fn read_ac_evse_charge_parameter(r: &mut BitReader) -> Result<AcEvseChargeParameter, CodecError> {
    Ok(AcEvseChargeParameter {
        ac_evse_status: read_ac_evse_status(r)?,
        evse_nominal_voltage: read_physical_value(r)?,
        evse_max_current: read_physical_value(r)?,
    })
}

fn write_dc_evse_charge_parameter(
    w: &mut BitWriter,
    p: &DcEvseChargeParameter,
) -> Result<(), CodecError> {
    write_dc_evse_status(w, &p.dc_evse_status)?;
    write_physical_value(w, &p.evse_maximum_current_limit)?;
    write_physical_value(w, &p.evse_maximum_power_limit)?;
    write_physical_value(w, &p.evse_maximum_voltage_limit)?;
    write_physical_value(w, &p.evse_minimum_current_limit)?;
    write_physical_value(w, &p.evse_minimum_voltage_limit)?;
    write_physical_value(w, &p.evse_peak_current_ripple)?;
    write_option_res(w, &p.evse_energy_to_be_delivered, write_physical_value)
}

fn read_dc_evse_charge_parameter(r: &mut BitReader) -> Result<DcEvseChargeParameter, CodecError> {
    Ok(DcEvseChargeParameter {
        dc_evse_status: read_dc_evse_status(r)?,
        evse_maximum_current_limit: read_physical_value(r)?,
        evse_maximum_power_limit: read_physical_value(r)?,
        evse_maximum_voltage_limit: read_physical_value(r)?,
        evse_minimum_current_limit: read_physical_value(r)?,
        evse_minimum_voltage_limit: read_physical_value(r)?,
        evse_peak_current_ripple: read_physical_value(r)?,
        evse_energy_to_be_delivered: read_option(r, read_physical_value)?,
    })
}

fn write_evse_charge_parameter(
    w: &mut BitWriter,
    p: &EvseChargeParameter,
) -> Result<(), CodecError> {
    match p {
        EvseChargeParameter::Ac(ac) => {
            w.write_bit(false);
            write_ac_evse_charge_parameter(w, ac)
        }
        EvseChargeParameter::Dc(dc) => {
            w.write_bit(true);
            write_dc_evse_charge_parameter(w, dc)
        }
    }
}

fn read_evse_charge_parameter(r: &mut BitReader) -> Result<EvseChargeParameter, CodecError> {
    if r.read_bit()? {
        Ok(EvseChargeParameter::Dc(read_dc_evse_charge_parameter(r)?))
    } else {
        Ok(EvseChargeParameter::Ac(read_ac_evse_charge_parameter(r)?))
    }
}

fn write_pmax_entry(w: &mut BitWriter, e: &PMaxScheduleEntry) -> Result<(), CodecError> {
    write_u32(w, e.start);
    write_option(w, &e.duration, |w, v| write_u32(w, *v));
    write_physical_value(w, &e.p_max)
}

fn read_pmax_entry(r: &mut BitReader) -> Result<PMaxScheduleEntry, CodecError> {
    Ok(PMaxScheduleEntry {
        start: read_u32(r, "PMaxScheduleEntry.start")?,
        duration: read_option(r, |r| read_u32(r, "PMaxScheduleEntry.duration"))?,
        p_max: read_physical_value(r)?,
    })
}

fn write_sales_tariff_entry(w: &mut BitWriter, e: &SalesTariffEntry) -> Result<(), CodecError> {
    write_u32(w, e.start);
    write_option(w, &e.duration, |w, v| write_u32(w, *v));
    write_option(w, &e.e_price_level, |w, v| write_u8(w, *v));
    Ok(())
}

fn read_sales_tariff_entry(r: &mut BitReader) -> Result<SalesTariffEntry, CodecError> {
    Ok(SalesTariffEntry {
        start: read_u32(r, "SalesTariffEntry.start")?,
        duration: read_option(r, |r| read_u32(r, "SalesTariffEntry.duration"))?,
        e_price_level: read_option(r, |r| read_u8(r, "SalesTariffEntry.EPriceLevel"))?,
    })
}

fn write_sales_tariff(w: &mut BitWriter, t: &SalesTariff) -> Result<(), CodecError> {
    write_u8(w, t.sales_tariff_id);
    write_option(w, &t.sales_tariff_description, |w, s| write_string(w, s));
    write_list(w, &t.entries, write_sales_tariff_entry)
}

fn read_sales_tariff(r: &mut BitReader) -> Result<SalesTariff, CodecError> {
    Ok(SalesTariff {
        sales_tariff_id: read_u8(r, "SalesTariff.SalesTariffID")?,
        sales_tariff_description: read_option(r, read_string)?,
        entries: read_list(r, 102, "SalesTariffEntry", read_sales_tariff_entry)?,
    })
}

fn write_sa_schedule_tuple(w: &mut BitWriter, t: &SaScheduleTuple) -> Result<(), CodecError> {
    write_u8(w, t.sa_schedule_tuple_id);
    write_list(w, &t.p_max_schedule, write_pmax_entry)?;
    write_option_res(w, &t.sales_tariff, write_sales_tariff)
}

fn read_sa_schedule_tuple(r: &mut BitReader) -> Result<SaScheduleTuple, CodecError> {
    Ok(SaScheduleTuple {
        sa_schedule_tuple_id: read_u8(r, "SAScheduleTuple.SAScheduleTupleID")?,
        p_max_schedule: read_list(r, 102, "PMaxScheduleEntry", read_pmax_entry)?,
        sales_tariff: read_option(r, read_sales_tariff)?,
    })
}

fn write_charging_profile(w: &mut BitWriter, p: &ChargingProfile) -> Result<(), CodecError> {
    write_list(w, &p.entries, |w, e| {
        write_u32(w, e.start);
        write_physical_value(w, &e.max_power)?;
        write_option(w, &e.max_phases, |w, v| write_i8(w, *v));
        Ok(())
    })
}

fn read_charging_profile(r: &mut BitReader) -> Result<ChargingProfile, CodecError> {
    Ok(ChargingProfile {
        entries: read_list(r, 24, "ProfileEntry", |r| {
            Ok(ChargingProfileEntry {
                start: read_u32(r, "ProfileEntry.start")?,
                max_power: read_physical_value(r)?,
                max_phases: read_option(r, |r| read_i8(r, "ProfileEntry.MaxNumberOfPhasesInUse"))?,
            })
        })?,
    })
}

// =============================================================================
// Body dispatch
// =============================================================================

/// Event-code width for the 32-element body substitution group.
const BODY_BITS: u8 = bits_for(32);

fn body_code(body: &BodyV2) -> u32 {
    match body {
        BodyV2::SessionSetupReq(_) => 0,
        BodyV2::SessionSetupRes(_) => 1,
        BodyV2::ServiceDiscoveryReq(_) => 2,
        BodyV2::ServiceDiscoveryRes(_) => 3,
        BodyV2::ServiceDetailReq(_) => 4,
        BodyV2::ServiceDetailRes(_) => 5,
        BodyV2::PaymentServiceSelectionReq(_) => 6,
        BodyV2::PaymentServiceSelectionRes(_) => 7,
        BodyV2::PaymentDetailsReq(_) => 8,
        BodyV2::PaymentDetailsRes(_) => 9,
        BodyV2::CertificateInstallationReq(_) => 10,
        BodyV2::CertificateInstallationRes(_) => 11,
        BodyV2::AuthorizationReq(_) => 12,
        BodyV2::AuthorizationRes(_) => 13,
        BodyV2::ChargeParameterDiscoveryReq(_) => 14,
        BodyV2::ChargeParameterDiscoveryRes(_) => 15,
        BodyV2::CableCheckReq(_) => 16,
        BodyV2::CableCheckRes(_) => 17,
        BodyV2::PreChargeReq(_) => 18,
        BodyV2::PreChargeRes(_) => 19,
        BodyV2::PowerDeliveryReq(_) => 20,
        BodyV2::PowerDeliveryRes(_) => 21,
        BodyV2::ChargingStatusReq(_) => 22,
        BodyV2::ChargingStatusRes(_) => 23,
        BodyV2::CurrentDemandReq(_) => 24,
        BodyV2::CurrentDemandRes(_) => 25,
        BodyV2::MeteringReceiptReq(_) => 26,
        BodyV2::MeteringReceiptRes(_) => 27,
        BodyV2::WeldingDetectionReq(_) => 28,
        BodyV2::WeldingDetectionRes(_) => 29,
        BodyV2::SessionStopReq(_) => 30,
        BodyV2::SessionStopRes(_) => 31,
    }
}

pub fn write_body(w: &mut BitWriter, body: &BodyV2) -> Result<(), CodecError> {
    w.write_bits(body_code(body), BODY_BITS);
    match body {
        BodyV2::SessionSetupReq(b) => {
            write_bytes(w, &b.evcc_id);
            Ok(())
        }
        BodyV2::SessionSetupRes(b) => {
            write_response_code(w, b.response_code)?;
            write_string(w, &b.evse_id);
            write_option_res(w, &b.evse_timestamp, |w, v| {
                write_int(w, *v);
                Ok(())
            })
        }
        BodyV2::ServiceDiscoveryReq(b) => {
            write_option(w, &b.service_scope, |w, s| write_string(w, s));
            write_option_res(w, &b.service_category, |w, c| write_service_category(w, *c))
        }
        BodyV2::ServiceDiscoveryRes(b) => {
            write_response_code(w, b.response_code)?;
            write_list(w, &b.payment_options, |w, p| {
                write_enum(w, PAYMENT_OPTIONS, *p, "PaymentOption")
            })?;
            write_charge_service(w, &b.charge_service)?;
            write_list(w, &b.service_list, write_service)
        }
        BodyV2::ServiceDetailReq(b) => {
            write_u16(w, b.service_id);
            Ok(())
        }
        BodyV2::ServiceDetailRes(b) => {
            write_response_code(w, b.response_code)?;
            write_u16(w, b.service_id);
            write_list(w, &b.service_parameter_list, write_parameter_set)
        }
        BodyV2::PaymentServiceSelectionReq(b) => {
            write_enum(
                w,
                PAYMENT_OPTIONS,
                b.selected_payment_option,
                "SelectedPaymentOption",
            )?;
            write_list(w, &b.selected_services, write_selected_service)
        }
        BodyV2::PaymentServiceSelectionRes(b) => write_response_code(w, b.response_code),
        BodyV2::PaymentDetailsReq(b) => {
            write_string(w, &b.emaid);
            write_certificate_chain(w, &b.contract_certificate_chain)
        }
        BodyV2::PaymentDetailsRes(b) => {
            write_response_code(w, b.response_code)?;
            write_bytes(w, &b.gen_challenge);
            write_int(w, b.evse_timestamp);
            Ok(())
        }
        BodyV2::CertificateInstallationReq(b) => {
            write_string(w, &b.id);
            write_certificate_chain(w, &b.oem_provisioning_certificate_chain)?;
            write_list(w, &b.list_of_root_certificate_ids, |w, id| {
                write_string(w, id);
                Ok(())
            })
        }
        BodyV2::CertificateInstallationRes(b) => {
            write_response_code(w, b.response_code)?;
            write_certificate_chain(w, &b.sa_provisioning_certificate_chain)?;
            write_certificate_chain(w, &b.contract_signature_cert_chain)?;
            write_bytes(w, &b.encrypted_private_key);
            write_bytes(w, &b.dh_public_key);
            write_string(w, &b.emaid);
            Ok(())
        }
        BodyV2::AuthorizationReq(b) => {
            write_option(w, &b.id, |w, id| write_string(w, id));
            write_option(w, &b.gen_challenge, |w, c| write_bytes(w, c));
            Ok(())
        }
        BodyV2::AuthorizationRes(b) => {
            write_response_code(w, b.response_code)?;
            write_enum(w, EVSE_PROCESSING, b.evse_processing, "EVSEProcessing")
        }
        BodyV2::ChargeParameterDiscoveryReq(b) => {
            write_option(w, &b.max_entries_sa_schedule_tuple, |w, v| write_u16(w, *v));
            write_enum(
                w,
                ENERGY_TRANSFER_MODES,
                b.requested_energy_transfer_mode,
                "RequestedEnergyTransferMode",
            )?;
            write_ev_charge_parameter(w, &b.ev_charge_parameter)
        }
        BodyV2::ChargeParameterDiscoveryRes(b) => {
            write_response_code(w, b.response_code)?;
            write_enum(w, EVSE_PROCESSING, b.evse_processing, "EVSEProcessing")?;
            write_list(w, &b.sa_schedule_list, write_sa_schedule_tuple)?;
            write_evse_charge_parameter(w, &b.evse_charge_parameter)
        }
        BodyV2::CableCheckReq(b) => write_dc_ev_status(w, &b.dc_ev_status),
        BodyV2::CableCheckRes(b) => {
            write_response_code(w, b.response_code)?;
            write_dc_evse_status(w, &b.dc_evse_status)?;
            write_enum(w, EVSE_PROCESSING, b.evse_processing, "EVSEProcessing")
        }
        BodyV2::PreChargeReq(b) => {
            write_dc_ev_status(w, &b.dc_ev_status)?;
            write_physical_value(w, &b.ev_target_voltage)?;
            write_physical_value(w, &b.ev_target_current)
        }
        BodyV2::PreChargeRes(b) => {
            write_response_code(w, b.response_code)?;
            write_dc_evse_status(w, &b.dc_evse_status)?;
            write_physical_value(w, &b.evse_present_voltage)
        }
        BodyV2::PowerDeliveryReq(b) => {
            write_enum(w, CHARGE_PROGRESS, b.charge_progress, "ChargeProgress")?;
            write_u8(w, b.sa_schedule_tuple_id);
            write_option_res(w, &b.charging_profile, write_charging_profile)
        }
        BodyV2::PowerDeliveryRes(b) => {
            write_response_code(w, b.response_code)?;
            write_evse_status(w, &b.evse_status)
        }
        BodyV2::ChargingStatusReq(_) => Ok(()),
        BodyV2::ChargingStatusRes(b) => {
            write_response_code(w, b.response_code)?;
            write_string(w, &b.evse_id);
            write_u8(w, b.sa_schedule_tuple_id);
            write_option_res(w, &b.evse_max_current, write_physical_value)?;
            write_option_res(w, &b.meter_info, write_meter_info)?;
            write_option(w, &b.receipt_required, |w, v| write_bool(w, *v));
            write_ac_evse_status(w, &b.ac_evse_status)
        }
        BodyV2::CurrentDemandReq(b) => {
            write_dc_ev_status(w, &b.dc_ev_status)?;
            write_physical_value(w, &b.ev_target_current)?;
            write_physical_value(w, &b.ev_target_voltage)?;
            write_option_res(w, &b.ev_maximum_voltage_limit, write_physical_value)?;
            write_option_res(w, &b.ev_maximum_current_limit, write_physical_value)?;
            write_option_res(w, &b.ev_maximum_power_limit, write_physical_value)?;
            write_option(w, &b.bulk_charging_complete, |w, v| write_bool(w, *v));
            write_bool(w, b.charging_complete);
            write_option_res(w, &b.remaining_time_to_full_soc, write_physical_value)?;
            write_option_res(w, &b.remaining_time_to_bulk_soc, write_physical_value)
        }
        BodyV2::CurrentDemandRes(b) => {
            write_response_code(w, b.response_code)?;
            write_dc_evse_status(w, &b.dc_evse_status)?;
            write_physical_value(w, &b.evse_present_voltage)?;
            write_physical_value(w, &b.evse_present_current)?;
            write_bool(w, b.evse_current_limit_achieved);
            write_bool(w, b.evse_voltage_limit_achieved);
            write_bool(w, b.evse_power_limit_achieved);
            write_option_res(w, &b.evse_maximum_voltage_limit, write_physical_value)?;
            write_option_res(w, &b.evse_maximum_current_limit, write_physical_value)?;
            write_option_res(w, &b.evse_maximum_power_limit, write_physical_value)?;
            write_string(w, &b.evse_id);
            write_u8(w, b.sa_schedule_tuple_id);
            write_option_res(w, &b.meter_info, write_meter_info)?;
            write_option(w, &b.receipt_required, |w, v| write_bool(w, *v));
            Ok(())
        }
        BodyV2::MeteringReceiptReq(b) => {
            write_option(w, &b.id, |w, id| write_string(w, id));
            write_session_id(w, &b.session_id);
            write_option(w, &b.sa_schedule_tuple_id, |w, v| write_u8(w, *v));
            write_meter_info(w, &b.meter_info)
        }
        BodyV2::MeteringReceiptRes(b) => {
            write_response_code(w, b.response_code)?;
            write_evse_status(w, &b.evse_status)
        }
        BodyV2::WeldingDetectionReq(b) => write_dc_ev_status(w, &b.dc_ev_status),
        BodyV2::WeldingDetectionRes(b) => {
            write_response_code(w, b.response_code)?;
            write_dc_evse_status(w, &b.dc_evse_status)?;
            write_physical_value(w, &b.evse_present_voltage)
        }
        BodyV2::SessionStopReq(b) => {
            write_enum(w, CHARGING_SESSIONS, b.charging_session, "ChargingSession")
        }
        BodyV2::SessionStopRes(b) => write_response_code(w, b.response_code),
    }
}

pub fn read_body(r: &mut BitReader) -> Result<BodyV2, CodecError> {
    let code = r.read_bits(BODY_BITS)?;
    let body = match code {
        0 => BodyV2::SessionSetupReq(SessionSetupReq {
            evcc_id: read_bytes_exact::<6>(r, "SessionSetupReq.EVCCID")?,
        }),
        1 => BodyV2::SessionSetupRes(SessionSetupRes {
            response_code: read_response_code(r)?,
            evse_id: read_string(r)?,
            evse_timestamp: read_option(r, read_int)?,
        }),
        2 => BodyV2::ServiceDiscoveryReq(ServiceDiscoveryReq {
            service_scope: read_option(r, read_string)?,
            service_category: read_option(r, |r| {
                read_enum(r, SERVICE_CATEGORIES, "ServiceCategory")
            })?,
        }),
        3 => BodyV2::ServiceDiscoveryRes(ServiceDiscoveryRes {
            response_code: read_response_code(r)?,
            payment_options: read_list(r, 2, "PaymentOption", |r| {
                read_enum(r, PAYMENT_OPTIONS, "PaymentOption")
            })?,
            charge_service: read_charge_service(r)?,
            service_list: read_list(r, 8, "Service", read_service)?,
        }),
        4 => BodyV2::ServiceDetailReq(ServiceDetailReq {
            service_id: read_u16(r, "ServiceDetailReq.ServiceID")?,
        }),
        5 => BodyV2::ServiceDetailRes(ServiceDetailRes {
            response_code: read_response_code(r)?,
            service_id: read_u16(r, "ServiceDetailRes.ServiceID")?,
            service_parameter_list: read_list(r, 255, "ParameterSet", read_parameter_set)?,
        }),
        6 => BodyV2::PaymentServiceSelectionReq(PaymentServiceSelectionReq {
            selected_payment_option: read_enum(r, PAYMENT_OPTIONS, "SelectedPaymentOption")?,
            selected_services: read_list(r, 16, "SelectedService", read_selected_service)?,
        }),
        7 => BodyV2::PaymentServiceSelectionRes(PaymentServiceSelectionRes {
            response_code: read_response_code(r)?,
        }),
        8 => BodyV2::PaymentDetailsReq(PaymentDetailsReq {
            emaid: read_string(r)?,
            contract_certificate_chain: read_certificate_chain(r)?,
        }),
        9 => BodyV2::PaymentDetailsRes(PaymentDetailsRes {
            response_code: read_response_code(r)?,
            gen_challenge: read_bytes_exact::<16>(r, "PaymentDetailsRes.GenChallenge")?,
            evse_timestamp: read_int(r)?,
        }),
        10 => BodyV2::CertificateInstallationReq(CertificateInstallationReq {
            id: read_string(r)?,
            oem_provisioning_certificate_chain: read_certificate_chain(r)?,
            list_of_root_certificate_ids: read_list(r, 20, "RootCertificateID", read_string)?,
        }),
        11 => BodyV2::CertificateInstallationRes(CertificateInstallationRes {
            response_code: read_response_code(r)?,
            sa_provisioning_certificate_chain: read_certificate_chain(r)?,
            contract_signature_cert_chain: read_certificate_chain(r)?,
            encrypted_private_key: read_bytes(r)?,
            dh_public_key: read_bytes(r)?,
            emaid: read_string(r)?,
        }),
        12 => BodyV2::AuthorizationReq(AuthorizationReq {
            id: read_option(r, read_string)?,
            gen_challenge: read_option(r, |r| {
                read_bytes_exact::<16>(r, "AuthorizationReq.GenChallenge")
            })?,
        }),
        13 => BodyV2::AuthorizationRes(AuthorizationRes {
            response_code: read_response_code(r)?,
            evse_processing: read_enum(r, EVSE_PROCESSING, "EVSEProcessing")?,
        }),
        14 => BodyV2::ChargeParameterDiscoveryReq(ChargeParameterDiscoveryReq {
            max_entries_sa_schedule_tuple: read_option(r, |r| {
                read_u16(r, "ChargeParameterDiscoveryReq.MaxEntriesSAScheduleTuple")
            })?,
            requested_energy_transfer_mode: read_enum(
                r,
                ENERGY_TRANSFER_MODES,
                "RequestedEnergyTransferMode",
            )?,
            ev_charge_parameter: read_ev_charge_parameter(r)?,
        }),
        15 => BodyV2::ChargeParameterDiscoveryRes(ChargeParameterDiscoveryRes {
            response_code: read_response_code(r)?,
            evse_processing: read_enum(r, EVSE_PROCESSING, "EVSEProcessing")?,
            sa_schedule_list: read_list(r, 3, "SAScheduleTuple", read_sa_schedule_tuple)?,
            evse_charge_parameter: read_evse_charge_parameter(r)?,
        }),
        16 => BodyV2::CableCheckReq(CableCheckReq {
            dc_ev_status: read_dc_ev_status(r)?,
        }),
        17 => BodyV2::CableCheckRes(CableCheckRes {
            response_code: read_response_code(r)?,
            dc_evse_status: read_dc_evse_status(r)?,
            evse_processing: read_enum(r, EVSE_PROCESSING, "EVSEProcessing")?,
        }),
        18 => BodyV2::PreChargeReq(PreChargeReq {
            dc_ev_status: read_dc_ev_status(r)?,
            ev_target_voltage: read_physical_value(r)?,
            ev_target_current: read_physical_value(r)?,
        }),
        19 => BodyV2::PreChargeRes(PreChargeRes {
            response_code: read_response_code(r)?,
            dc_evse_status: read_dc_evse_status(r)?,
            evse_present_voltage: read_physical_value(r)?,
        }),
        20 => BodyV2::PowerDeliveryReq(PowerDeliveryReq {
            charge_progress: read_enum(r, CHARGE_PROGRESS, "ChargeProgress")?,
            sa_schedule_tuple_id: read_u8(r, "PowerDeliveryReq.SAScheduleTupleID")?,
            charging_profile: read_option(r, read_charging_profile)?,
        }),
        21 => BodyV2::PowerDeliveryRes(PowerDeliveryRes {
            response_code: read_response_code(r)?,
            evse_status: read_evse_status(r)?,
        }),
        22 => BodyV2::ChargingStatusReq(ChargingStatusReq),
        23 => BodyV2::ChargingStatusRes(ChargingStatusRes {
            response_code: read_response_code(r)?,
            evse_id: read_string(r)?,
            sa_schedule_tuple_id: read_u8(r, "ChargingStatusRes.SAScheduleTupleID")?,
            evse_max_current: read_option(r, read_physical_value)?,
            meter_info: read_option(r, read_meter_info)?,
            receipt_required: read_option(r, read_bool)?,
            ac_evse_status: read_ac_evse_status(r)?,
        }),
        24 => BodyV2::CurrentDemandReq(CurrentDemandReq {
            dc_ev_status: read_dc_ev_status(r)?,
            ev_target_current: read_physical_value(r)?,
            ev_target_voltage: read_physical_value(r)?,
            ev_maximum_voltage_limit: read_option(r, read_physical_value)?,
            ev_maximum_current_limit: read_option(r, read_physical_value)?,
            ev_maximum_power_limit: read_option(r, read_physical_value)?,
            bulk_charging_complete: read_option(r, read_bool)?,
            charging_complete: read_bool(r)?,
            remaining_time_to_full_soc: read_option(r, read_physical_value)?,
            remaining_time_to_bulk_soc: read_option(r, read_physical_value)?,
        }),
        25 => BodyV2::CurrentDemandRes(CurrentDemandRes {
            response_code: read_response_code(r)?,
            dc_evse_status: read_dc_evse_status(r)?,
            evse_present_voltage: read_physical_value(r)?,
            evse_present_current: read_physical_value(r)?,
            evse_current_limit_achieved: read_bool(r)?,
            evse_voltage_limit_achieved: read_bool(r)?,
            evse_power_limit_achieved: read_bool(r)?,
            evse_maximum_voltage_limit: read_option(r, read_physical_value)?,
            evse_maximum_current_limit: read_option(r, read_physical_value)?,
            evse_maximum_power_limit: read_option(r, read_physical_value)?,
            evse_id: read_string(r)?,
            sa_schedule_tuple_id: read_u8(r, "CurrentDemandRes.SAScheduleTupleID")?,
            meter_info: read_option(r, read_meter_info)?,
            receipt_required: read_option(r, read_bool)?,
        }),
        26 => BodyV2::MeteringReceiptReq(MeteringReceiptReq {
            id: read_option(r, read_string)?,
            session_id: read_session_id(r)?,
            sa_schedule_tuple_id: read_option(r, |r| {
                read_u8(r, "MeteringReceiptReq.SAScheduleTupleID")
            })?,
            meter_info: read_meter_info(r)?,
        }),
        27 => BodyV2::MeteringReceiptRes(MeteringReceiptRes {
            response_code: read_response_code(r)?,
            evse_status: read_evse_status(r)?,
        }),
        28 => BodyV2::WeldingDetectionReq(WeldingDetectionReq {
            dc_ev_status: read_dc_ev_status(r)?,
        }),
        29 => BodyV2::WeldingDetectionRes(WeldingDetectionRes {
            response_code: read_response_code(r)?,
            dc_evse_status: read_dc_evse_status(r)?,
            evse_present_voltage: read_physical_value(r)?,
        }),
        30 => BodyV2::SessionStopReq(SessionStopReq {
            charging_session: read_enum(r, CHARGING_SESSIONS, "ChargingSession")?,
        }),
        31 => BodyV2::SessionStopRes(SessionStopRes {
            response_code: read_response_code(r)?,
        }),
        code => {
            return Err(CodecError::UnknownEventCode {
                context: "V2G_Message.Body",
                code,
            })
        }
    };
    Ok(body)
}

pub fn write_message(w: &mut BitWriter, m: &MessageV2) -> Result<(), CodecError> {
    write_header(w, &m.header)?;
    write_body(w, &m.body)
}

pub fn read_message(r: &mut BitReader) -> Result<MessageV2, CodecError> {
    Ok(MessageV2 {
        header: read_header(r)?,
        body: read_body(r)?,
    })
}
