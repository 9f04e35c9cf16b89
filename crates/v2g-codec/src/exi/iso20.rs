//! Schema-informed grammar for the ISO 15118-20 message set
//!
//! -20 encodes each message as its own root element, so the event code
//! selecting the message comes first, followed by header and payload.

use v2g_core::messages::common::{
    CertificateChain, ChargingSession, DetachedSignature, MeterInfo, RationalNumber,
};
use v2g_core::messages::iso20::*;
use v2g_core::session::SessionId;

use super::primitives::*;
use crate::bitio::{BitReader, BitWriter};
use crate::error::CodecError;

const RESPONSE_CODES: &[ResponseCodeV20] = &[
    ResponseCodeV20::Ok,
    ResponseCodeV20::OkCertificateExpiresSoon,
    ResponseCodeV20::OkNewSessionEstablished,
    ResponseCodeV20::OkOldSessionJoined,
    ResponseCodeV20::OkPowerToleranceConfirmed,
    ResponseCodeV20::WarningAuthorizationSelectionInvalid,
    ResponseCodeV20::WarningCertificateExpired,
    ResponseCodeV20::WarningChallengeInvalid,
    ResponseCodeV20::Failed,
    ResponseCodeV20::FailedSequenceError,
    ResponseCodeV20::FailedUnknownSession,
    ResponseCodeV20::FailedAuthorizationSelectionInvalid,
    ResponseCodeV20::FailedCertificateExpired,
    ResponseCodeV20::FailedCertificateChainError,
    ResponseCodeV20::FailedCertificateRevoked,
    ResponseCodeV20::FailedSignatureError,
    ResponseCodeV20::FailedChallengeInvalid,
    ResponseCodeV20::FailedWrongChargeParameter,
    ResponseCodeV20::FailedScheduleSelectionInvalid,
    ResponseCodeV20::FailedPowerDeliveryNotApplied,
    ResponseCodeV20::FailedServiceSelectionInvalid,
    ResponseCodeV20::FailedNoEnergyTransferServiceSelected,
];

const PROCESSING: &[Processing] = &[
    Processing::Finished,
    Processing::Ongoing,
    Processing::OngoingWaitingForCustomerInteraction,
];

const AUTHORIZATION_TYPES: &[AuthorizationType] =
    &[AuthorizationType::Eim, AuthorizationType::Pnc];

const EVSE_NOTIFICATIONS: &[EvseNotificationV20] = &[
    EvseNotificationV20::Pause,
    EvseNotificationV20::ExitStandby,
    EvseNotificationV20::Terminate,
    EvseNotificationV20::ScheduleRenegotiation,
    EvseNotificationV20::ServiceRenegotiation,
    EvseNotificationV20::MeteringConfirmation,
];

const CHARGE_PROGRESS: &[ChargeProgressV20] = &[
    ChargeProgressV20::Start,
    ChargeProgressV20::Stop,
    ChargeProgressV20::Standby,
    ChargeProgressV20::ScheduleRenegotiation,
];

const CHARGING_SESSIONS: &[ChargingSession] =
    &[ChargingSession::Terminate, ChargingSession::Pause];

fn write_rational(w: &mut BitWriter, v: &RationalNumber) {
    write_i8(w, v.exponent);
    write_i16(w, v.value);
}

fn read_rational(r: &mut BitReader) -> Result<RationalNumber, CodecError> {
    Ok(RationalNumber {
        exponent: read_i8(r, "RationalNumber.Exponent")?,
        value: read_i16(r, "RationalNumber.Value")?,
    })
}

fn write_signature(w: &mut BitWriter, s: &DetachedSignature) {
    write_string(w, &s.referenced_id);
    write_bytes(w, &s.digest);
    write_bytes(w, &s.signature_value);
}

fn read_signature(r: &mut BitReader) -> Result<DetachedSignature, CodecError> {
    Ok(DetachedSignature {
        referenced_id: read_string(r)?,
        digest: read_bytes(r)?,
        signature_value: read_bytes(r)?,
    })
}

pub fn write_header(w: &mut BitWriter, h: &HeaderV20) -> Result<(), CodecError> {
    write_bytes(w, h.session_id.as_bytes());
    write_uint(w, h.timestamp);
    write_option(w, &h.signature, write_signature);
    Ok(())
}

pub fn read_header(r: &mut BitReader) -> Result<HeaderV20, CodecError> {
    Ok(HeaderV20 {
        session_id: SessionId(read_bytes_exact::<8>(r, "MessageHeader.SessionID")?),
        timestamp: read_uint(r)?,
        signature: read_option(r, read_signature)?,
    })
}

fn write_response_code(w: &mut BitWriter, c: ResponseCodeV20) -> Result<(), CodecError> {
    write_enum(w, RESPONSE_CODES, c, "ResponseCode")
}

fn read_response_code(r: &mut BitReader) -> Result<ResponseCodeV20, CodecError> {
    read_enum(r, RESPONSE_CODES, "ResponseCode")
}

fn write_evse_status(w: &mut BitWriter, s: &EvseStatusV20) -> Result<(), CodecError> {
    write_u16(w, s.notification_max_delay);
    write_enum(w, EVSE_NOTIFICATIONS, s.evse_notification, "EVSENotification")
}

fn read_evse_status(r: &mut BitReader) -> Result<EvseStatusV20, CodecError> {
    Ok(EvseStatusV20 {
        notification_max_delay: read_u16(r, "EVSEStatus.NotificationMaxDelay")?,
        evse_notification: read_enum(r, EVSE_NOTIFICATIONS, "EVSENotification")?,
    })
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

fn write_service(w: &mut BitWriter, s: &ServiceV20) -> Result<(), CodecError> {
    write_u16(w, s.service_id);
    write_bool(w, s.free_service);
    Ok(())
}

fn read_service(r: &mut BitReader) -> Result<ServiceV20, CodecError> {
    Ok(ServiceV20 {
        service_id: read_u16(r, "Service.ServiceID")?,
        free_service: read_bool(r)?,
    })
}

fn write_selected_service(w: &mut BitWriter, s: &SelectedServiceV20) -> Result<(), CodecError> {
    write_u16(w, s.service_id);
    write_u16(w, s.parameter_set_id);
    Ok(())
}

fn read_selected_service(r: &mut BitReader) -> Result<SelectedServiceV20, CodecError> {
    Ok(SelectedServiceV20 {
        service_id: read_u16(r, "SelectedService.ServiceID")?,
        parameter_set_id: read_u16(r, "SelectedService.ParameterSetID")?,
    })
}

fn write_schedule_tuple(w: &mut BitWriter, t: &ScheduleTupleV20) -> Result<(), CodecError> {
    write_u8(w, t.schedule_tuple_id);
    write_list(w, &t.schedule_entries, |w, e| {
        write_u32(w, e.duration);
        write_rational(w, &e.power);
        Ok(())
    })
}

fn read_schedule_tuple(r: &mut BitReader) -> Result<ScheduleTupleV20, CodecError> {
    Ok(ScheduleTupleV20 {
        schedule_tuple_id: read_u8(r, "ScheduleTuple.ScheduleTupleID")?,
        schedule_entries: read_list(r, 1024, "PowerScheduleEntry", |r| {
            Ok(PowerScheduleEntryV20 {
                duration: read_u32(r, "PowerScheduleEntry.Duration")?,
                power: read_rational(r)?,
            })
        })?,
    })
}

// =============================================================================
// Message dispatch
// =============================================================================

/// Event-code width for the 28 root elements of the common + DC schemas.
const MESSAGE_BITS: u8 = bits_for(28);

fn message_code(body: &BodyV20) -> u32 {
    match body {
        BodyV20::SessionSetupReq(_) => 0,
        BodyV20::SessionSetupRes(_) => 1,
        BodyV20::AuthorizationSetupReq(_) => 2,
        BodyV20::AuthorizationSetupRes(_) => 3,
        BodyV20::AuthorizationReq(_) => 4,
        BodyV20::AuthorizationRes(_) => 5,
        BodyV20::ServiceDiscoveryReq(_) => 6,
        BodyV20::ServiceDiscoveryRes(_) => 7,
        BodyV20::ServiceDetailReq(_) => 8,
        BodyV20::ServiceDetailRes(_) => 9,
        BodyV20::ServiceSelectionReq(_) => 10,
        BodyV20::ServiceSelectionRes(_) => 11,
        BodyV20::DcChargeParameterDiscoveryReq(_) => 12,
        BodyV20::DcChargeParameterDiscoveryRes(_) => 13,
        BodyV20::ScheduleExchangeReq(_) => 14,
        BodyV20::ScheduleExchangeRes(_) => 15,
        BodyV20::DcCableCheckReq(_) => 16,
        BodyV20::DcCableCheckRes(_) => 17,
        BodyV20::DcPreChargeReq(_) => 18,
        BodyV20::DcPreChargeRes(_) => 19,
        BodyV20::PowerDeliveryReq(_) => 20,
        BodyV20::PowerDeliveryRes(_) => 21,
        BodyV20::DcChargeLoopReq(_) => 22,
        BodyV20::DcChargeLoopRes(_) => 23,
        BodyV20::DcWeldingDetectionReq(_) => 24,
        BodyV20::DcWeldingDetectionRes(_) => 25,
        BodyV20::SessionStopReq(_) => 26,
        BodyV20::SessionStopRes(_) => 27,
    }
}

pub fn write_message(w: &mut BitWriter, m: &MessageV20) -> Result<(), CodecError> {
    w.write_bits(message_code(&m.body), MESSAGE_BITS);
    write_header(w, &m.header)?;
    match &m.body {
        BodyV20::SessionSetupReq(b) => {
            write_string(w, &b.evcc_id);
            Ok(())
        }
        BodyV20::SessionSetupRes(b) => {
            write_response_code(w, b.response_code)?;
            write_string(w, &b.evse_id);
            Ok(())
        }
        BodyV20::AuthorizationSetupReq(_) => Ok(()),
        BodyV20::AuthorizationSetupRes(b) => {
            write_response_code(w, b.response_code)?;
            write_list(w, &b.authorization_services, |w, a| {
                write_enum(w, AUTHORIZATION_TYPES, *a, "AuthorizationType")
            })?;
            write_bool(w, b.certificate_installation_service);
            write_option(w, &b.gen_challenge, |w, c| write_bytes(w, c));
            Ok(())
        }
        BodyV20::AuthorizationReq(b) => {
            write_enum(
                w,
                AUTHORIZATION_TYPES,
                b.selected_authorization_service,
                "SelectedAuthorizationService",
            )?;
            write_option(w, &b.gen_challenge, |w, c| write_bytes(w, c));
            write_option_res(w, &b.contract_certificate_chain, write_certificate_chain)
        }
        BodyV20::AuthorizationRes(b) => {
            write_response_code(w, b.response_code)?;
            write_enum(w, PROCESSING, b.evse_processing, "EVSEProcessing")
        }
        BodyV20::ServiceDiscoveryReq(b) => {
            write_option_res(w, &b.supported_service_ids, |w, ids| {
                write_list(w, ids, |w, id| {
                    write_u16(w, *id);
                    Ok(())
                })
            })
        }
        BodyV20::ServiceDiscoveryRes(b) => {
            write_response_code(w, b.response_code)?;
            write_bool(w, b.service_renegotiation_supported);
            write_list(w, &b.energy_transfer_service_list, write_service)?;
            write_list(w, &b.vas_list, write_service)
        }
        BodyV20::ServiceDetailReq(b) => {
            write_u16(w, b.service_id);
            Ok(())
        }
        BodyV20::ServiceDetailRes(b) => {
            write_response_code(w, b.response_code)?;
            write_u16(w, b.service_id);
            write_list(w, &b.parameter_set_ids, |w, id| {
                write_u16(w, *id);
                Ok(())
            })
        }
        BodyV20::ServiceSelectionReq(b) => {
            write_selected_service(w, &b.selected_energy_transfer_service)?;
            write_list(w, &b.selected_vas_list, write_selected_service)
        }
        BodyV20::ServiceSelectionRes(b) => write_response_code(w, b.response_code),
        BodyV20::DcChargeParameterDiscoveryReq(b) => {
            write_rational(w, &b.ev_maximum_charge_power);
            write_rational(w, &b.ev_minimum_charge_power);
            write_rational(w, &b.ev_maximum_charge_current);
            write_rational(w, &b.ev_minimum_charge_current);
            write_rational(w, &b.ev_maximum_voltage);
            write_rational(w, &b.ev_minimum_voltage);
            write_option(w, &b.target_soc, |w, v| write_soc(w, *v));
            Ok(())
        }
        BodyV20::DcChargeParameterDiscoveryRes(b) => {
            write_response_code(w, b.response_code)?;
            write_rational(w, &b.evse_maximum_charge_power);
            write_rational(w, &b.evse_minimum_charge_power);
            write_rational(w, &b.evse_maximum_charge_current);
            write_rational(w, &b.evse_minimum_charge_current);
            write_rational(w, &b.evse_maximum_voltage);
            write_rational(w, &b.evse_minimum_voltage);
            write_option(w, &b.evse_power_ramp_limitation, write_rational);
            Ok(())
        }
        BodyV20::ScheduleExchangeReq(b) => {
            write_u16(w, b.maximum_supporting_points);
            write_option(w, &b.departure_time, |w, v| write_u32(w, *v));
            write_option(w, &b.ev_target_energy_request, write_rational);
            write_option(w, &b.ev_maximum_energy_request, write_rational);
            write_option(w, &b.ev_minimum_energy_request, write_rational);
            Ok(())
        }
        BodyV20::ScheduleExchangeRes(b) => {
            write_response_code(w, b.response_code)?;
            write_enum(w, PROCESSING, b.evse_processing, "EVSEProcessing")?;
            write_list(w, &b.schedule_tuples, write_schedule_tuple)
        }
        BodyV20::DcCableCheckReq(_) => Ok(()),
        BodyV20::DcCableCheckRes(b) => {
            write_response_code(w, b.response_code)?;
            write_enum(w, PROCESSING, b.evse_processing, "EVSEProcessing")
        }
        BodyV20::DcPreChargeReq(b) => {
            write_enum(w, PROCESSING, b.ev_processing, "EVProcessing")?;
            write_rational(w, &b.ev_present_voltage);
            write_rational(w, &b.ev_target_voltage);
            Ok(())
        }
        BodyV20::DcPreChargeRes(b) => {
            write_response_code(w, b.response_code)?;
            write_rational(w, &b.evse_present_voltage);
            Ok(())
        }
        BodyV20::PowerDeliveryReq(b) => {
            write_enum(w, PROCESSING, b.ev_processing, "EVProcessing")?;
            write_enum(w, CHARGE_PROGRESS, b.charge_progress, "ChargeProgress")?;
            write_option(w, &b.selected_schedule_tuple_id, |w, v| write_u8(w, *v));
            Ok(())
        }
        BodyV20::PowerDeliveryRes(b) => {
            write_response_code(w, b.response_code)?;
            write_option_res(w, &b.evse_status, write_evse_status)
        }
        BodyV20::DcChargeLoopReq(b) => {
            write_rational(w, &b.ev_present_voltage);
            write_rational(w, &b.ev_target_current);
            write_rational(w, &b.ev_target_voltage);
            write_option(w, &b.present_soc, |w, v| write_soc(w, *v));
            write_bool(w, b.charging_complete);
            write_bool(w, b.meter_info_requested);
            Ok(())
        }
        BodyV20::DcChargeLoopRes(b) => {
            write_response_code(w, b.response_code)?;
            write_rational(w, &b.evse_present_current);
            write_rational(w, &b.evse_present_voltage);
            write_bool(w, b.evse_power_limit_achieved);
            write_bool(w, b.evse_current_limit_achieved);
            write_bool(w, b.evse_voltage_limit_achieved);
            write_option_res(w, &b.evse_status, write_evse_status)?;
            write_option_res(w, &b.meter_info, write_meter_info)
        }
        BodyV20::DcWeldingDetectionReq(b) => {
            write_enum(w, PROCESSING, b.ev_processing, "EVProcessing")
        }
        BodyV20::DcWeldingDetectionRes(b) => {
            write_response_code(w, b.response_code)?;
            write_rational(w, &b.evse_present_voltage);
            Ok(())
        }
        BodyV20::SessionStopReq(b) => {
            write_enum(w, CHARGING_SESSIONS, b.charging_session, "ChargingSession")?;
            write_option(w, &b.ev_termination_code, |w, s| write_string(w, s));
            write_option(w, &b.ev_termination_explanation, |w, s| write_string(w, s));
            Ok(())
        }
        BodyV20::SessionStopRes(b) => write_response_code(w, b.response_code),
    }
}

pub fn read_message(r: &mut BitReader) -> Result<MessageV20, CodecError> {
    let code = r.read_bits(MESSAGE_BITS)?;
    let header = read_header(r)?;
    let body = match code {
        0 => BodyV20::SessionSetupReq(SessionSetupReqV20 {
            evcc_id: read_string(r)?,
        }),
        1 => BodyV20::SessionSetupRes(SessionSetupResV20 {
            response_code: read_response_code(r)?,
            evse_id: read_string(r)?,
        }),
        2 => BodyV20::AuthorizationSetupReq(AuthorizationSetupReq),
        3 => BodyV20::AuthorizationSetupRes(AuthorizationSetupRes {
            response_code: read_response_code(r)?,
            authorization_services: read_list(r, 2, "AuthorizationType", |r| {
                read_enum(r, AUTHORIZATION_TYPES, "AuthorizationType")
            })?,
            certificate_installation_service: read_bool(r)?,
            gen_challenge: read_option(r, |r| {
                read_bytes_exact::<16>(r, "AuthorizationSetupRes.GenChallenge")
            })?,
        }),
        4 => BodyV20::AuthorizationReq(AuthorizationReqV20 {
            selected_authorization_service: read_enum(
                r,
                AUTHORIZATION_TYPES,
                "SelectedAuthorizationService",
            )?,
            gen_challenge: read_option(r, |r| {
                read_bytes_exact::<16>(r, "AuthorizationReq.GenChallenge")
            })?,
            contract_certificate_chain: read_option(r, read_certificate_chain)?,
        }),
        5 => BodyV20::AuthorizationRes(AuthorizationResV20 {
            response_code: read_response_code(r)?,
            evse_processing: read_enum(r, PROCESSING, "EVSEProcessing")?,
        }),
        6 => BodyV20::ServiceDiscoveryReq(ServiceDiscoveryReqV20 {
            supported_service_ids: read_option(r, |r| {
                read_list(r, 32, "SupportedServiceIDs", |r| {
                    read_u16(r, "ServiceID")
                })
            })?,
        }),
        7 => BodyV20::ServiceDiscoveryRes(ServiceDiscoveryResV20 {
            response_code: read_response_code(r)?,
            service_renegotiation_supported: read_bool(r)?,
            energy_transfer_service_list: read_list(r, 8, "EnergyTransferService", read_service)?,
            vas_list: read_list(r, 8, "VASList", read_service)?,
        }),
        8 => BodyV20::ServiceDetailReq(ServiceDetailReqV20 {
            service_id: read_u16(r, "ServiceDetailReq.ServiceID")?,
        }),
        9 => BodyV20::ServiceDetailRes(ServiceDetailResV20 {
            response_code: read_response_code(r)?,
            service_id: read_u16(r, "ServiceDetailRes.ServiceID")?,
            parameter_set_ids: read_list(r, 32, "ParameterSetID", |r| {
                read_u16(r, "ParameterSetID")
            })?,
        }),
        10 => BodyV20::ServiceSelectionReq(ServiceSelectionReq {
            selected_energy_transfer_service: read_selected_service(r)?,
            selected_vas_list: read_list(r, 8, "SelectedVAS", read_selected_service)?,
        }),
        11 => BodyV20::ServiceSelectionRes(ServiceSelectionRes {
            response_code: read_response_code(r)?,
        }),
        12 => BodyV20::DcChargeParameterDiscoveryReq(DcChargeParameterDiscoveryReq {
            ev_maximum_charge_power: read_rational(r)?,
            ev_minimum_charge_power: read_rational(r)?,
            ev_maximum_charge_current: read_rational(r)?,
            ev_minimum_charge_current: read_rational(r)?,
            ev_maximum_voltage: read_rational(r)?,
            ev_minimum_voltage: read_rational(r)?,
            target_soc: read_option(r, read_soc)?,
        }),
        13 => BodyV20::DcChargeParameterDiscoveryRes(DcChargeParameterDiscoveryRes {
            response_code: read_response_code(r)?,
            evse_maximum_charge_power: read_rational(r)?,
            evse_minimum_charge_power: read_rational(r)?,
            evse_maximum_charge_current: read_rational(r)?,
            evse_minimum_charge_current: read_rational(r)?,
            evse_maximum_voltage: read_rational(r)?,
            evse_minimum_voltage: read_rational(r)?,
            evse_power_ramp_limitation: read_option(r, read_rational)?,
        }),
        14 => BodyV20::ScheduleExchangeReq(ScheduleExchangeReq {
            maximum_supporting_points: read_u16(r, "ScheduleExchangeReq.MaximumSupportingPoints")?,
            departure_time: read_option(r, |r| read_u32(r, "DepartureTime"))?,
            ev_target_energy_request: read_option(r, read_rational)?,
            ev_maximum_energy_request: read_option(r, read_rational)?,
            ev_minimum_energy_request: read_option(r, read_rational)?,
        }),
        15 => BodyV20::ScheduleExchangeRes(ScheduleExchangeRes {
            response_code: read_response_code(r)?,
            evse_processing: read_enum(r, PROCESSING, "EVSEProcessing")?,
            schedule_tuples: read_list(r, 3, "ScheduleTuple", read_schedule_tuple)?,
        }),
        16 => BodyV20::DcCableCheckReq(DcCableCheckReq),
        17 => BodyV20::DcCableCheckRes(DcCableCheckRes {
            response_code: read_response_code(r)?,
            evse_processing: read_enum(r, PROCESSING, "EVSEProcessing")?,
        }),
        18 => BodyV20::DcPreChargeReq(DcPreChargeReq {
            ev_processing: read_enum(r, PROCESSING, "EVProcessing")?,
            ev_present_voltage: read_rational(r)?,
            ev_target_voltage: read_rational(r)?,
        }),
        19 => BodyV20::DcPreChargeRes(DcPreChargeRes {
            response_code: read_response_code(r)?,
            evse_present_voltage: read_rational(r)?,
        }),
        20 => BodyV20::PowerDeliveryReq(PowerDeliveryReqV20 {
            ev_processing: read_enum(r, PROCESSING, "EVProcessing")?,
            charge_progress: read_enum(r, CHARGE_PROGRESS, "ChargeProgress")?,
            selected_schedule_tuple_id: read_option(r, |r| {
                read_u8(r, "PowerDeliveryReq.SelectedScheduleTupleID")
            })?,
        }),
        21 => BodyV20::PowerDeliveryRes(PowerDeliveryResV20 {
            response_code: read_response_code(r)?,
            evse_status: read_option(r, read_evse_status)?,
        }),
        22 => BodyV20::DcChargeLoopReq(DcChargeLoopReq {
            ev_present_voltage: read_rational(r)?,
            ev_target_current: read_rational(r)?,
            ev_target_voltage: read_rational(r)?,
            present_soc: read_option(r, read_soc)?,
            charging_complete: read_bool(r)?,
            meter_info_requested: read_bool(r)?,
        }),
        23 => BodyV20::DcChargeLoopRes(DcChargeLoopRes {
            response_code: read_response_code(r)?,
            evse_present_current: read_rational(r)?,
            evse_present_voltage: read_rational(r)?,
            evse_power_limit_achieved: read_bool(r)?,
            evse_current_limit_achieved: read_bool(r)?,
            evse_voltage_limit_achieved: read_bool(r)?,
            evse_status: read_option(r, read_evse_status)?,
            meter_info: read_option(r, read_meter_info)?,
        }),
        24 => BodyV20::DcWeldingDetectionReq(DcWeldingDetectionReq {
            ev_processing: read_enum(r, PROCESSING, "EVProcessing")?,
        }),
        25 => BodyV20::DcWeldingDetectionRes(DcWeldingDetectionRes {
            response_code: read_response_code(r)?,
            evse_present_voltage: read_rational(r)?,
        }),
        26 => BodyV20::SessionStopReq(SessionStopReqV20 {
            charging_session: read_enum(r, CHARGING_SESSIONS, "ChargingSession")?,
            ev_termination_code: read_option(r, read_string)?,
            ev_termination_explanation: read_option(r, read_string)?,
        }),
        27 => BodyV20::SessionStopRes(SessionStopResV20 {
            response_code: read_response_code(r)?,
        }),
        code => {
            return Err(CodecError::UnknownEventCode {
                context: "ISO 15118-20 root element",
                code,
            })
        }
    };
    Ok(MessageV20 { header, body })
}
