//! The SECC session state machine
//!
//! A pure responder: reads one request, routes it through the
//! transition table, consults the controller, answers, transitions.
//! Validation failures still produce the schema's minimal FAILED_*
//! response before the connection closes; only codec and transport
//! faults close silently.

use std::sync::Arc;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use v2g_codec::signed_fragment;
use v2g_core::dialect::{Dialect, TimerKind};
use v2g_core::error::ProtocolError;
use v2g_core::messages::app_protocol::{SapResponseCode, SupportedAppProtocolReq, SupportedAppProtocolRes};
use v2g_core::messages::common::{
    CertificateChain, ChargingSession, EnergyTransferMode, EvseNotification, EvseProcessing,
    PaymentOption, PhysicalValue, RationalNumber,
};
use v2g_core::messages::iso2::{self as m2, BodyV2, MessageV2, ResponseCodeV2};
use v2g_core::messages::iso20::{self as m20, BodyV20, MessageV20, ResponseCodeV20};
use v2g_core::messages::{Message, MessageKind};
use v2g_core::schedule::ChargingSchedule;
use v2g_core::session::{SessionId, SessionPhase, SessionRecord, StopReason};
use v2g_core::shutdown::{self, ShutdownSignal};
use v2g_pki::{fragment_digest, verify_detached, AnchorRole, TrustStore};
use v2g_transport::FramedStream;

use crate::config::SeccConfig;
use crate::controller::{AuthStatus, EvseController, ScheduleRequirements};
use crate::error::{FailCode, SeccError};
use crate::router::{allowed, SeccState};
use crate::store::SessionStore;

/// The slice of [`SeccConfig`] a single session needs.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub supported_dialects: Vec<Dialect>,
    pub supported_auth_options: Vec<PaymentOption>,
    pub free_charging_service: bool,
    pub allow_cert_install_service: bool,
}

impl From<&SeccConfig> for SessionPolicy {
    fn from(config: &SeccConfig) -> Self {
        Self {
            supported_dialects: config.supported_dialects.clone(),
            supported_auth_options: config.supported_auth_options.clone(),
            free_charging_service: config.free_charging_service,
            allow_cert_install_service: config.allow_cert_install_service,
        }
    }
}

const CHARGE_SERVICE_ID: u16 = 1;
const CERT_INSTALL_SERVICE_ID: u16 = 2;

/// One SECC session over an accepted connection.
pub struct SeccSession<S> {
    stream: FramedStream<S>,
    controller: Arc<dyn EvseController>,
    pki: Arc<TrustStore>,
    store: Arc<SessionStore>,
    policy: SessionPolicy,
    tls: bool,
    dialect: Dialect,
    state: SeccState,
    session_id: SessionId,
    offered_payment_options: Vec<PaymentOption>,
    offered_modes: Vec<EnergyTransferMode>,
    offered_service_ids: Vec<u16>,
    offered_schedules: Vec<ChargingSchedule>,
    selected_payment: Option<PaymentOption>,
    selected_mode: Option<EnergyTransferMode>,
    active_tuple_id: Option<u8>,
    challenge: Option<[u8; 16]>,
    contract_leaf: Option<Vec<u8>>,
    shutdown: Option<ShutdownSignal>,
    externally_cancelled: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> SeccSession<S> {
    pub fn new(
        stream: S,
        controller: Arc<dyn EvseController>,
        pki: Arc<TrustStore>,
        store: Arc<SessionStore>,
        policy: SessionPolicy,
        tls: bool,
    ) -> Self {
        Self {
            stream: FramedStream::new(stream, Dialect::Iso2.max_payload_len()),
            controller,
            pki,
            store,
            policy,
            tls,
            dialect: Dialect::Iso2,
            state: SeccState::SupportedAppProtocol,
            session_id: SessionId::ZERO,
            offered_payment_options: Vec::new(),
            offered_modes: Vec::new(),
            offered_service_ids: Vec::new(),
            offered_schedules: Vec::new(),
            selected_payment: None,
            selected_mode: None,
            active_tuple_id: None,
            challenge: None,
            contract_leaf: None,
            shutdown: None,
            externally_cancelled: false,
        }
    }

    /// Observe the process-wide shutdown flag; raising it closes the
    /// session at its next suspension point.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Serve the session to completion.
    pub async fn run(mut self) -> StopReason {
        let result = self.serve().await;
        let reason = match result {
            Ok(()) if self.externally_cancelled => StopReason::graceful(
                self.session_id,
                &self.state.to_string(),
                "external shutdown",
            ),
            Ok(()) => StopReason::graceful(
                self.session_id,
                &SeccState::Terminated.to_string(),
                "session stopped",
            ),
            Err(e) => StopReason::fault(
                self.session_id,
                &self.state.to_string(),
                e.kind(),
                e.to_string(),
            ),
        };
        self.store.update(self.session_id, |r| {
            if r.phase != SessionPhase::Paused {
                r.phase = SessionPhase::Terminated;
            }
            r.state = reason.state.clone();
            r.stop = Some(reason.clone());
        });
        if reason.is_graceful() {
            info!(session_id = %reason.session_id, "SECC session terminated");
        } else {
            error!(
                session_id = %reason.session_id,
                state = %reason.state,
                kind = %reason.kind.map(|k| k.to_string()).unwrap_or_default(),
                detail = %reason.detail,
                "SECC session failed"
            );
        }
        reason
    }

    async fn serve(&mut self) -> Result<(), SeccError> {
        loop {
            let wait = self.dialect.timeout(TimerKind::Sequence);
            // The SECC is a responder: on external shutdown there is no
            // SessionStop it could legally send, so it stops reading
            // and closes
            let frame = tokio::select! {
                _ = shutdown::cancelled(&mut self.shutdown) => {
                    info!(session_id = %self.session_id, "external shutdown, closing session");
                    self.externally_cancelled = true;
                    return Ok(());
                }
                read = tokio::time::timeout(wait, self.stream.read_frame()) => {
                    read.map_err(|_| SeccError::Timeout(TimerKind::Sequence))??
                }
            };
            let Some(frame) = frame else {
                return Err(v2g_transport::TransportError::PeerClosed.into());
            };
            let (_, request) = v2g_codec::decode(&frame.to_bytes())?;
            debug!(state = %self.state, request = %request.kind(), "request received");

            match self.step(request.clone()).await {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(e) => {
                    self.respond_failure(&request, &e).await;
                    return Err(e);
                }
            }
        }
    }

    /// Route, validate, handle, respond, transition. Returns false on
    /// graceful termination.
    async fn step(&mut self, request: Message) -> Result<bool, SeccError> {
        let kind = request.kind();
        if !allowed(self.state, kind) {
            return Err(ProtocolError::UnexpectedMessage {
                state: self.state.to_string(),
                kind: kind.to_string(),
            }
            .into());
        }
        // Session id discipline: everything after SessionSetup echoes
        // the assigned id
        if !matches!(
            kind,
            MessageKind::SupportedAppProtocolReq | MessageKind::SessionSetupReq
        ) {
            if let Some(id) = request.session_id() {
                if id != self.session_id {
                    return Err(ProtocolError::SessionIdMismatch {
                        expected: self.session_id.to_hex(),
                        got: id.to_hex(),
                    }
                    .into());
                }
            }
        }

        let (reply, next) = match request {
            Message::SupportedAppProtocolReq(req) => self.on_sap(req)?,
            Message::V2(m) => self.on_v2(m).await?,
            Message::V20(m) => self.on_v20(m).await?,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    state: self.state.to_string(),
                    kind: other.kind().to_string(),
                }
                .into())
            }
        };

        let bytes = v2g_codec::encode(&reply, self.dialect)?;
        self.stream.write_raw(&bytes).await?;
        debug!(response = %reply.kind(), next = %next, "response sent");

        self.state = next;
        let state_name = next.to_string();
        self.store.update(self.session_id, |r| r.state = state_name);
        Ok(next != SeccState::Terminated)
    }

    /// Answer a rejected request with the schema's minimal FAILED_*
    /// body. Best effort; codec and transport faults get nothing.
    async fn respond_failure(&mut self, request: &Message, e: &SeccError) {
        let Some(code) = e.fail_code() else { return };
        warn!(state = %self.state, code = ?code, "answering with failure response");
        let reply = match request {
            Message::SupportedAppProtocolReq(_) => {
                Some(Message::SupportedAppProtocolRes(SupportedAppProtocolRes {
                    response_code: SapResponseCode::FailedNoNegotiation,
                    schema_id: None,
                }))
            }
            Message::V2(m) => failed_body_v2(m.body_kind(), code.v2())
                .map(|body| Message::V2(MessageV2::new(self.session_id, body))),
            Message::V20(m) => failed_body_v20(m.body_kind(), code.v20())
                .map(|body| self.msg20(body)),
            _ => None,
        };
        if let Some(reply) = reply {
            if let Ok(bytes) = v2g_codec::encode(&reply, self.dialect) {
                let _ = self.stream.write_raw(&bytes).await;
            }
        }
    }

    fn msg20(&self, body: BodyV20) -> Message {
        Message::V20(MessageV20::new(self.session_id, now_ts() as u64, body))
    }

    fn reject(&self, code: FailCode, detail: impl Into<String>) -> SeccError {
        SeccError::Reject {
            code,
            detail: detail.into(),
        }
    }

    // =========================================================================
    // SupportedAppProtocol
    // =========================================================================

    fn on_sap(
        &mut self,
        req: SupportedAppProtocolReq,
    ) -> Result<(Message, SeccState), SeccError> {
        let dialects = self.policy.supported_dialects.clone();
        for dialect in dialects {
            let chosen = req
                .app_protocols
                .iter()
                .filter(|p| p.dialect() == Some(dialect))
                .min_by_key(|p| p.priority);
            if let Some(protocol) = chosen {
                self.dialect = dialect;
                self.stream.set_max_payload(dialect.max_payload_len());
                info!(dialect = ?dialect, schema_id = protocol.schema_id, "protocol negotiated");
                let reply = Message::SupportedAppProtocolRes(SupportedAppProtocolRes {
                    response_code: SapResponseCode::OkSuccessfulNegotiation,
                    schema_id: Some(protocol.schema_id),
                });
                return Ok((reply, SeccState::SessionSetup));
            }
        }
        Err(self.reject(FailCode::Generic, "no protocol in common"))
    }

    // =========================================================================
    // ISO 15118-2 handlers
    // =========================================================================

    async fn on_v2(&mut self, m: MessageV2) -> Result<(Message, SeccState), SeccError> {
        let header_id = m.header.session_id;
        let (body, next) = match m.body {
            BodyV2::SessionSetupReq(req) => self.on_session_setup_v2(header_id, req)?,
            BodyV2::ServiceDiscoveryReq(req) => self.on_service_discovery_v2(req)?,
            BodyV2::ServiceDetailReq(req) => self.on_service_detail_v2(req)?,
            BodyV2::PaymentServiceSelectionReq(req) => self.on_payment_selection_v2(req)?,
            BodyV2::CertificateInstallationReq(req) => {
                self.on_certificate_installation_v2(&m.header, req)?
            }
            BodyV2::PaymentDetailsReq(req) => self.on_payment_details_v2(req)?,
            BodyV2::AuthorizationReq(req) => self.on_authorization_v2(&m.header, req).await?,
            BodyV2::ChargeParameterDiscoveryReq(req) => {
                self.on_charge_parameter_discovery_v2(req).await?
            }
            BodyV2::CableCheckReq(req) => self.on_cable_check_v2(req).await?,
            BodyV2::PreChargeReq(req) => self.on_pre_charge_v2(req).await?,
            BodyV2::PowerDeliveryReq(req) => self.on_power_delivery_v2(req).await?,
            BodyV2::ChargingStatusReq(_) => self.on_charging_status_v2().await?,
            BodyV2::CurrentDemandReq(req) => self.on_current_demand_v2(req).await?,
            BodyV2::MeteringReceiptReq(req) => self.on_metering_receipt_v2(&m.header, req)?,
            BodyV2::WeldingDetectionReq(req) => self.on_welding_detection_v2(req).await?,
            BodyV2::SessionStopReq(req) => self.on_session_stop_v2(req)?,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    state: self.state.to_string(),
                    kind: MessageV2::new(self.session_id, other).body_kind().to_string(),
                }
                .into())
            }
        };
        Ok((Message::V2(MessageV2::new(self.session_id, body)), next))
    }

    fn on_session_setup_v2(
        &mut self,
        header_id: SessionId,
        req: m2::SessionSetupReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        let (outcome, next) = self.establish_session(header_id)?;
        let evcc_hex: String = req.evcc_id.iter().map(|b| format!("{:02X}", b)).collect();
        self.store.update(self.session_id, |r| {
            r.dialect = Some("iso2".to_string());
            r.evcc_id = Some(evcc_hex.clone());
        });
        let code = match outcome {
            EstablishOutcome::New => ResponseCodeV2::OkNewSessionEstablished,
            EstablishOutcome::Resumed => ResponseCodeV2::OkOldSessionJoined,
        };
        Ok((
            BodyV2::SessionSetupRes(m2::SessionSetupRes {
                response_code: code,
                evse_id: self.controller.evse_id(),
                evse_timestamp: Some(now_ts()),
            }),
            next,
        ))
    }

    fn on_service_discovery_v2(
        &mut self,
        _req: m2::ServiceDiscoveryReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        self.offered_payment_options = self
            .policy
            .supported_auth_options
            .iter()
            .copied()
            // PnC requires a TLS-protected session
            .filter(|option| *option != PaymentOption::Contract || self.tls)
            .collect();
        self.offered_modes = self.controller.supported_energy_transfer_modes();
        self.offered_service_ids = vec![CHARGE_SERVICE_ID];

        let mut service_list = Vec::new();
        if self.policy.allow_cert_install_service && self.pki.contract_identity().is_some() {
            self.offered_service_ids.push(CERT_INSTALL_SERVICE_ID);
            service_list.push(m2::Service {
                service_id: CERT_INSTALL_SERVICE_ID,
                service_name: Some("Certificate".to_string()),
                service_category: m2::ServiceCategory::ContractCertificate,
                free_service: true,
            });
        }

        Ok((
            BodyV2::ServiceDiscoveryRes(m2::ServiceDiscoveryRes {
                response_code: ResponseCodeV2::Ok,
                payment_options: self.offered_payment_options.clone(),
                charge_service: m2::ChargeService {
                    service_id: CHARGE_SERVICE_ID,
                    service_name: Some("AC_DC_Charging".to_string()),
                    free_service: self.policy.free_charging_service,
                    supported_energy_transfer_modes: self.offered_modes.clone(),
                },
                service_list,
            }),
            SeccState::ServiceSelection,
        ))
    }

    fn on_service_detail_v2(
        &mut self,
        req: m2::ServiceDetailReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        if !self.offered_service_ids.contains(&req.service_id) {
            return Err(self.reject(
                FailCode::ServiceSelectionInvalid,
                format!("service {} was not offered", req.service_id),
            ));
        }
        Ok((
            BodyV2::ServiceDetailRes(m2::ServiceDetailRes {
                response_code: ResponseCodeV2::Ok,
                service_id: req.service_id,
                service_parameter_list: vec![],
            }),
            SeccState::ServiceSelection,
        ))
    }

    fn on_payment_selection_v2(
        &mut self,
        req: m2::PaymentServiceSelectionReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        if !self
            .offered_payment_options
            .contains(&req.selected_payment_option)
        {
            return Err(self.reject(
                FailCode::PaymentSelectionInvalid,
                format!("{:?} was not offered", req.selected_payment_option),
            ));
        }
        for service in &req.selected_services {
            if !self.offered_service_ids.contains(&service.service_id) {
                return Err(self.reject(
                    FailCode::ServiceSelectionInvalid,
                    format!("service {} was not offered", service.service_id),
                ));
            }
        }
        self.selected_payment = Some(req.selected_payment_option);
        let auth_name = format!("{:?}", req.selected_payment_option);
        self.store
            .update(self.session_id, |r| r.auth_method = Some(auth_name));
        Ok((
            BodyV2::PaymentServiceSelectionRes(m2::PaymentServiceSelectionRes {
                response_code: ResponseCodeV2::Ok,
            }),
            SeccState::Payment,
        ))
    }

    fn on_certificate_installation_v2(
        &mut self,
        header: &m2::HeaderV2,
        req: m2::CertificateInstallationReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        if !self.policy.allow_cert_install_service {
            return Err(self.reject(
                FailCode::ServiceSelectionInvalid,
                "certificate installation not offered",
            ));
        }
        self.pki.validate(
            &req.oem_provisioning_certificate_chain.certificates,
            AnchorRole::Oem,
            now_ts(),
        )?;
        let oem_leaf = req
            .oem_provisioning_certificate_chain
            .leaf()
            .ok_or_else(|| self.reject(FailCode::CertChainError, "empty OEM chain"))?
            .to_vec();
        self.verify_header_signature_v2(
            header,
            &BodyV2::CertificateInstallationReq(req),
            &oem_leaf,
        )?;

        let contract = self.pki.contract_identity().ok_or_else(|| {
            self.reject(FailCode::Generic, "no contract material to issue")
        })?;
        let secc = self.pki.secc_identity().ok_or_else(|| {
            self.reject(FailCode::Generic, "no provisioning identity")
        })?;
        let emaid = v2g_pki::subject_common_name(
            contract.chain.first().map(Vec::as_slice).unwrap_or(&[]),
        )
        .unwrap_or_else(|_| "UNKNOWN".to_string());

        Ok((
            BodyV2::CertificateInstallationRes(m2::CertificateInstallationRes {
                response_code: ResponseCodeV2::Ok,
                sa_provisioning_certificate_chain: CertificateChain {
                    id: None,
                    certificates: secc.chain,
                },
                contract_signature_cert_chain: CertificateChain {
                    id: None,
                    certificates: contract.chain,
                },
                // Simulator-grade provisioning: the key travels in the
                // session's TLS envelope rather than a fresh ECDH seal
                encrypted_private_key: contract.key_pkcs8,
                dh_public_key: vec![0x04; 65],
                emaid,
            }),
            SeccState::Payment,
        ))
    }

    fn on_payment_details_v2(
        &mut self,
        req: m2::PaymentDetailsReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        if self.selected_payment != Some(PaymentOption::Contract) {
            return Err(self.reject(
                FailCode::PaymentSelectionInvalid,
                "PaymentDetails without contract payment",
            ));
        }
        let anchors_role = if self.pki.anchors(AnchorRole::Contract).is_empty() {
            AnchorRole::Mo
        } else {
            AnchorRole::Contract
        };
        self.pki
            .validate(&req.contract_certificate_chain.certificates, anchors_role, now_ts())?;
        self.contract_leaf = req.contract_certificate_chain.leaf().map(|c| c.to_vec());

        let challenge: [u8; 16] = rand::thread_rng().gen();
        self.challenge = Some(challenge);
        debug!(emaid = %req.emaid, "contract chain accepted");
        Ok((
            BodyV2::PaymentDetailsRes(m2::PaymentDetailsRes {
                response_code: ResponseCodeV2::Ok,
                gen_challenge: challenge,
                evse_timestamp: now_ts(),
            }),
            SeccState::Payment,
        ))
    }

    async fn on_authorization_v2(
        &mut self,
        header: &m2::HeaderV2,
        req: m2::AuthorizationReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        let method = self
            .selected_payment
            .ok_or_else(|| self.reject(FailCode::Sequence, "authorization before selection"))?;

        if method == PaymentOption::Contract {
            if req.gen_challenge != self.challenge {
                return Err(self.reject(FailCode::ChallengeInvalid, "challenge mismatch"));
            }
            let leaf = self
                .contract_leaf
                .clone()
                .ok_or_else(|| self.reject(FailCode::CertChainError, "no contract certificate"))?;
            self.verify_header_signature_v2(header, &BodyV2::AuthorizationReq(req), &leaf)?;
        }

        let status = self.controller.is_authorized(&self.session_id, method).await;
        let (processing, next) = match status {
            AuthStatus::Accepted => (EvseProcessing::Finished, SeccState::ChargeParameterDiscovery),
            AuthStatus::Ongoing => (EvseProcessing::Ongoing, SeccState::Payment),
            AuthStatus::Rejected => {
                return Err(self.reject(FailCode::Generic, "authorization rejected"))
            }
        };
        Ok((
            BodyV2::AuthorizationRes(m2::AuthorizationRes {
                response_code: ResponseCodeV2::Ok,
                evse_processing: processing,
            }),
            next,
        ))
    }

    async fn on_charge_parameter_discovery_v2(
        &mut self,
        req: m2::ChargeParameterDiscoveryReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        let mode = req.requested_energy_transfer_mode;
        if !self.offered_modes.contains(&mode) {
            return Err(self.reject(
                FailCode::WrongEnergyTransferMode,
                format!("{:?} was not offered", mode),
            ));
        }
        self.selected_mode = Some(mode);
        let mode_name = format!("{:?}", mode);
        self.store
            .update(self.session_id, |r| r.energy_mode = Some(mode_name));

        let (departure_time, energy_request_wh, ev_max_power_w) = match &req.ev_charge_parameter {
            m2::EvChargeParameter::Ac(ac) => (
                ac.departure_time,
                Some(ac.e_amount.scaled().max(0.0) as u32),
                (ac.ev_max_voltage.scaled() * ac.ev_max_current.scaled()).max(0.0) as u32,
            ),
            m2::EvChargeParameter::Dc(dc) => (
                dc.departure_time,
                dc.ev_energy_request.map(|e| e.scaled().max(0.0) as u32),
                dc.ev_maximum_power_limit
                    .map(|p| p.scaled().max(0.0) as u32)
                    .unwrap_or(50_000),
            ),
        };
        let schedule = self
            .controller
            .build_schedule(ScheduleRequirements {
                mode,
                departure_time,
                energy_request_wh,
                ev_max_power_w,
            })
            .await;
        let tuple = schedule.to_sa_schedule_tuple();
        self.offered_schedules = vec![schedule];

        let limits = self.controller.limits();
        let evse_charge_parameter = if mode.is_ac() {
            m2::EvseChargeParameter::Ac(m2::AcEvseChargeParameter {
                ac_evse_status: self.ac_status(EvseNotification::None),
                evse_nominal_voltage: PhysicalValue::volts(limits.nominal_voltage_v as i16),
                evse_max_current: PhysicalValue::amperes(limits.max_current_a as i16),
            })
        } else {
            m2::EvseChargeParameter::Dc(m2::DcEvseChargeParameter {
                dc_evse_status: self.dc_status(EvseNotification::None),
                evse_maximum_current_limit: PhysicalValue::amperes(limits.max_current_a as i16),
                evse_maximum_power_limit: PhysicalValue::watts(
                    (limits.max_power_w / 1000).min(i16::MAX as u32) as i16,
                    3,
                ),
                evse_maximum_voltage_limit: PhysicalValue::volts(limits.max_voltage_v as i16),
                evse_minimum_current_limit: PhysicalValue::amperes(limits.min_current_a as i16),
                evse_minimum_voltage_limit: PhysicalValue::volts(limits.min_voltage_v as i16),
                evse_peak_current_ripple: PhysicalValue::amperes(
                    limits.peak_current_ripple_a as i16,
                ),
                evse_energy_to_be_delivered: None,
            })
        };

        Ok((
            BodyV2::ChargeParameterDiscoveryRes(m2::ChargeParameterDiscoveryRes {
                response_code: ResponseCodeV2::Ok,
                evse_processing: EvseProcessing::Finished,
                sa_schedule_list: vec![tuple],
                evse_charge_parameter,
            }),
            SeccState::ChargeLoopEntry,
        ))
    }

    async fn on_cable_check_v2(
        &mut self,
        _req: m2::CableCheckReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        Ok((
            BodyV2::CableCheckRes(m2::CableCheckRes {
                response_code: ResponseCodeV2::Ok,
                dc_evse_status: self.dc_status(EvseNotification::None),
                evse_processing: EvseProcessing::Finished,
            }),
            SeccState::CableCheck,
        ))
    }

    async fn on_pre_charge_v2(
        &mut self,
        req: m2::PreChargeReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        self.controller
            .set_precharge_target(
                req.ev_target_voltage.scaled(),
                req.ev_target_current.scaled(),
            )
            .await;
        let present = self.controller.present_voltage().await;
        Ok((
            BodyV2::PreChargeRes(m2::PreChargeRes {
                response_code: ResponseCodeV2::Ok,
                dc_evse_status: self.dc_status(EvseNotification::None),
                evse_present_voltage: volts(present),
            }),
            SeccState::PreCharge,
        ))
    }

    async fn on_power_delivery_v2(
        &mut self,
        req: m2::PowerDeliveryReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        let next = match req.charge_progress {
            m2::ChargeProgress::Start => {
                if !self
                    .offered_schedules
                    .iter()
                    .any(|s| s.tuple_id == req.sa_schedule_tuple_id)
                {
                    return Err(self.reject(
                        FailCode::TariffSelectionInvalid,
                        format!("schedule tuple {} was not offered", req.sa_schedule_tuple_id),
                    ));
                }
                self.active_tuple_id = Some(req.sa_schedule_tuple_id);
                let tuple_id = req.sa_schedule_tuple_id;
                self.store
                    .update(self.session_id, |r| r.schedule_tuple_id = Some(tuple_id));
                self.controller.set_charging(true).await;
                SeccState::ChargingLoop
            }
            m2::ChargeProgress::Stop => {
                self.controller.set_charging(false).await;
                SeccState::PostCharge
            }
            m2::ChargeProgress::Renegotiate => SeccState::ChargeParameterDiscovery,
        };

        let mode = self.selected_mode.unwrap_or(EnergyTransferMode::AcThreePhaseCore);
        let evse_status = if mode.is_ac() {
            m2::EvseStatus::Ac(self.ac_status(EvseNotification::None))
        } else {
            m2::EvseStatus::Dc(self.dc_status(EvseNotification::None))
        };
        Ok((
            BodyV2::PowerDeliveryRes(m2::PowerDeliveryRes {
                response_code: ResponseCodeV2::Ok,
                evse_status,
            }),
            next,
        ))
    }

    async fn loop_notification(&self) -> EvseNotification {
        if self.store.cancel_requested(&self.session_id) || self.controller.should_stop().await {
            EvseNotification::StopCharging
        } else if self.controller.renegotiation_requested().await {
            EvseNotification::ReNegotiation
        } else {
            EvseNotification::None
        }
    }

    async fn on_charging_status_v2(&mut self) -> Result<(BodyV2, SeccState), SeccError> {
        let notification = self.loop_notification().await;
        let receipt =
            self.controller.receipt_required() && self.selected_payment == Some(PaymentOption::Contract);
        Ok((
            BodyV2::ChargingStatusRes(m2::ChargingStatusRes {
                response_code: ResponseCodeV2::Ok,
                evse_id: self.controller.evse_id(),
                sa_schedule_tuple_id: self.active_tuple_id.unwrap_or(1),
                evse_max_current: Some(PhysicalValue::amperes(
                    self.controller.limits().max_current_a as i16,
                )),
                meter_info: Some(self.controller.meter_info().await),
                receipt_required: Some(receipt),
                ac_evse_status: self.ac_status(notification),
            }),
            SeccState::ChargingLoop,
        ))
    }

    async fn on_current_demand_v2(
        &mut self,
        req: m2::CurrentDemandReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        let notification = self.loop_notification().await;
        let present_voltage = self.controller.present_voltage().await;
        let present_current = self.controller.present_current().await;
        let limits = self.controller.limits();
        let receipt =
            self.controller.receipt_required() && self.selected_payment == Some(PaymentOption::Contract);

        let target_current = req.ev_target_current.scaled();
        Ok((
            BodyV2::CurrentDemandRes(m2::CurrentDemandRes {
                response_code: ResponseCodeV2::Ok,
                dc_evse_status: self.dc_status(notification),
                evse_present_voltage: volts(present_voltage),
                evse_present_current: amps(present_current),
                evse_current_limit_achieved: target_current >= f64::from(limits.max_current_a),
                evse_voltage_limit_achieved: present_voltage >= f64::from(limits.max_voltage_v),
                evse_power_limit_achieved: present_voltage * present_current
                    >= f64::from(limits.max_power_w),
                evse_maximum_voltage_limit: Some(PhysicalValue::volts(limits.max_voltage_v as i16)),
                evse_maximum_current_limit: Some(PhysicalValue::amperes(
                    limits.max_current_a as i16,
                )),
                evse_maximum_power_limit: Some(PhysicalValue::watts(
                    (limits.max_power_w / 1000).min(i16::MAX as u32) as i16,
                    3,
                )),
                evse_id: self.controller.evse_id(),
                sa_schedule_tuple_id: self.active_tuple_id.unwrap_or(1),
                meter_info: Some(self.controller.meter_info().await),
                receipt_required: Some(receipt),
            }),
            SeccState::ChargingLoop,
        ))
    }

    fn on_metering_receipt_v2(
        &mut self,
        header: &m2::HeaderV2,
        req: m2::MeteringReceiptReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        if req.session_id != self.session_id {
            return Err(ProtocolError::SessionIdMismatch {
                expected: self.session_id.to_hex(),
                got: req.session_id.to_hex(),
            }
            .into());
        }
        if self.selected_payment == Some(PaymentOption::Contract) {
            let leaf = self
                .contract_leaf
                .clone()
                .ok_or_else(|| self.reject(FailCode::CertChainError, "no contract certificate"))?;
            self.verify_header_signature_v2(header, &BodyV2::MeteringReceiptReq(req), &leaf)?;
        }
        let mode = self.selected_mode.unwrap_or(EnergyTransferMode::AcThreePhaseCore);
        let evse_status = if mode.is_ac() {
            m2::EvseStatus::Ac(self.ac_status(EvseNotification::None))
        } else {
            m2::EvseStatus::Dc(self.dc_status(EvseNotification::None))
        };
        Ok((
            BodyV2::MeteringReceiptRes(m2::MeteringReceiptRes {
                response_code: ResponseCodeV2::Ok,
                evse_status,
            }),
            SeccState::ChargingLoop,
        ))
    }

    async fn on_welding_detection_v2(
        &mut self,
        _req: m2::WeldingDetectionReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        let present = self.controller.present_voltage().await;
        Ok((
            BodyV2::WeldingDetectionRes(m2::WeldingDetectionRes {
                response_code: ResponseCodeV2::Ok,
                dc_evse_status: self.dc_status(EvseNotification::None),
                evse_present_voltage: volts(present),
            }),
            SeccState::PostCharge,
        ))
    }

    fn on_session_stop_v2(
        &mut self,
        req: m2::SessionStopReq,
    ) -> Result<(BodyV2, SeccState), SeccError> {
        let phase = match req.charging_session {
            ChargingSession::Terminate => SessionPhase::Terminated,
            ChargingSession::Pause => SessionPhase::Paused,
        };
        self.store.update(self.session_id, |r| r.phase = phase);
        info!(session_id = %self.session_id, ?phase, "session stop requested");
        Ok((
            BodyV2::SessionStopRes(m2::SessionStopRes {
                response_code: ResponseCodeV2::Ok,
            }),
            SeccState::Terminated,
        ))
    }

    /// Recompute the canonical fragment of `body` and check the
    /// detached signature in the header against `signer_der`.
    fn verify_header_signature_v2(
        &self,
        header: &m2::HeaderV2,
        body: &BodyV2,
        signer_der: &[u8],
    ) -> Result<(), SeccError> {
        let signature = header
            .signature
            .as_ref()
            .ok_or_else(|| self.reject(FailCode::SignatureError, "missing signature"))?;
        let probe = Message::V2(MessageV2::new(header.session_id, body.clone()));
        let fragment = signed_fragment(&probe)?
            .ok_or_else(|| self.reject(FailCode::SignatureError, "message is not signable"))?;
        if fragment_digest(&fragment) != signature.digest {
            return Err(self.reject(FailCode::SignatureError, "digest mismatch"));
        }
        verify_detached(signer_der, &fragment, &signature.signature_value)?;
        Ok(())
    }

    fn establish_session(
        &mut self,
        header_id: SessionId,
    ) -> Result<(EstablishOutcome, SeccState), SeccError> {
        if !header_id.is_zero() {
            if let Some(record) = self.store.get(&header_id) {
                if record.phase == SessionPhase::Paused {
                    // Resumed session: same id, straight back to
                    // charge parameter discovery
                    self.session_id = header_id;
                    self.store.update(header_id, |r| {
                        r.phase = SessionPhase::Active;
                        r.state = SeccState::ChargeParameterDiscovery.to_string();
                    });
                    self.offered_payment_options = self.policy.supported_auth_options.clone();
                    self.offered_modes = self.controller.supported_energy_transfer_modes();
                    self.selected_payment = Some(PaymentOption::ExternalPayment);
                    return Ok((EstablishOutcome::Resumed, SeccState::ChargeParameterDiscovery));
                }
            }
        }
        self.session_id = SessionId::random();
        self.store
            .insert(SessionRecord::new(self.session_id, self.tls, now_ts() as u64));
        info!(session_id = %self.session_id, "new session established");
        Ok((EstablishOutcome::New, SeccState::ServiceDiscovery))
    }

    fn ac_status(&self, notification: EvseNotification) -> m2::AcEvseStatus {
        m2::AcEvseStatus {
            notification_max_delay: 0,
            evse_notification: notification,
            rcd: false,
        }
    }

    fn dc_status(&self, notification: EvseNotification) -> m2::DcEvseStatus {
        m2::DcEvseStatus {
            notification_max_delay: 0,
            evse_notification: notification,
            evse_isolation_status: Some(m2::IsolationLevel::Valid),
            evse_status_code: m2::DcEvseStatusCode::Ready,
        }
    }

    // =========================================================================
    // ISO 15118-20 handlers
    // =========================================================================

    async fn on_v20(&mut self, m: MessageV20) -> Result<(Message, SeccState), SeccError> {
        let header = m.header.clone();
        let (body, next) = match m.body {
            BodyV20::SessionSetupReq(req) => {
                let (outcome, next) = self.establish_session(header.session_id)?;
                // -20 runs AuthorizationSetup before service discovery
                let next = if next == SeccState::ServiceDiscovery {
                    SeccState::AuthorizationSetup
                } else {
                    next
                };
                self.store.update(self.session_id, |r| {
                    r.dialect = Some("iso20".to_string());
                    r.evcc_id = Some(req.evcc_id.clone());
                });
                let code = match outcome {
                    EstablishOutcome::New => ResponseCodeV20::OkNewSessionEstablished,
                    EstablishOutcome::Resumed => ResponseCodeV20::OkOldSessionJoined,
                };
                (
                    BodyV20::SessionSetupRes(m20::SessionSetupResV20 {
                        response_code: code,
                        evse_id: self.controller.evse_id_v20(),
                    }),
                    next,
                )
            }
            BodyV20::AuthorizationSetupReq(_) => {
                let mut services = vec![m20::AuthorizationType::Eim];
                if self.tls
                    && self
                        .policy
                        .supported_auth_options
                        .contains(&PaymentOption::Contract)
                {
                    services.push(m20::AuthorizationType::Pnc);
                }
                let gen_challenge = if services.contains(&m20::AuthorizationType::Pnc) {
                    let challenge: [u8; 16] = rand::thread_rng().gen();
                    self.challenge = Some(challenge);
                    Some(challenge)
                } else {
                    None
                };
                self.offered_payment_options = self.policy.supported_auth_options.clone();
                (
                    BodyV20::AuthorizationSetupRes(m20::AuthorizationSetupRes {
                        response_code: ResponseCodeV20::Ok,
                        authorization_services: services,
                        certificate_installation_service: self.policy.allow_cert_install_service,
                        gen_challenge,
                    }),
                    SeccState::Authorization,
                )
            }
            BodyV20::AuthorizationReq(req) => self.on_authorization_v20(&header, req).await?,
            BodyV20::ServiceDiscoveryReq(_) => {
                self.offered_modes = self.controller.supported_energy_transfer_modes();
                self.offered_service_ids = vec![CHARGE_SERVICE_ID];
                (
                    BodyV20::ServiceDiscoveryRes(m20::ServiceDiscoveryResV20 {
                        response_code: ResponseCodeV20::Ok,
                        service_renegotiation_supported: true,
                        energy_transfer_service_list: vec![m20::ServiceV20 {
                            service_id: CHARGE_SERVICE_ID,
                            free_service: self.policy.free_charging_service,
                        }],
                        vas_list: vec![],
                    }),
                    SeccState::ServiceSelection,
                )
            }
            BodyV20::ServiceDetailReq(req) => {
                if !self.offered_service_ids.contains(&req.service_id) {
                    return Err(self.reject(
                        FailCode::ServiceSelectionInvalid,
                        format!("service {} was not offered", req.service_id),
                    ));
                }
                (
                    BodyV20::ServiceDetailRes(m20::ServiceDetailResV20 {
                        response_code: ResponseCodeV20::Ok,
                        service_id: req.service_id,
                        parameter_set_ids: vec![1],
                    }),
                    SeccState::ServiceSelection,
                )
            }
            BodyV20::ServiceSelectionReq(req) => {
                if !self
                    .offered_service_ids
                    .contains(&req.selected_energy_transfer_service.service_id)
                {
                    return Err(self.reject(
                        FailCode::ServiceSelectionInvalid,
                        "energy service was not offered",
                    ));
                }
                self.selected_mode = Some(EnergyTransferMode::DcExtended);
                self.store
                    .update(self.session_id, |r| r.energy_mode = Some("DcExtended".into()));
                (
                    BodyV20::ServiceSelectionRes(m20::ServiceSelectionRes {
                        response_code: ResponseCodeV20::Ok,
                    }),
                    SeccState::ChargeParameterDiscovery,
                )
            }
            BodyV20::DcChargeParameterDiscoveryReq(_) => {
                let limits = self.controller.limits();
                (
                    BodyV20::DcChargeParameterDiscoveryRes(m20::DcChargeParameterDiscoveryRes {
                        response_code: ResponseCodeV20::Ok,
                        evse_maximum_charge_power: RationalNumber::new(
                            (limits.max_power_w / 1000).min(i16::MAX as u32) as i16,
                            3,
                        ),
                        evse_minimum_charge_power: RationalNumber::new(1, 3),
                        evse_maximum_charge_current: RationalNumber::new(
                            limits.max_current_a as i16,
                            0,
                        ),
                        evse_minimum_charge_current: RationalNumber::new(
                            limits.min_current_a as i16,
                            0,
                        ),
                        evse_maximum_voltage: RationalNumber::new(limits.max_voltage_v as i16, 0),
                        evse_minimum_voltage: RationalNumber::new(limits.min_voltage_v as i16, 0),
                        evse_power_ramp_limitation: None,
                    }),
                    SeccState::ScheduleExchange,
                )
            }
            BodyV20::ScheduleExchangeReq(req) => {
                let schedule = self
                    .controller
                    .build_schedule(ScheduleRequirements {
                        mode: self.selected_mode.unwrap_or(EnergyTransferMode::DcExtended),
                        departure_time: req.departure_time,
                        energy_request_wh: req
                            .ev_target_energy_request
                            .map(|e| e.scaled().max(0.0) as u32),
                        ev_max_power_w: 50_000,
                    })
                    .await;
                let entries = schedule
                    .windows
                    .iter()
                    .map(|w| m20::PowerScheduleEntryV20 {
                        duration: w.duration,
                        power: RationalNumber::new(
                            (w.max_power_w / 1000).min(i16::MAX as u32) as i16,
                            3,
                        ),
                    })
                    .collect();
                let tuple_id = schedule.tuple_id;
                self.offered_schedules = vec![schedule];
                (
                    BodyV20::ScheduleExchangeRes(m20::ScheduleExchangeRes {
                        response_code: ResponseCodeV20::Ok,
                        evse_processing: m20::Processing::Finished,
                        schedule_tuples: vec![m20::ScheduleTupleV20 {
                            schedule_tuple_id: tuple_id,
                            schedule_entries: entries,
                        }],
                    }),
                    SeccState::ChargeLoopEntry,
                )
            }
            BodyV20::DcCableCheckReq(_) => (
                BodyV20::DcCableCheckRes(m20::DcCableCheckRes {
                    response_code: ResponseCodeV20::Ok,
                    evse_processing: m20::Processing::Finished,
                }),
                SeccState::CableCheck,
            ),
            BodyV20::DcPreChargeReq(req) => {
                self.controller
                    .set_precharge_target(req.ev_target_voltage.scaled(), 2.0)
                    .await;
                let present = self.controller.present_voltage().await;
                (
                    BodyV20::DcPreChargeRes(m20::DcPreChargeRes {
                        response_code: ResponseCodeV20::Ok,
                        evse_present_voltage: RationalNumber::new(present as i16, 0),
                    }),
                    SeccState::PreCharge,
                )
            }
            BodyV20::PowerDeliveryReq(req) => {
                let next = match req.charge_progress {
                    m20::ChargeProgressV20::Start => {
                        if let Some(tuple_id) = req.selected_schedule_tuple_id {
                            if !self.offered_schedules.iter().any(|s| s.tuple_id == tuple_id) {
                                return Err(self.reject(
                                    FailCode::TariffSelectionInvalid,
                                    format!("schedule tuple {} was not offered", tuple_id),
                                ));
                            }
                            self.active_tuple_id = Some(tuple_id);
                            self.store.update(self.session_id, |r| {
                                r.schedule_tuple_id = Some(tuple_id)
                            });
                        }
                        self.controller.set_charging(true).await;
                        SeccState::ChargingLoop
                    }
                    m20::ChargeProgressV20::Stop => {
                        self.controller.set_charging(false).await;
                        SeccState::PostCharge
                    }
                    m20::ChargeProgressV20::Standby => SeccState::ChargingLoop,
                    m20::ChargeProgressV20::ScheduleRenegotiation => SeccState::ScheduleExchange,
                };
                (
                    BodyV20::PowerDeliveryRes(m20::PowerDeliveryResV20 {
                        response_code: ResponseCodeV20::Ok,
                        evse_status: Some(self.status_v20(m20::EvseNotificationV20::ExitStandby)),
                    }),
                    next,
                )
            }
            BodyV20::DcChargeLoopReq(req) => {
                let notification = if self.store.cancel_requested(&self.session_id)
                    || self.controller.should_stop().await
                {
                    Some(m20::EvseNotificationV20::Terminate)
                } else if self.controller.renegotiation_requested().await {
                    Some(m20::EvseNotificationV20::ScheduleRenegotiation)
                } else {
                    None
                };
                let present_voltage = self.controller.present_voltage().await;
                let present_current = self.controller.present_current().await;
                let limits = self.controller.limits();
                let meter_info = if req.meter_info_requested {
                    Some(self.controller.meter_info().await)
                } else {
                    None
                };
                (
                    BodyV20::DcChargeLoopRes(m20::DcChargeLoopRes {
                        response_code: ResponseCodeV20::Ok,
                        evse_present_current: RationalNumber::new(present_current as i16, 0),
                        evse_present_voltage: RationalNumber::new(present_voltage as i16, 0),
                        evse_power_limit_achieved: present_voltage * present_current
                            >= f64::from(limits.max_power_w),
                        evse_current_limit_achieved: present_current
                            >= f64::from(limits.max_current_a),
                        evse_voltage_limit_achieved: present_voltage
                            >= f64::from(limits.max_voltage_v),
                        evse_status: notification.map(|n| self.status_v20(n)),
                        meter_info,
                    }),
                    SeccState::ChargingLoop,
                )
            }
            BodyV20::DcWeldingDetectionReq(_) => {
                let present = self.controller.present_voltage().await;
                (
                    BodyV20::DcWeldingDetectionRes(m20::DcWeldingDetectionRes {
                        response_code: ResponseCodeV20::Ok,
                        evse_present_voltage: RationalNumber::new(present as i16, 0),
                    }),
                    SeccState::PostCharge,
                )
            }
            BodyV20::SessionStopReq(req) => {
                let phase = match req.charging_session {
                    ChargingSession::Terminate => SessionPhase::Terminated,
                    ChargingSession::Pause => SessionPhase::Paused,
                };
                self.store.update(self.session_id, |r| r.phase = phase);
                info!(session_id = %self.session_id, ?phase, "session stop requested");
                (
                    BodyV20::SessionStopRes(m20::SessionStopResV20 {
                        response_code: ResponseCodeV20::Ok,
                    }),
                    SeccState::Terminated,
                )
            }
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    state: self.state.to_string(),
                    kind: MessageV20::new(self.session_id, 0, other).body_kind().to_string(),
                }
                .into())
            }
        };
        Ok((self.msg20(body), next))
    }

    async fn on_authorization_v20(
        &mut self,
        header: &m20::HeaderV20,
        req: m20::AuthorizationReqV20,
    ) -> Result<(BodyV20, SeccState), SeccError> {
        let method = match req.selected_authorization_service {
            m20::AuthorizationType::Eim => PaymentOption::ExternalPayment,
            m20::AuthorizationType::Pnc => PaymentOption::Contract,
        };
        if method == PaymentOption::Contract {
            if !self.tls {
                return Err(self.reject(
                    FailCode::PaymentSelectionInvalid,
                    "PnC requires a TLS session",
                ));
            }
            if req.gen_challenge != self.challenge {
                return Err(self.reject(FailCode::ChallengeInvalid, "challenge mismatch"));
            }
            let chain = req
                .contract_certificate_chain
                .as_ref()
                .ok_or_else(|| self.reject(FailCode::CertChainError, "missing contract chain"))?;
            let anchors_role = if self.pki.anchors(AnchorRole::Contract).is_empty() {
                AnchorRole::Mo
            } else {
                AnchorRole::Contract
            };
            self.pki.validate(&chain.certificates, anchors_role, now_ts())?;
            let leaf = chain
                .leaf()
                .ok_or_else(|| self.reject(FailCode::CertChainError, "empty contract chain"))?
                .to_vec();
            self.contract_leaf = Some(leaf.clone());

            let signature = header
                .signature
                .as_ref()
                .ok_or_else(|| self.reject(FailCode::SignatureError, "missing signature"))?;
            let probe = Message::V20(MessageV20::new(
                header.session_id,
                header.timestamp,
                BodyV20::AuthorizationReq(req.clone()),
            ));
            let fragment = signed_fragment(&probe)?
                .ok_or_else(|| self.reject(FailCode::SignatureError, "message is not signable"))?;
            if fragment_digest(&fragment) != signature.digest {
                return Err(self.reject(FailCode::SignatureError, "digest mismatch"));
            }
            verify_detached(&leaf, &fragment, &signature.signature_value)?;
        }
        self.selected_payment = Some(method);
        let auth_name = format!("{:?}", method);
        self.store
            .update(self.session_id, |r| r.auth_method = Some(auth_name));

        let status = self.controller.is_authorized(&self.session_id, method).await;
        let (processing, next) = match status {
            AuthStatus::Accepted => (m20::Processing::Finished, SeccState::ServiceDiscovery),
            AuthStatus::Ongoing => (m20::Processing::Ongoing, SeccState::Authorization),
            AuthStatus::Rejected => {
                return Err(self.reject(FailCode::Generic, "authorization rejected"))
            }
        };
        Ok((
            BodyV20::AuthorizationRes(m20::AuthorizationResV20 {
                response_code: ResponseCodeV20::Ok,
                evse_processing: processing,
            }),
            next,
        ))
    }

    fn status_v20(&self, notification: m20::EvseNotificationV20) -> m20::EvseStatusV20 {
        m20::EvseStatusV20 {
            notification_max_delay: 0,
            evse_notification: notification,
        }
    }

    pub fn state(&self) -> SeccState {
        self.state
    }
}

enum EstablishOutcome {
    New,
    Resumed,
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

fn volts(v: f64) -> PhysicalValue {
    PhysicalValue::volts(v.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16)
}

fn amps(a: f64) -> PhysicalValue {
    PhysicalValue::amperes(a.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16)
}

/// Minimal schema-conformant FAILED_* response for a -2 request kind.
fn failed_body_v2(kind: MessageKind, code: ResponseCodeV2) -> Option<BodyV2> {
    use MessageKind::*;
    let stub_ac_status = m2::AcEvseStatus {
        notification_max_delay: 0,
        evse_notification: EvseNotification::None,
        rcd: false,
    };
    let stub_dc_status = m2::DcEvseStatus {
        notification_max_delay: 0,
        evse_notification: EvseNotification::None,
        evse_isolation_status: None,
        evse_status_code: m2::DcEvseStatusCode::NotReady,
    };
    let body = match kind {
        SessionSetupReq => BodyV2::SessionSetupRes(m2::SessionSetupRes {
            response_code: code,
            evse_id: String::new(),
            evse_timestamp: None,
        }),
        ServiceDiscoveryReq => BodyV2::ServiceDiscoveryRes(m2::ServiceDiscoveryRes {
            response_code: code,
            payment_options: vec![],
            charge_service: m2::ChargeService {
                service_id: 0,
                service_name: None,
                free_service: false,
                supported_energy_transfer_modes: vec![],
            },
            service_list: vec![],
        }),
        ServiceDetailReq => BodyV2::ServiceDetailRes(m2::ServiceDetailRes {
            response_code: code,
            service_id: 0,
            service_parameter_list: vec![],
        }),
        PaymentServiceSelectionReq => {
            BodyV2::PaymentServiceSelectionRes(m2::PaymentServiceSelectionRes {
                response_code: code,
            })
        }
        PaymentDetailsReq => BodyV2::PaymentDetailsRes(m2::PaymentDetailsRes {
            response_code: code,
            gen_challenge: [0; 16],
            evse_timestamp: 0,
        }),
        CertificateInstallationReq => {
            BodyV2::CertificateInstallationRes(m2::CertificateInstallationRes {
                response_code: code,
                sa_provisioning_certificate_chain: CertificateChain::default(),
                contract_signature_cert_chain: CertificateChain::default(),
                encrypted_private_key: vec![],
                dh_public_key: vec![],
                emaid: String::new(),
            })
        }
        AuthorizationReq => BodyV2::AuthorizationRes(m2::AuthorizationRes {
            response_code: code,
            evse_processing: EvseProcessing::Finished,
        }),
        ChargeParameterDiscoveryReq => {
            BodyV2::ChargeParameterDiscoveryRes(m2::ChargeParameterDiscoveryRes {
                response_code: code,
                evse_processing: EvseProcessing::Finished,
                sa_schedule_list: vec![],
                evse_charge_parameter: m2::EvseChargeParameter::Ac(m2::AcEvseChargeParameter {
                    ac_evse_status: stub_ac_status.clone(),
                    evse_nominal_voltage: PhysicalValue::volts(0),
                    evse_max_current: PhysicalValue::amperes(0),
                }),
            })
        }
        CableCheckReq => BodyV2::CableCheckRes(m2::CableCheckRes {
            response_code: code,
            dc_evse_status: stub_dc_status.clone(),
            evse_processing: EvseProcessing::Finished,
        }),
        PreChargeReq => BodyV2::PreChargeRes(m2::PreChargeRes {
            response_code: code,
            dc_evse_status: stub_dc_status.clone(),
            evse_present_voltage: PhysicalValue::volts(0),
        }),
        PowerDeliveryReq => BodyV2::PowerDeliveryRes(m2::PowerDeliveryRes {
            response_code: code,
            evse_status: m2::EvseStatus::Ac(stub_ac_status.clone()),
        }),
        ChargingStatusReq => BodyV2::ChargingStatusRes(m2::ChargingStatusRes {
            response_code: code,
            evse_id: String::new(),
            sa_schedule_tuple_id: 0,
            evse_max_current: None,
            meter_info: None,
            receipt_required: None,
            ac_evse_status: stub_ac_status.clone(),
        }),
        CurrentDemandReq => BodyV2::CurrentDemandRes(m2::CurrentDemandRes {
            response_code: code,
            dc_evse_status: stub_dc_status.clone(),
            evse_present_voltage: PhysicalValue::volts(0),
            evse_present_current: PhysicalValue::amperes(0),
            evse_current_limit_achieved: false,
            evse_voltage_limit_achieved: false,
            evse_power_limit_achieved: false,
            evse_maximum_voltage_limit: None,
            evse_maximum_current_limit: None,
            evse_maximum_power_limit: None,
            evse_id: String::new(),
            sa_schedule_tuple_id: 0,
            meter_info: None,
            receipt_required: None,
        }),
        MeteringReceiptReq => BodyV2::MeteringReceiptRes(m2::MeteringReceiptRes {
            response_code: code,
            evse_status: m2::EvseStatus::Ac(stub_ac_status),
        }),
        WeldingDetectionReq => BodyV2::WeldingDetectionRes(m2::WeldingDetectionRes {
            response_code: code,
            dc_evse_status: stub_dc_status,
            evse_present_voltage: PhysicalValue::volts(0),
        }),
        SessionStopReq => BodyV2::SessionStopRes(m2::SessionStopRes {
            response_code: code,
        }),
        _ => return None,
    };
    Some(body)
}

/// Minimal schema-conformant FAILED_* response for a -20 request kind.
fn failed_body_v20(kind: MessageKind, code: ResponseCodeV20) -> Option<BodyV20> {
    use MessageKind::*;
    let body = match kind {
        SessionSetupReq => BodyV20::SessionSetupRes(m20::SessionSetupResV20 {
            response_code: code,
            evse_id: String::new(),
        }),
        AuthorizationSetupReq => BodyV20::AuthorizationSetupRes(m20::AuthorizationSetupRes {
            response_code: code,
            authorization_services: vec![m20::AuthorizationType::Eim],
            certificate_installation_service: false,
            gen_challenge: None,
        }),
        AuthorizationReq => BodyV20::AuthorizationRes(m20::AuthorizationResV20 {
            response_code: code,
            evse_processing: m20::Processing::Finished,
        }),
        ServiceDiscoveryReq => BodyV20::ServiceDiscoveryRes(m20::ServiceDiscoveryResV20 {
            response_code: code,
            service_renegotiation_supported: false,
            energy_transfer_service_list: vec![],
            vas_list: vec![],
        }),
        ServiceDetailReq => BodyV20::ServiceDetailRes(m20::ServiceDetailResV20 {
            response_code: code,
            service_id: 0,
            parameter_set_ids: vec![],
        }),
        ServiceSelectionReq => BodyV20::ServiceSelectionRes(m20::ServiceSelectionRes {
            response_code: code,
        }),
        ChargeParameterDiscoveryReq => {
            BodyV20::DcChargeParameterDiscoveryRes(m20::DcChargeParameterDiscoveryRes {
                response_code: code,
                evse_maximum_charge_power: RationalNumber::new(0, 0),
                evse_minimum_charge_power: RationalNumber::new(0, 0),
                evse_maximum_charge_current: RationalNumber::new(0, 0),
                evse_minimum_charge_current: RationalNumber::new(0, 0),
                evse_maximum_voltage: RationalNumber::new(0, 0),
                evse_minimum_voltage: RationalNumber::new(0, 0),
                evse_power_ramp_limitation: None,
            })
        }
        ScheduleExchangeReq => BodyV20::ScheduleExchangeRes(m20::ScheduleExchangeRes {
            response_code: code,
            evse_processing: m20::Processing::Finished,
            schedule_tuples: vec![],
        }),
        CableCheckReq => BodyV20::DcCableCheckRes(m20::DcCableCheckRes {
            response_code: code,
            evse_processing: m20::Processing::Finished,
        }),
        PreChargeReq => BodyV20::DcPreChargeRes(m20::DcPreChargeRes {
            response_code: code,
            evse_present_voltage: RationalNumber::new(0, 0),
        }),
        PowerDeliveryReq => BodyV20::PowerDeliveryRes(m20::PowerDeliveryResV20 {
            response_code: code,
            evse_status: None,
        }),
        ChargeLoopReq => BodyV20::DcChargeLoopRes(m20::DcChargeLoopRes {
            response_code: code,
            evse_present_current: RationalNumber::new(0, 0),
            evse_present_voltage: RationalNumber::new(0, 0),
            evse_power_limit_achieved: false,
            evse_current_limit_achieved: false,
            evse_voltage_limit_achieved: false,
            evse_status: None,
            meter_info: None,
        }),
        WeldingDetectionReq => BodyV20::DcWeldingDetectionRes(m20::DcWeldingDetectionRes {
            response_code: code,
            evse_present_voltage: RationalNumber::new(0, 0),
        }),
        SessionStopReq => BodyV20::SessionStopRes(m20::SessionStopResV20 {
            response_code: code,
        }),
        _ => return None,
    };
    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_bodies_echo_the_code() {
        let body = failed_body_v2(
            MessageKind::SessionSetupReq,
            ResponseCodeV2::FailedUnknownSession,
        )
        .unwrap();
        let msg = MessageV2::new(SessionId::ZERO, body);
        assert_eq!(
            msg.response_code(),
            Some(ResponseCodeV2::FailedUnknownSession)
        );

        let body = failed_body_v20(
            MessageKind::ChargeLoopReq,
            ResponseCodeV20::FailedSequenceError,
        )
        .unwrap();
        let msg = MessageV20::new(SessionId::ZERO, 0, body);
        assert_eq!(
            msg.response_code(),
            Some(ResponseCodeV20::FailedSequenceError)
        );
    }

    #[test]
    fn responses_have_no_failed_body() {
        assert!(failed_body_v2(MessageKind::SessionSetupRes, ResponseCodeV2::Failed).is_none());
    }
}
