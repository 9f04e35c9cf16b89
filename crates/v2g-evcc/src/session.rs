//! The EVCC session state machine
//!
//! Drives the whole dialogue from SupportedAppProtocol to SessionStop.
//! Every outbound request arms exactly one timer; the paired response
//! cancels it, expiry terminates the session. Generic over the byte
//! stream so tests can run it over in-memory pipes.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;
use tracing::{debug, error, info};

use v2g_codec::signed_fragment;
use v2g_core::dialect::{AppProtocol, Dialect, TimerKind};
use v2g_core::error::ProtocolError;
use v2g_core::messages::app_protocol::SupportedAppProtocolReq;
use v2g_core::messages::common::{
    ChargingSession, DetachedSignature, EnergyTransferMode, EvseNotification, EvseProcessing,
    MeterInfo, PaymentOption, PhysicalValue, RationalNumber,
};
use v2g_core::messages::iso2::{self as m2, BodyV2, MessageV2};
use v2g_core::messages::iso20::{self as m20, BodyV20, MessageV20};
use v2g_core::messages::{Message, MessageKind};
use v2g_core::schedule::ChargingSchedule;
use v2g_core::session::{SessionId, StopReason};
use v2g_core::shutdown::{self, ShutdownSignal};
use v2g_pki::{fragment_digest, subject_common_name, SigningKey, TrustStore};
use v2g_transport::FramedStream;

use crate::controller::EvController;
use crate::error::EvccError;

/// States of the EVCC engine, -2 naming; the -20 flow maps onto the
/// closest equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvccState {
    SupportedAppProtocol,
    SessionSetup,
    ServiceDiscovery,
    ServiceDetail,
    PaymentServiceSelection,
    PaymentDetails,
    Authorization,
    ChargeParameterDiscovery,
    ScheduleExchange,
    ServiceSelection,
    CableCheck,
    PreCharge,
    PowerDelivery,
    ChargingStatus,
    CurrentDemand,
    ChargeLoop,
    MeteringReceipt,
    WeldingDetection,
    SessionStop,
    Terminated,
}

impl std::fmt::Display for EvccState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Cadence of the charging loop.
const LOOP_TICK: Duration = Duration::from_secs(1);
/// Poll interval while the peer reports EVSEProcessing=Ongoing.
const ONGOING_POLL: Duration = Duration::from_millis(500);
/// Voltage agreement band that ends pre-charge, in volts.
const PRECHARGE_BAND_V: f64 = 20.0;

struct PncSigner {
    key: SigningKey,
    chain: Vec<Vec<u8>>,
    emaid: String,
}

/// One EVCC charging session over an established stream.
pub struct EvccSession<S> {
    stream: FramedStream<S>,
    controller: Arc<dyn EvController>,
    pki: Arc<TrustStore>,
    protocols: Vec<AppProtocol>,
    tls: bool,
    dialect: Dialect,
    state: EvccState,
    session_id: SessionId,
    evse_id: String,
    schedule: Option<ChargingSchedule>,
    signer: Option<PncSigner>,
    challenge: Option<[u8; 16]>,
    shutdown: Option<ShutdownSignal>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> EvccSession<S> {
    pub fn new(
        stream: S,
        controller: Arc<dyn EvController>,
        pki: Arc<TrustStore>,
        protocols: Vec<AppProtocol>,
        tls: bool,
    ) -> Self {
        Self {
            // SAP always travels under the -2 payload limits
            stream: FramedStream::new(stream, Dialect::Iso2.max_payload_len()),
            controller,
            pki,
            protocols,
            tls,
            dialect: Dialect::Iso2,
            state: EvccState::SupportedAppProtocol,
            session_id: SessionId::ZERO,
            evse_id: String::new(),
            schedule: None,
            signer: None,
            challenge: None,
            shutdown: None,
        }
    }

    /// Observe the process-wide shutdown flag; raising it makes the
    /// session send SessionStop when the dialogue allows one and close.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Run the session to completion, emitting the single structured
    /// diagnostic record on the way out.
    pub async fn run(mut self) -> StopReason {
        let result = self.drive().await;
        let reason = match result {
            Ok(()) => StopReason::graceful(
                self.session_id,
                &EvccState::Terminated.to_string(),
                "session stopped",
            ),
            Err(EvccError::Cancelled) => {
                // External cancellation, not a protocol fault: try the
                // SessionStop farewell and report a clean stop
                self.attempt_graceful_stop(&EvccError::Cancelled).await;
                StopReason::graceful(self.session_id, &self.state.to_string(), "external shutdown")
            }
            Err(e) => {
                self.attempt_graceful_stop(&e).await;
                StopReason::fault(self.session_id, &self.state.to_string(), e.kind(), e.to_string())
            }
        };
        if reason.is_graceful() {
            info!(session_id = %reason.session_id, "EVCC session terminated");
        } else {
            error!(
                session_id = %reason.session_id,
                state = %reason.state,
                kind = %reason.kind.map(|k| k.to_string()).unwrap_or_default(),
                detail = %reason.detail,
                "EVCC session failed"
            );
        }
        reason
    }

    async fn drive(&mut self) -> Result<(), EvccError> {
        let dialect = self.negotiate_protocol().await?;
        self.dialect = dialect;
        self.stream.set_max_payload(dialect.max_payload_len());
        info!(dialect = ?dialect, tls = self.tls, "application protocol negotiated");
        match dialect {
            Dialect::Iso2 => self.drive_iso2().await,
            Dialect::Iso20 => self.drive_iso20().await,
        }
    }

    /// After a failure mid-session, give the SECC its SessionStop when
    /// the dialogue is far enough along for one to be legal.
    async fn attempt_graceful_stop(&mut self, error: &EvccError) {
        let established = !self.session_id.is_zero();
        let worth_trying = !matches!(
            error,
            EvccError::Transport(_) | EvccError::Codec(_) | EvccError::Config(_)
        );
        if !(established && worth_trying) {
            return;
        }
        debug!("sending SessionStop after failure");
        let stop = match self.dialect {
            Dialect::Iso2 => Message::V2(MessageV2::new(
                self.session_id,
                BodyV2::SessionStopReq(m2::SessionStopReq {
                    charging_session: ChargingSession::Terminate,
                }),
            )),
            Dialect::Iso20 => self.msg20(BodyV20::SessionStopReq(m20::SessionStopReqV20 {
                charging_session: ChargingSession::Terminate,
                ev_termination_code: Some("FAILED".to_string()),
                ev_termination_explanation: None,
            })),
        };
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            if let Ok(bytes) = v2g_codec::encode(&stop, self.dialect) {
                let _ = self.stream.write_raw(&bytes).await;
                let _ = self.stream.read_frame().await;
            }
        })
        .await;
    }

    // =========================================================================
    // Shared exchange plumbing
    // =========================================================================

    /// Send a request, arm its timer, wait for the paired response.
    /// This is the only place the EVCC reads the stream, so pairing
    /// and timer cancellation cannot race.
    async fn exchange(&mut self, request: Message, timer: TimerKind) -> Result<Message, EvccError> {
        let kind = request.kind();
        let Some(expected) = kind.paired_response() else {
            return Err(ProtocolError::UnexpectedMessage {
                state: self.state.to_string(),
                kind: kind.to_string(),
            }
            .into());
        };

        let bytes = v2g_codec::encode(&request, self.dialect)?;
        self.stream.write_raw(&bytes).await?;
        debug!(state = %self.state, request = %kind, "request sent");

        let deadline = self.dialect.timeout(timer);
        let frame = tokio::select! {
            _ = shutdown::cancelled(&mut self.shutdown) => return Err(EvccError::Cancelled),
            read = tokio::time::timeout(deadline, self.stream.read_frame()) => {
                read.map_err(|_| EvccError::Timeout(timer))??
            }
        };
        let frame = frame.ok_or(v2g_transport::TransportError::PeerClosed)?;

        let (_, reply) = v2g_codec::decode(&frame.to_bytes())?;
        if reply.kind() != expected {
            return Err(ProtocolError::UnexpectedMessage {
                state: self.state.to_string(),
                kind: reply.kind().to_string(),
            }
            .into());
        }
        if let Some(id) = reply.session_id() {
            if !self.session_id.is_zero() && id != self.session_id {
                return Err(ProtocolError::SessionIdMismatch {
                    expected: self.session_id.to_hex(),
                    got: id.to_hex(),
                }
                .into());
            }
        }
        if reply.is_failed_response() {
            let label = reply.response_code_label().unwrap_or_default();
            return Err(ProtocolError::PeerFailure(label).into());
        }
        Ok(reply)
    }

    async fn exchange_v2(&mut self, body: BodyV2, timer: TimerKind) -> Result<MessageV2, EvccError> {
        let reply = self
            .exchange(
                Message::V2(MessageV2::new(self.session_id, body)),
                timer,
            )
            .await?;
        match reply {
            Message::V2(m) => Ok(m),
            other => Err(self.unexpected(other.kind())),
        }
    }

    async fn exchange_v20(
        &mut self,
        body: BodyV20,
        timer: TimerKind,
    ) -> Result<MessageV20, EvccError> {
        let reply = self.exchange(self.msg20(body), timer).await?;
        match reply {
            Message::V20(m) => Ok(m),
            other => Err(self.unexpected(other.kind())),
        }
    }

    fn msg20(&self, body: BodyV20) -> Message {
        Message::V20(MessageV20::new(self.session_id, now_ts(), body))
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(ShutdownSignal::is_raised)
            .unwrap_or(false)
    }

    fn unexpected(&self, kind: MessageKind) -> EvccError {
        ProtocolError::UnexpectedMessage {
            state: self.state.to_string(),
            kind: kind.to_string(),
        }
        .into()
    }

    // =========================================================================
    // SupportedAppProtocol
    // =========================================================================

    async fn negotiate_protocol(&mut self) -> Result<Dialect, EvccError> {
        self.state = EvccState::SupportedAppProtocol;
        let req = Message::SupportedAppProtocolReq(SupportedAppProtocolReq {
            app_protocols: self.protocols.clone(),
        });
        let reply = self.exchange(req, TimerKind::Sequence).await?;
        let Message::SupportedAppProtocolRes(res) = reply else {
            return Err(self.unexpected(reply.kind()));
        };
        let schema_id = res.schema_id.ok_or_else(|| {
            EvccError::Protocol(ProtocolError::PeerFailure(
                "SAP response without schema id".to_string(),
            ))
        })?;
        let chosen = self
            .protocols
            .iter()
            .find(|p| p.schema_id == schema_id)
            .and_then(AppProtocol::dialect)
            .ok_or_else(|| {
                EvccError::Protocol(ProtocolError::PeerFailure(format!(
                    "SECC selected unknown schema id {}",
                    schema_id
                )))
            })?;
        Ok(chosen)
    }

    // =========================================================================
    // ISO 15118-2 flow
    // =========================================================================

    async fn drive_iso2(&mut self) -> Result<(), EvccError> {
        // SessionSetup: the SECC assigns the session id here
        self.state = EvccState::SessionSetup;
        let reply = self
            .exchange_v2(
                BodyV2::SessionSetupReq(m2::SessionSetupReq {
                    evcc_id: self.controller.evcc_id(),
                }),
                TimerKind::Sequence,
            )
            .await?;
        self.session_id = reply.header.session_id;
        let setup = match reply.body {
            BodyV2::SessionSetupRes(b) => b,
            _ => return Err(self.unexpected(MessageKind::SessionSetupRes)),
        };
        self.evse_id = setup.evse_id;
        info!(session_id = %self.session_id, evse_id = %self.evse_id, "session established");

        // ServiceDiscovery
        self.state = EvccState::ServiceDiscovery;
        let reply = self
            .exchange_v2(
                BodyV2::ServiceDiscoveryReq(m2::ServiceDiscoveryReq {
                    service_scope: None,
                    service_category: Some(m2::ServiceCategory::EvCharging),
                }),
                TimerKind::Sequence,
            )
            .await?;
        let discovery = match reply.body {
            BodyV2::ServiceDiscoveryRes(b) => b,
            _ => return Err(self.unexpected(MessageKind::ServiceDiscoveryRes)),
        };
        let mode = self.controller.energy_transfer_mode();
        if !discovery
            .charge_service
            .supported_energy_transfer_modes
            .contains(&mode)
        {
            return Err(ProtocolError::SelectionNotOffered(format!(
                "energy transfer mode {:?}",
                mode
            ))
            .into());
        }
        let auth = self.controller.auth_method();
        if !discovery.payment_options.contains(&auth) {
            return Err(
                ProtocolError::SelectionNotOffered(format!("payment option {:?}", auth)).into(),
            );
        }
        let charge_service_id = discovery.charge_service.service_id;

        // PaymentServiceSelection
        self.state = EvccState::PaymentServiceSelection;
        let reply = self
            .exchange_v2(
                BodyV2::PaymentServiceSelectionReq(m2::PaymentServiceSelectionReq {
                    selected_payment_option: auth,
                    selected_services: vec![m2::SelectedService {
                        service_id: charge_service_id,
                        parameter_set_id: None,
                    }],
                }),
                TimerKind::Sequence,
            )
            .await?;
        match reply.body {
            BodyV2::PaymentServiceSelectionRes(_) => {}
            _ => return Err(self.unexpected(MessageKind::PaymentServiceSelectionRes)),
        }

        // PaymentDetails (PnC only): present the contract chain, learn
        // the challenge the authorization must sign
        if auth == PaymentOption::Contract {
            self.load_signer()?;
            self.state = EvccState::PaymentDetails;
            let (emaid, chain) = match &self.signer {
                Some(signer) => (signer.emaid.clone(), signer.chain.clone()),
                None => {
                    return Err(EvccError::Security(v2g_pki::PkiError::MissingMaterial(
                        "contract identity".to_string(),
                    )))
                }
            };
            let reply = self
                .exchange_v2(
                    BodyV2::PaymentDetailsReq(m2::PaymentDetailsReq {
                        emaid,
                        contract_certificate_chain: v2g_core::messages::common::CertificateChain {
                            id: Some("ID1".to_string()),
                            certificates: chain,
                        },
                    }),
                    TimerKind::Sequence,
                )
                .await?;
            let details = match reply.body {
                BodyV2::PaymentDetailsRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::PaymentDetailsRes)),
            };
            self.challenge = Some(details.gen_challenge);
        }

        // Authorization, repeated while the SECC reports Ongoing
        self.state = EvccState::Authorization;
        self.authorize_iso2().await?;

        // ChargeParameterDiscovery and onwards
        self.state = EvccState::ChargeParameterDiscovery;
        self.discover_charge_parameters(mode).await?;

        if mode.is_dc() {
            self.state = EvccState::CableCheck;
            self.cable_check().await?;
            self.state = EvccState::PreCharge;
            self.pre_charge().await?;
        }

        self.state = EvccState::PowerDelivery;
        self.power_delivery_v2(m2::ChargeProgress::Start).await?;

        // The charging loop
        let stopped_by_evse = if mode.is_ac() {
            self.state = EvccState::ChargingStatus;
            self.charging_status_loop().await?
        } else {
            self.state = EvccState::CurrentDemand;
            self.current_demand_loop().await?
        };
        if stopped_by_evse {
            debug!("charging loop ended on EVSE notification");
        }

        self.state = EvccState::PowerDelivery;
        self.power_delivery_v2(m2::ChargeProgress::Stop).await?;

        if mode.is_dc() && self.controller.welding_detection_enabled() {
            self.state = EvccState::WeldingDetection;
            self.welding_detection().await?;
        }

        self.state = EvccState::SessionStop;
        let reply = self
            .exchange_v2(
                BodyV2::SessionStopReq(m2::SessionStopReq {
                    charging_session: ChargingSession::Terminate,
                }),
                TimerKind::Sequence,
            )
            .await?;
        match reply.body {
            BodyV2::SessionStopRes(_) => {}
            _ => return Err(self.unexpected(MessageKind::SessionStopRes)),
        }
        self.state = EvccState::Terminated;
        Ok(())
    }

    fn load_signer(&mut self) -> Result<(), EvccError> {
        if self.signer.is_some() {
            return Ok(());
        }
        let identity = self.pki.contract_identity().ok_or_else(|| {
            EvccError::Security(v2g_pki::PkiError::MissingMaterial(
                "contract certificate and key".to_string(),
            ))
        })?;
        let leaf = identity.chain.first().ok_or_else(|| {
            EvccError::Security(v2g_pki::PkiError::MissingMaterial(
                "contract leaf certificate".to_string(),
            ))
        })?;
        let emaid = subject_common_name(leaf)?;
        self.signer = Some(PncSigner {
            key: SigningKey::from_pkcs8(&identity.key_pkcs8)?,
            chain: identity.chain.clone(),
            emaid,
        });
        Ok(())
    }

    /// Attach the detached signature the PnC flow requires.
    fn sign_v2(&self, body: BodyV2) -> Result<MessageV2, EvccError> {
        let mut msg = MessageV2::new(self.session_id, body);
        if let Some(signer) = &self.signer {
            if let Some(fragment) = signed_fragment(&Message::V2(msg.clone()))? {
                msg.header.signature = Some(DetachedSignature {
                    referenced_id: "ID1".to_string(),
                    digest: fragment_digest(&fragment),
                    signature_value: signer.key.sign(&fragment)?,
                });
            }
        }
        Ok(msg)
    }

    async fn authorize_iso2(&mut self) -> Result<(), EvccError> {
        let body = BodyV2::AuthorizationReq(m2::AuthorizationReq {
            id: self.challenge.map(|_| "ID1".to_string()),
            gen_challenge: self.challenge,
        });
        let request = Message::V2(self.sign_v2(body)?);

        let phase_deadline = Instant::now() + self.dialect.timeout(TimerKind::Ongoing);
        loop {
            let reply = self.exchange(request.clone(), TimerKind::Sequence).await?;
            let processing = match reply {
                Message::V2(MessageV2 {
                    body: BodyV2::AuthorizationRes(res),
                    ..
                }) => res.evse_processing,
                other => return Err(self.unexpected(other.kind())),
            };
            match processing {
                EvseProcessing::Finished => return Ok(()),
                EvseProcessing::Ongoing
                | EvseProcessing::OngoingWaitingForCustomerInteraction => {
                    if Instant::now() >= phase_deadline {
                        return Err(EvccError::Timeout(TimerKind::Ongoing));
                    }
                    tokio::time::sleep(ONGOING_POLL).await;
                }
            }
        }
    }

    async fn discover_charge_parameters(
        &mut self,
        mode: EnergyTransferMode,
    ) -> Result<(), EvccError> {
        let battery = self.controller.battery().await;
        let departure_time = self.controller.departure_time().await;
        let ev_charge_parameter = if mode.is_ac() {
            m2::EvChargeParameter::Ac(m2::AcEvChargeParameter {
                departure_time,
                e_amount: PhysicalValue::watt_hours(
                    (battery.energy_request_wh / 1000).min(i16::MAX as u32) as i16,
                    3,
                ),
                ev_max_voltage: PhysicalValue::volts(battery.max_voltage as i16),
                ev_max_current: PhysicalValue::amperes(battery.max_current as i16),
                ev_min_current: PhysicalValue::amperes(6),
            })
        } else {
            m2::EvChargeParameter::Dc(m2::DcEvChargeParameter {
                departure_time,
                dc_ev_status: self.dc_ev_status(&battery, false),
                ev_maximum_current_limit: PhysicalValue::amperes(battery.max_current as i16),
                ev_maximum_power_limit: Some(PhysicalValue::watts(
                    (battery.max_power_w / 1000).min(i16::MAX as u32) as i16,
                    3,
                )),
                ev_maximum_voltage_limit: PhysicalValue::volts(battery.max_voltage as i16),
                ev_energy_capacity: None,
                ev_energy_request: Some(PhysicalValue::watt_hours(
                    (battery.energy_request_wh / 1000).min(i16::MAX as u32) as i16,
                    3,
                )),
                full_soc: Some(battery.target_soc),
                bulk_soc: None,
            })
        };

        let phase_deadline = Instant::now() + self.dialect.timeout(TimerKind::Ongoing);
        loop {
            let reply = self
                .exchange_v2(
                    BodyV2::ChargeParameterDiscoveryReq(m2::ChargeParameterDiscoveryReq {
                        max_entries_sa_schedule_tuple: Some(3),
                        requested_energy_transfer_mode: mode,
                        ev_charge_parameter: ev_charge_parameter.clone(),
                    }),
                    TimerKind::Ongoing,
                )
                .await?;
            let res = match reply.body {
                BodyV2::ChargeParameterDiscoveryRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::ChargeParameterDiscoveryRes)),
            };
            match res.evse_processing {
                EvseProcessing::Finished => {
                    let tuple = res.sa_schedule_list.first().ok_or_else(|| {
                        EvccError::Protocol(ProtocolError::PeerFailure(
                            "no SAScheduleTuple offered".to_string(),
                        ))
                    })?;
                    // The new schedule replaces the old one only here,
                    // once the SECC has actually offered it
                    self.schedule = Some(ChargingSchedule::from_sa_schedule_tuple(tuple));
                    return Ok(());
                }
                _ => {
                    if Instant::now() >= phase_deadline {
                        return Err(EvccError::Timeout(TimerKind::Ongoing));
                    }
                    tokio::time::sleep(ONGOING_POLL).await;
                }
            }
        }
    }

    fn dc_ev_status(&self, battery: &crate::controller::BatteryState, complete: bool) -> m2::DcEvStatus {
        m2::DcEvStatus {
            ev_ready: !complete,
            ev_error_code: m2::DcEvErrorCode::NoError,
            ev_ress_soc: battery.present_soc,
        }
    }

    async fn cable_check(&mut self) -> Result<(), EvccError> {
        let phase_deadline = Instant::now() + self.dialect.timeout(TimerKind::Ongoing);
        loop {
            let battery = self.controller.battery().await;
            let reply = self
                .exchange_v2(
                    BodyV2::CableCheckReq(m2::CableCheckReq {
                        dc_ev_status: self.dc_ev_status(&battery, false),
                    }),
                    TimerKind::Ongoing,
                )
                .await?;
            let res = match reply.body {
                BodyV2::CableCheckRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::CableCheckRes)),
            };
            if res.evse_processing == EvseProcessing::Finished {
                return Ok(());
            }
            if Instant::now() >= phase_deadline {
                return Err(EvccError::Timeout(TimerKind::Ongoing));
            }
            tokio::time::sleep(ONGOING_POLL).await;
        }
    }

    async fn pre_charge(&mut self) -> Result<(), EvccError> {
        let phase_deadline = Instant::now() + self.dialect.timeout(TimerKind::Ongoing);
        loop {
            let battery = self.controller.battery().await;
            let target_voltage = PhysicalValue::volts(battery.target_voltage as i16);
            let reply = self
                .exchange_v2(
                    BodyV2::PreChargeReq(m2::PreChargeReq {
                        dc_ev_status: self.dc_ev_status(&battery, false),
                        ev_target_voltage: target_voltage,
                        ev_target_current: PhysicalValue::amperes(2),
                    }),
                    TimerKind::Performance,
                )
                .await?;
            let res = match reply.body {
                BodyV2::PreChargeRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::PreChargeRes)),
            };
            let delta = (res.evse_present_voltage.scaled() - target_voltage.scaled()).abs();
            if delta <= PRECHARGE_BAND_V {
                return Ok(());
            }
            if Instant::now() >= phase_deadline {
                return Err(EvccError::Timeout(TimerKind::Ongoing));
            }
            tokio::time::sleep(ONGOING_POLL).await;
        }
    }

    async fn power_delivery_v2(&mut self, progress: m2::ChargeProgress) -> Result<(), EvccError> {
        let tuple_id = self.schedule.as_ref().map(|s| s.tuple_id).unwrap_or(1);
        let reply = self
            .exchange_v2(
                BodyV2::PowerDeliveryReq(m2::PowerDeliveryReq {
                    charge_progress: progress,
                    sa_schedule_tuple_id: tuple_id,
                    charging_profile: self
                        .schedule
                        .as_ref()
                        .filter(|_| progress == m2::ChargeProgress::Start)
                        .map(|s| m2::ChargingProfile {
                            entries: s
                                .windows
                                .iter()
                                .map(|w| m2::ChargingProfileEntry {
                                    start: w.start_offset,
                                    max_power: PhysicalValue::watts(
                                        (w.max_power_w / 1000).min(i16::MAX as u32) as i16,
                                        3,
                                    ),
                                    max_phases: None,
                                })
                                .collect(),
                        }),
                }),
                TimerKind::Sequence,
            )
            .await?;
        match reply.body {
            BodyV2::PowerDeliveryRes(_) => Ok(()),
            _ => Err(self.unexpected(MessageKind::PowerDeliveryRes)),
        }
    }

    /// Re-run ChargeParameterDiscovery mid-loop. The schedule in force
    /// stays valid until the new one is installed.
    async fn renegotiate_iso2(&mut self, mode: EnergyTransferMode) -> Result<(), EvccError> {
        info!("renegotiating charge parameters");
        self.state = EvccState::PowerDelivery;
        self.power_delivery_v2(m2::ChargeProgress::Renegotiate).await?;
        self.state = EvccState::ChargeParameterDiscovery;
        self.discover_charge_parameters(mode).await?;
        self.state = EvccState::PowerDelivery;
        self.power_delivery_v2(m2::ChargeProgress::Start).await?;
        Ok(())
    }

    /// AC loop. Returns true when the EVSE asked for the stop.
    async fn charging_status_loop(&mut self) -> Result<bool, EvccError> {
        let mut ticker = tokio::time::interval(LOOP_TICK);
        loop {
            ticker.tick().await;
            if self.shutdown_requested() {
                // Deliberate wind-down: the farewell exchanges that
                // follow must not themselves be cancelled
                self.shutdown = None;
                return Ok(false);
            }
            if self.controller.charging_should_stop().await {
                return Ok(false);
            }
            if self.controller.renegotiation_requested().await {
                self.renegotiate_iso2(self.controller.energy_transfer_mode())
                    .await?;
                self.state = EvccState::ChargingStatus;
                continue;
            }

            let reply = self
                .exchange_v2(
                    BodyV2::ChargingStatusReq(m2::ChargingStatusReq),
                    TimerKind::Performance,
                )
                .await?;
            let res = match reply.body {
                BodyV2::ChargingStatusRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::ChargingStatusRes)),
            };

            let power = self
                .schedule
                .as_ref()
                .and_then(|s| s.power_limit_at(0))
                .unwrap_or(11_000);
            self.controller.energy_delivered(power).await;

            if res.receipt_required == Some(true) {
                if let Some(meter_info) = res.meter_info.clone() {
                    self.send_metering_receipt(res.sa_schedule_tuple_id, meter_info)
                        .await?;
                    self.state = EvccState::ChargingStatus;
                }
            }
            match res.ac_evse_status.evse_notification {
                EvseNotification::StopCharging => return Ok(true),
                EvseNotification::ReNegotiation => {
                    self.renegotiate_iso2(self.controller.energy_transfer_mode())
                        .await?;
                    self.state = EvccState::ChargingStatus;
                }
                EvseNotification::None => {}
            }
        }
    }

    /// DC loop under the performance timer. Returns true when the EVSE
    /// asked for the stop.
    async fn current_demand_loop(&mut self) -> Result<bool, EvccError> {
        let mut ticker = tokio::time::interval(LOOP_TICK);
        loop {
            ticker.tick().await;
            if self.shutdown_requested() {
                // Deliberate wind-down: the farewell exchanges that
                // follow must not themselves be cancelled
                self.shutdown = None;
                return Ok(false);
            }
            if self.controller.charging_should_stop().await {
                return Ok(false);
            }
            if self.controller.renegotiation_requested().await {
                self.renegotiate_iso2(self.controller.energy_transfer_mode())
                    .await?;
                self.state = EvccState::CurrentDemand;
                continue;
            }

            let battery = self.controller.battery().await;
            let reply = self
                .exchange_v2(
                    BodyV2::CurrentDemandReq(m2::CurrentDemandReq {
                        dc_ev_status: self.dc_ev_status(&battery, false),
                        ev_target_current: PhysicalValue::amperes(battery.target_current as i16),
                        ev_target_voltage: PhysicalValue::volts(battery.target_voltage as i16),
                        ev_maximum_voltage_limit: Some(PhysicalValue::volts(
                            battery.max_voltage as i16,
                        )),
                        ev_maximum_current_limit: Some(PhysicalValue::amperes(
                            battery.max_current as i16,
                        )),
                        ev_maximum_power_limit: None,
                        bulk_charging_complete: None,
                        charging_complete: false,
                        remaining_time_to_full_soc: None,
                        remaining_time_to_bulk_soc: None,
                    }),
                    TimerKind::Performance,
                )
                .await?;
            let res = match reply.body {
                BodyV2::CurrentDemandRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::CurrentDemandRes)),
            };

            let delivered =
                (res.evse_present_voltage.scaled() * res.evse_present_current.scaled()).max(0.0);
            self.controller.energy_delivered(delivered as u32).await;

            if res.receipt_required == Some(true) {
                if let Some(meter_info) = res.meter_info.clone() {
                    self.send_metering_receipt(res.sa_schedule_tuple_id, meter_info)
                        .await?;
                    self.state = EvccState::CurrentDemand;
                }
            }
            match res.dc_evse_status.evse_notification {
                EvseNotification::StopCharging => return Ok(true),
                EvseNotification::ReNegotiation => {
                    self.renegotiate_iso2(self.controller.energy_transfer_mode())
                        .await?;
                    self.state = EvccState::CurrentDemand;
                }
                EvseNotification::None => {}
            }
        }
    }

    async fn send_metering_receipt(
        &mut self,
        tuple_id: u8,
        meter_info: MeterInfo,
    ) -> Result<(), EvccError> {
        self.state = EvccState::MeteringReceipt;
        let body = BodyV2::MeteringReceiptReq(m2::MeteringReceiptReq {
            id: Some("ID1".to_string()),
            session_id: self.session_id,
            sa_schedule_tuple_id: Some(tuple_id),
            meter_info,
        });
        let request = Message::V2(self.sign_v2(body)?);
        let reply = self.exchange(request, TimerKind::Performance).await?;
        match reply {
            Message::V2(MessageV2 {
                body: BodyV2::MeteringReceiptRes(_),
                ..
            }) => Ok(()),
            other => Err(self.unexpected(other.kind())),
        }
    }

    async fn welding_detection(&mut self) -> Result<(), EvccError> {
        // Two probes are enough to observe the voltage decaying
        for _ in 0..2 {
            let battery = self.controller.battery().await;
            let reply = self
                .exchange_v2(
                    BodyV2::WeldingDetectionReq(m2::WeldingDetectionReq {
                        dc_ev_status: self.dc_ev_status(&battery, true),
                    }),
                    TimerKind::Performance,
                )
                .await?;
            match reply.body {
                BodyV2::WeldingDetectionRes(_) => {}
                _ => return Err(self.unexpected(MessageKind::WeldingDetectionRes)),
            }
        }
        Ok(())
    }

    // =========================================================================
    // ISO 15118-20 flow (DC branch)
    // =========================================================================

    async fn drive_iso20(&mut self) -> Result<(), EvccError> {
        self.state = EvccState::SessionSetup;
        let reply = self
            .exchange_v20(
                BodyV20::SessionSetupReq(m20::SessionSetupReqV20 {
                    evcc_id: self.controller.evcc_id_v20(),
                }),
                TimerKind::Sequence,
            )
            .await?;
        self.session_id = reply.header.session_id;
        let res = match reply.body {
            BodyV20::SessionSetupRes(b) => b,
            _ => return Err(self.unexpected(MessageKind::SessionSetupRes)),
        };
        self.evse_id = res.evse_id;
        info!(session_id = %self.session_id, evse_id = %self.evse_id, "session established");

        // AuthorizationSetup: learn offered services and the challenge
        self.state = EvccState::Authorization;
        let reply = self
            .exchange_v20(
                BodyV20::AuthorizationSetupReq(m20::AuthorizationSetupReq),
                TimerKind::Sequence,
            )
            .await?;
        let setup = match reply.body {
            BodyV20::AuthorizationSetupRes(b) => b,
            _ => return Err(self.unexpected(MessageKind::AuthorizationSetupRes)),
        };
        let want_pnc = self.controller.auth_method() == PaymentOption::Contract;
        let service = if want_pnc
            && setup
                .authorization_services
                .contains(&m20::AuthorizationType::Pnc)
        {
            m20::AuthorizationType::Pnc
        } else {
            m20::AuthorizationType::Eim
        };
        if service == m20::AuthorizationType::Pnc {
            self.load_signer()?;
            self.challenge = setup.gen_challenge;
        }
        self.authorize_iso20(service).await?;

        // ServiceDiscovery / ServiceSelection
        self.state = EvccState::ServiceDiscovery;
        let reply = self
            .exchange_v20(
                BodyV20::ServiceDiscoveryReq(m20::ServiceDiscoveryReqV20 {
                    supported_service_ids: None,
                }),
                TimerKind::Sequence,
            )
            .await?;
        let discovery = match reply.body {
            BodyV20::ServiceDiscoveryRes(b) => b,
            _ => return Err(self.unexpected(MessageKind::ServiceDiscoveryRes)),
        };
        let energy_service = discovery
            .energy_transfer_service_list
            .first()
            .map(|s| s.service_id)
            .ok_or_else(|| {
                EvccError::Protocol(ProtocolError::PeerFailure(
                    "no energy transfer service offered".to_string(),
                ))
            })?;

        self.state = EvccState::ServiceDetail;
        let reply = self
            .exchange_v20(
                BodyV20::ServiceDetailReq(m20::ServiceDetailReqV20 {
                    service_id: energy_service,
                }),
                TimerKind::Sequence,
            )
            .await?;
        let detail = match reply.body {
            BodyV20::ServiceDetailRes(b) => b,
            _ => return Err(self.unexpected(MessageKind::ServiceDetailRes)),
        };
        let parameter_set_id = detail.parameter_set_ids.first().copied().unwrap_or(0);

        self.state = EvccState::ServiceSelection;
        let reply = self
            .exchange_v20(
                BodyV20::ServiceSelectionReq(m20::ServiceSelectionReq {
                    selected_energy_transfer_service: m20::SelectedServiceV20 {
                        service_id: energy_service,
                        parameter_set_id,
                    },
                    selected_vas_list: vec![],
                }),
                TimerKind::Sequence,
            )
            .await?;
        match reply.body {
            BodyV20::ServiceSelectionRes(_) => {}
            _ => return Err(self.unexpected(MessageKind::ServiceSelectionRes)),
        }

        // DC charge parameter discovery
        self.state = EvccState::ChargeParameterDiscovery;
        let battery = self.controller.battery().await;
        let reply = self
            .exchange_v20(
                BodyV20::DcChargeParameterDiscoveryReq(m20::DcChargeParameterDiscoveryReq {
                    ev_maximum_charge_power: RationalNumber::new(
                        (battery.max_power_w / 1000).min(i16::MAX as u32) as i16,
                        3,
                    ),
                    ev_minimum_charge_power: RationalNumber::new(1, 3),
                    ev_maximum_charge_current: RationalNumber::new(battery.max_current as i16, 0),
                    ev_minimum_charge_current: RationalNumber::new(1, 0),
                    ev_maximum_voltage: RationalNumber::new(battery.max_voltage as i16, 0),
                    ev_minimum_voltage: RationalNumber::new(150, 0),
                    target_soc: Some(battery.target_soc),
                }),
                TimerKind::Sequence,
            )
            .await?;
        match reply.body {
            BodyV20::DcChargeParameterDiscoveryRes(_) => {}
            _ => return Err(self.unexpected(MessageKind::ChargeParameterDiscoveryRes)),
        }

        // ScheduleExchange, repeated while Ongoing
        self.state = EvccState::ScheduleExchange;
        self.schedule_exchange().await?;

        // Cable check and pre-charge
        self.state = EvccState::CableCheck;
        self.dc_cable_check().await?;
        self.state = EvccState::PreCharge;
        self.dc_pre_charge().await?;

        self.state = EvccState::PowerDelivery;
        self.power_delivery_v20(m20::ChargeProgressV20::Start).await?;

        self.state = EvccState::ChargeLoop;
        let stopped_by_evse = self.dc_charge_loop().await?;
        if stopped_by_evse {
            debug!("charge loop ended on EVSE notification");
        }

        self.state = EvccState::PowerDelivery;
        self.power_delivery_v20(m20::ChargeProgressV20::Stop).await?;

        if self.controller.welding_detection_enabled() {
            self.state = EvccState::WeldingDetection;
            self.dc_welding_detection().await?;
        }

        self.state = EvccState::SessionStop;
        let reply = self
            .exchange_v20(
                BodyV20::SessionStopReq(m20::SessionStopReqV20 {
                    charging_session: ChargingSession::Terminate,
                    ev_termination_code: None,
                    ev_termination_explanation: None,
                }),
                TimerKind::Sequence,
            )
            .await?;
        match reply.body {
            BodyV20::SessionStopRes(_) => {}
            _ => return Err(self.unexpected(MessageKind::SessionStopRes)),
        }
        self.state = EvccState::Terminated;
        Ok(())
    }

    async fn authorize_iso20(&mut self, service: m20::AuthorizationType) -> Result<(), EvccError> {
        let contract_chain = match (service, &self.signer) {
            (m20::AuthorizationType::Pnc, Some(signer)) => {
                Some(v2g_core::messages::common::CertificateChain {
                    id: Some("ID1".to_string()),
                    certificates: signer.chain.clone(),
                })
            }
            _ => None,
        };
        let body = BodyV20::AuthorizationReq(m20::AuthorizationReqV20 {
            selected_authorization_service: service,
            gen_challenge: if service == m20::AuthorizationType::Pnc {
                self.challenge
            } else {
                None
            },
            contract_certificate_chain: contract_chain,
        });

        let mut msg = MessageV20::new(self.session_id, now_ts(), body);
        if service == m20::AuthorizationType::Pnc {
            if let Some(signer) = &self.signer {
                if let Some(fragment) = signed_fragment(&Message::V20(msg.clone()))? {
                    msg.header.signature = Some(DetachedSignature {
                        referenced_id: "ID1".to_string(),
                        digest: fragment_digest(&fragment),
                        signature_value: signer.key.sign(&fragment)?,
                    });
                }
            }
        }
        let request = Message::V20(msg);

        let phase_deadline = Instant::now() + self.dialect.timeout(TimerKind::Ongoing);
        loop {
            let reply = self.exchange(request.clone(), TimerKind::Sequence).await?;
            let processing = match reply {
                Message::V20(MessageV20 {
                    body: BodyV20::AuthorizationRes(res),
                    ..
                }) => res.evse_processing,
                other => return Err(self.unexpected(other.kind())),
            };
            match processing {
                m20::Processing::Finished => return Ok(()),
                _ => {
                    if Instant::now() >= phase_deadline {
                        return Err(EvccError::Timeout(TimerKind::Ongoing));
                    }
                    tokio::time::sleep(ONGOING_POLL).await;
                }
            }
        }
    }

    async fn schedule_exchange(&mut self) -> Result<(), EvccError> {
        let battery = self.controller.battery().await;
        let departure_time = self.controller.departure_time().await;
        let phase_deadline = Instant::now() + self.dialect.timeout(TimerKind::Ongoing);
        loop {
            let reply = self
                .exchange_v20(
                    BodyV20::ScheduleExchangeReq(m20::ScheduleExchangeReq {
                        maximum_supporting_points: 12,
                        departure_time,
                        ev_target_energy_request: Some(RationalNumber::new(
                            (battery.energy_request_wh / 1000).min(i16::MAX as u32) as i16,
                            3,
                        )),
                        ev_maximum_energy_request: None,
                        ev_minimum_energy_request: None,
                    }),
                    TimerKind::Ongoing,
                )
                .await?;
            let res = match reply.body {
                BodyV20::ScheduleExchangeRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::ScheduleExchangeRes)),
            };
            if res.evse_processing == m20::Processing::Finished {
                let tuple = res.schedule_tuples.first().ok_or_else(|| {
                    EvccError::Protocol(ProtocolError::PeerFailure(
                        "no schedule tuple offered".to_string(),
                    ))
                })?;
                let mut offset = 0u32;
                let windows = tuple
                    .schedule_entries
                    .iter()
                    .map(|e| {
                        let w = v2g_core::schedule::ChargingWindow {
                            start_offset: offset,
                            duration: e.duration,
                            max_power_w: e.power.scaled().max(0.0) as u32,
                        };
                        offset = offset.saturating_add(e.duration);
                        w
                    })
                    .collect();
                self.schedule = Some(ChargingSchedule {
                    tuple_id: tuple.schedule_tuple_id,
                    windows,
                });
                return Ok(());
            }
            if Instant::now() >= phase_deadline {
                return Err(EvccError::Timeout(TimerKind::Ongoing));
            }
            tokio::time::sleep(ONGOING_POLL).await;
        }
    }

    async fn dc_cable_check(&mut self) -> Result<(), EvccError> {
        let phase_deadline = Instant::now() + self.dialect.timeout(TimerKind::Ongoing);
        loop {
            let reply = self
                .exchange_v20(BodyV20::DcCableCheckReq(m20::DcCableCheckReq), TimerKind::Ongoing)
                .await?;
            let res = match reply.body {
                BodyV20::DcCableCheckRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::CableCheckRes)),
            };
            if res.evse_processing == m20::Processing::Finished {
                return Ok(());
            }
            if Instant::now() >= phase_deadline {
                return Err(EvccError::Timeout(TimerKind::Ongoing));
            }
            tokio::time::sleep(ONGOING_POLL).await;
        }
    }

    async fn dc_pre_charge(&mut self) -> Result<(), EvccError> {
        let phase_deadline = Instant::now() + self.dialect.timeout(TimerKind::Ongoing);
        let mut present_voltage = 0i16;
        loop {
            let battery = self.controller.battery().await;
            let reply = self
                .exchange_v20(
                    BodyV20::DcPreChargeReq(m20::DcPreChargeReq {
                        ev_processing: m20::Processing::Ongoing,
                        ev_present_voltage: RationalNumber::new(present_voltage, 0),
                        ev_target_voltage: RationalNumber::new(battery.target_voltage as i16, 0),
                    }),
                    TimerKind::Performance,
                )
                .await?;
            let res = match reply.body {
                BodyV20::DcPreChargeRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::PreChargeRes)),
            };
            present_voltage = res.evse_present_voltage.scaled() as i16;
            let delta = (res.evse_present_voltage.scaled() - f64::from(battery.target_voltage)).abs();
            if delta <= PRECHARGE_BAND_V {
                return Ok(());
            }
            if Instant::now() >= phase_deadline {
                return Err(EvccError::Timeout(TimerKind::Ongoing));
            }
            tokio::time::sleep(ONGOING_POLL).await;
        }
    }

    async fn power_delivery_v20(
        &mut self,
        progress: m20::ChargeProgressV20,
    ) -> Result<(), EvccError> {
        let reply = self
            .exchange_v20(
                BodyV20::PowerDeliveryReq(m20::PowerDeliveryReqV20 {
                    ev_processing: m20::Processing::Finished,
                    charge_progress: progress,
                    selected_schedule_tuple_id: self.schedule.as_ref().map(|s| s.tuple_id),
                }),
                TimerKind::Sequence,
            )
            .await?;
        match reply.body {
            BodyV20::PowerDeliveryRes(_) => Ok(()),
            _ => Err(self.unexpected(MessageKind::PowerDeliveryRes)),
        }
    }

    async fn renegotiate_iso20(&mut self) -> Result<(), EvccError> {
        info!("renegotiating schedule");
        self.state = EvccState::PowerDelivery;
        self.power_delivery_v20(m20::ChargeProgressV20::ScheduleRenegotiation)
            .await?;
        self.state = EvccState::ScheduleExchange;
        self.schedule_exchange().await?;
        self.state = EvccState::PowerDelivery;
        self.power_delivery_v20(m20::ChargeProgressV20::Start).await?;
        Ok(())
    }

    async fn dc_charge_loop(&mut self) -> Result<bool, EvccError> {
        let mut ticker = tokio::time::interval(LOOP_TICK);
        loop {
            ticker.tick().await;
            if self.shutdown_requested() {
                // Deliberate wind-down: the farewell exchanges that
                // follow must not themselves be cancelled
                self.shutdown = None;
                return Ok(false);
            }
            if self.controller.charging_should_stop().await {
                return Ok(false);
            }
            if self.controller.renegotiation_requested().await {
                self.renegotiate_iso20().await?;
                self.state = EvccState::ChargeLoop;
                continue;
            }

            let battery = self.controller.battery().await;
            let reply = self
                .exchange_v20(
                    BodyV20::DcChargeLoopReq(m20::DcChargeLoopReq {
                        ev_present_voltage: RationalNumber::new(battery.target_voltage as i16, 0),
                        ev_target_current: RationalNumber::new(battery.target_current as i16, 0),
                        ev_target_voltage: RationalNumber::new(battery.target_voltage as i16, 0),
                        present_soc: Some(battery.present_soc),
                        charging_complete: false,
                        meter_info_requested: false,
                    }),
                    TimerKind::Performance,
                )
                .await?;
            let res = match reply.body {
                BodyV20::DcChargeLoopRes(b) => b,
                _ => return Err(self.unexpected(MessageKind::ChargeLoopRes)),
            };

            let delivered =
                (res.evse_present_voltage.scaled() * res.evse_present_current.scaled()).max(0.0);
            self.controller.energy_delivered(delivered as u32).await;

            if let Some(status) = res.evse_status {
                match status.evse_notification {
                    m20::EvseNotificationV20::Terminate | m20::EvseNotificationV20::Pause => {
                        return Ok(true)
                    }
                    m20::EvseNotificationV20::ScheduleRenegotiation
                    | m20::EvseNotificationV20::ServiceRenegotiation => {
                        self.renegotiate_iso20().await?;
                        self.state = EvccState::ChargeLoop;
                    }
                    _ => {}
                }
            }
        }
    }

    async fn dc_welding_detection(&mut self) -> Result<(), EvccError> {
        for _ in 0..2 {
            let reply = self
                .exchange_v20(
                    BodyV20::DcWeldingDetectionReq(m20::DcWeldingDetectionReq {
                        ev_processing: m20::Processing::Ongoing,
                    }),
                    TimerKind::Performance,
                )
                .await?;
            match reply.body {
                BodyV20::DcWeldingDetectionRes(_) => {}
                _ => return Err(self.unexpected(MessageKind::WeldingDetectionRes)),
            }
        }
        Ok(())
    }

    pub fn state(&self) -> EvccState {
        self.state
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }
}

fn now_ts() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_display_matches_debug() {
        assert_eq!(EvccState::ChargeParameterDiscovery.to_string(), "ChargeParameterDiscovery");
    }
}
