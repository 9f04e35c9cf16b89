//! End-to-end ISO 15118-2 scenarios over in-memory duplex transport

use std::sync::Arc;
use std::time::Duration;

use v2g_core::dialect::Dialect;
use v2g_core::error::FaultKind;
use v2g_core::messages::common::{EnergyTransferMode, PaymentOption};
use v2g_core::messages::iso2::{BodyV2, MessageV2, ResponseCodeV2, ServiceDiscoveryReq, SessionSetupReq};
use v2g_core::messages::Message;
use v2g_core::session::{SessionId, SessionPhase, StopReason};
use v2g_evcc::{EvccSession, SimEvController};
use v2g_secc::{SeccSession, SessionPolicy, SessionStore, SimEvseController};
use v2g_tests::{iso2_only, PkiFixture, StallingController};
use v2g_transport::FramedStream;

fn policy() -> SessionPolicy {
    SessionPolicy {
        supported_dialects: vec![Dialect::Iso20, Dialect::Iso2],
        supported_auth_options: vec![PaymentOption::ExternalPayment, PaymentOption::Contract],
        free_charging_service: false,
        allow_cert_install_service: true,
    }
}

/// Run one EVCC against one SECC over a duplex pipe.
async fn run_pair(
    evcc_controller: Arc<SimEvController>,
    secc_controller: Arc<dyn v2g_secc::EvseController>,
    tls: bool,
) -> (StopReason, StopReason, Arc<SessionStore>) {
    let pki = PkiFixture::new();
    run_pair_with_pki(evcc_controller, secc_controller, tls, &pki).await
}

async fn run_pair_with_pki(
    evcc_controller: Arc<SimEvController>,
    secc_controller: Arc<dyn v2g_secc::EvseController>,
    tls: bool,
    pki: &PkiFixture,
) -> (StopReason, StopReason, Arc<SessionStore>) {
    let store = Arc::new(SessionStore::new());
    let trust = pki.trust_store();

    let (ev_side, se_side) = tokio::io::duplex(32 * 1024);
    let secc = SeccSession::new(
        se_side,
        secc_controller,
        trust.clone(),
        store.clone(),
        policy(),
        tls,
    );
    let evcc = EvccSession::new(ev_side, evcc_controller, trust, iso2_only(), tls);

    let secc_task = tokio::spawn(secc.run());
    let evcc_reason = evcc.run().await;
    let secc_reason = secc_task.await.unwrap();
    (evcc_reason, secc_reason, store)
}

/// S1: AC, EIM, no TLS. Full dialogue through SessionStop with the
/// EVSE eventually requesting the stop.
#[tokio::test(start_paused = true)]
async fn happy_path_ac_eim() {
    let evcc = Arc::new(SimEvController::new(
        EnergyTransferMode::AcThreePhaseCore,
        PaymentOption::ExternalPayment,
    ));
    let secc = Arc::new(
        SimEvseController::new(vec![
            EnergyTransferMode::AcThreePhaseCore,
            EnergyTransferMode::DcExtended,
        ])
        .stop_after(3),
    );

    let (evcc_reason, secc_reason, store) = run_pair(evcc, secc, false).await;

    assert!(evcc_reason.is_graceful(), "EVCC: {:?}", evcc_reason);
    assert!(secc_reason.is_graceful(), "SECC: {:?}", secc_reason);
    assert_eq!(store.len(), 1);
    let record = store.all().pop().unwrap();
    assert_eq!(record.phase, SessionPhase::Terminated);
    assert_eq!(record.dialect.as_deref(), Some("iso2"));
    assert_eq!(record.auth_method.as_deref(), Some("ExternalPayment"));
    assert_eq!(record.energy_mode.as_deref(), Some("AcThreePhaseCore"));
    // PowerDelivery(Start) went through before the stop
    assert_eq!(record.schedule_tuple_id, Some(1));
}

/// DC, PnC over a (policy-level) TLS session: contract chain
/// validation, challenge signing, welding detection.
#[tokio::test(start_paused = true)]
async fn happy_path_dc_pnc() {
    let evcc = Arc::new(SimEvController::new(
        EnergyTransferMode::DcExtended,
        PaymentOption::Contract,
    ));
    let secc = Arc::new(
        SimEvseController::new(vec![EnergyTransferMode::DcExtended]).stop_after(3),
    );

    let (evcc_reason, secc_reason, store) = run_pair(evcc, secc, true).await;

    assert!(evcc_reason.is_graceful(), "EVCC: {:?}", evcc_reason);
    assert!(secc_reason.is_graceful(), "SECC: {:?}", secc_reason);
    let record = store.all().pop().unwrap();
    assert_eq!(record.auth_method.as_deref(), Some("Contract"));
    assert_eq!(record.energy_mode.as_deref(), Some("DcExtended"));
    assert!(record.tls);
}

/// S3: a request with a foreign session id draws
/// FAILED_UnknownSession and the session closes; the store holds
/// exactly one terminated entry.
#[tokio::test(start_paused = true)]
async fn bad_session_id_is_rejected() {
    let pki = PkiFixture::new();
    let store = Arc::new(SessionStore::new());
    let secc_controller = Arc::new(SimEvseController::new(vec![
        EnergyTransferMode::AcThreePhaseCore,
    ]));

    let (client_side, server_side) = tokio::io::duplex(32 * 1024);
    let secc = SeccSession::new(
        server_side,
        secc_controller,
        pki.trust_store(),
        store.clone(),
        policy(),
        false,
    );
    let secc_task = tokio::spawn(secc.run());

    let mut client = FramedStream::new(client_side, Dialect::Iso2.max_payload_len());

    // SAP
    let sap = Message::SupportedAppProtocolReq(
        v2g_core::messages::app_protocol::SupportedAppProtocolReq {
            app_protocols: iso2_only(),
        },
    );
    client
        .write_raw(&v2g_codec::encode(&sap, Dialect::Iso2).unwrap())
        .await
        .unwrap();
    let frame = client.read_frame().await.unwrap().unwrap();
    let (_, reply) = v2g_codec::decode(&frame.to_bytes()).unwrap();
    assert!(matches!(reply, Message::SupportedAppProtocolRes(_)));

    // SessionSetup with the placeholder id
    let setup = Message::V2(MessageV2::new(
        SessionId::ZERO,
        BodyV2::SessionSetupReq(SessionSetupReq {
            evcc_id: [2, 0, 0, 0, 0, 1],
        }),
    ));
    client
        .write_raw(&v2g_codec::encode(&setup, Dialect::Iso2).unwrap())
        .await
        .unwrap();
    let frame = client.read_frame().await.unwrap().unwrap();
    let (_, reply) = v2g_codec::decode(&frame.to_bytes()).unwrap();
    let assigned = reply.session_id().unwrap();
    assert!(!assigned.is_zero());

    // Next request under a different id
    let mut wrong = assigned;
    wrong.0[0] ^= 0xFF;
    let discovery = Message::V2(MessageV2::new(
        wrong,
        BodyV2::ServiceDiscoveryReq(ServiceDiscoveryReq {
            service_scope: None,
            service_category: None,
        }),
    ));
    client
        .write_raw(&v2g_codec::encode(&discovery, Dialect::Iso2).unwrap())
        .await
        .unwrap();

    let frame = client.read_frame().await.unwrap().unwrap();
    let (_, reply) = v2g_codec::decode(&frame.to_bytes()).unwrap();
    match reply {
        Message::V2(m) => {
            assert_eq!(
                m.response_code(),
                Some(ResponseCodeV2::FailedUnknownSession)
            );
        }
        other => panic!("unexpected reply {:?}", other),
    }
    // Connection closes after the failure response
    assert!(client.read_frame().await.unwrap().is_none());

    let secc_reason = secc_task.await.unwrap();
    assert_eq!(secc_reason.kind, Some(FaultKind::Protocol));
    assert_eq!(store.len(), 1);
    assert_eq!(store.all().pop().unwrap().phase, SessionPhase::Terminated);
}

/// S4: an expired contract certificate draws
/// FAILED_CertificateExpired during PaymentDetails and no
/// authorization is granted.
#[tokio::test(start_paused = true)]
async fn expired_contract_certificate_is_rejected() {
    let pki = PkiFixture::with_contract_expiry(true);
    let evcc = Arc::new(SimEvController::new(
        EnergyTransferMode::DcExtended,
        PaymentOption::Contract,
    ));
    let secc = Arc::new(SimEvseController::new(vec![EnergyTransferMode::DcExtended]));

    let (evcc_reason, secc_reason, store) =
        run_pair_with_pki(evcc, secc, true, &pki).await;

    assert_eq!(secc_reason.kind, Some(FaultKind::Security));
    assert!(!evcc_reason.is_graceful());
    assert!(
        evcc_reason.detail.contains("CertificateExpired"),
        "detail: {}",
        evcc_reason.detail
    );
    let record = store.all().pop().unwrap();
    // Authorization never happened: no mode negotiated, no schedule
    assert_eq!(record.energy_mode, None);
    assert_eq!(record.schedule_tuple_id, None);
}

/// S5: the SECC stalls past the 4.5 s performance limit inside the
/// DC loop; the EVCC fires the timer and terminates with Timeout.
#[tokio::test(start_paused = true)]
async fn performance_timeout_in_current_demand() {
    let evcc = Arc::new(SimEvController::new(
        EnergyTransferMode::DcExtended,
        PaymentOption::ExternalPayment,
    ));
    let secc = Arc::new(StallingController {
        inner: SimEvseController::new(vec![EnergyTransferMode::DcExtended]),
        stall: Duration::from_secs(5),
    });

    let (evcc_reason, _secc_reason, store) = run_pair(evcc, secc, false).await;

    assert_eq!(evcc_reason.kind, Some(FaultKind::Timeout));
    assert!(
        evcc_reason.state.contains("CurrentDemand"),
        "state: {}",
        evcc_reason.state
    );
    assert_eq!(store.len(), 1);
}

/// S6: mid-loop EVSENotification=ReNegotiate sends the EVCC back to
/// ChargeParameterDiscovery; charging resumes under the new schedule
/// and the session still ends cleanly.
#[tokio::test(start_paused = true)]
async fn renegotiation_resumes_the_loop() {
    let evcc = Arc::new(SimEvController::new(
        EnergyTransferMode::AcThreePhaseCore,
        PaymentOption::ExternalPayment,
    ));
    let secc = Arc::new(
        SimEvseController::new(vec![EnergyTransferMode::AcThreePhaseCore]).stop_after(5),
    );
    secc.trigger_renegotiation();

    let (evcc_reason, secc_reason, store) = run_pair(evcc, secc, false).await;

    assert!(evcc_reason.is_graceful(), "EVCC: {:?}", evcc_reason);
    assert!(secc_reason.is_graceful(), "SECC: {:?}", secc_reason);
    let record = store.all().pop().unwrap();
    // PowerDelivery(Start) ran again after the renegotiation
    assert_eq!(record.schedule_tuple_id, Some(1));
    assert_eq!(record.phase, SessionPhase::Terminated);
}

/// Sequence violations map to FAILED_SequenceError: a charging-loop
/// request before authorization is answered and then the connection
/// closes.
#[tokio::test(start_paused = true)]
async fn out_of_order_request_draws_sequence_error() {
    let pki = PkiFixture::new();
    let store = Arc::new(SessionStore::new());
    let secc_controller = Arc::new(SimEvseController::new(vec![
        EnergyTransferMode::AcThreePhaseCore,
    ]));

    let (client_side, server_side) = tokio::io::duplex(32 * 1024);
    let secc = SeccSession::new(
        server_side,
        secc_controller,
        pki.trust_store(),
        store.clone(),
        policy(),
        false,
    );
    let secc_task = tokio::spawn(secc.run());

    let mut client = FramedStream::new(client_side, Dialect::Iso2.max_payload_len());
    let sap = Message::SupportedAppProtocolReq(
        v2g_core::messages::app_protocol::SupportedAppProtocolReq {
            app_protocols: iso2_only(),
        },
    );
    client
        .write_raw(&v2g_codec::encode(&sap, Dialect::Iso2).unwrap())
        .await
        .unwrap();
    client.read_frame().await.unwrap().unwrap();

    // ChargingStatus without any session setup
    let premature = Message::V2(MessageV2::new(
        SessionId::ZERO,
        BodyV2::ChargingStatusReq(v2g_core::messages::iso2::ChargingStatusReq),
    ));
    client
        .write_raw(&v2g_codec::encode(&premature, Dialect::Iso2).unwrap())
        .await
        .unwrap();

    let frame = client.read_frame().await.unwrap().unwrap();
    let (_, reply) = v2g_codec::decode(&frame.to_bytes()).unwrap();
    match reply {
        Message::V2(m) => {
            assert_eq!(m.response_code(), Some(ResponseCodeV2::FailedSequenceError));
        }
        other => panic!("unexpected reply {:?}", other),
    }
    assert!(client.read_frame().await.unwrap().is_none());
    let reason = secc_task.await.unwrap();
    assert_eq!(reason.kind, Some(FaultKind::Protocol));
}
