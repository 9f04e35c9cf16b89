//! External-cancellation scenarios: process shutdown and operator
//! termination through the session store

use std::sync::Arc;
use std::time::Duration;

use v2g_core::dialect::Dialect;
use v2g_core::messages::common::{EnergyTransferMode, PaymentOption};
use v2g_core::session::SessionPhase;
use v2g_core::shutdown;
use v2g_evcc::{EvccSession, SimEvController};
use v2g_secc::{SeccSession, SessionPolicy, SessionStore, SimEvseController};
use v2g_tests::{iso2_only, PkiFixture};

fn policy() -> SessionPolicy {
    SessionPolicy {
        supported_dialects: vec![Dialect::Iso20, Dialect::Iso2],
        supported_auth_options: vec![PaymentOption::ExternalPayment, PaymentOption::Contract],
        free_charging_service: false,
        allow_cert_install_service: true,
    }
}

/// Process shutdown on the EVCC side: the session leaves the charging
/// loop at the next tick, sends PowerDelivery(Stop) and SessionStop,
/// and both ends terminate cleanly.
#[tokio::test(start_paused = true)]
async fn evcc_shutdown_sends_session_stop() {
    let pki = PkiFixture::new();
    let store = Arc::new(SessionStore::new());
    let trust = pki.trust_store();
    let (handle, signal) = shutdown::channel();

    let (ev_side, se_side) = tokio::io::duplex(32 * 1024);
    let secc = SeccSession::new(
        se_side,
        // No budgeted stop: only the shutdown ends this session
        Arc::new(SimEvseController::new(vec![
            EnergyTransferMode::AcThreePhaseCore,
        ])),
        trust.clone(),
        store.clone(),
        policy(),
        false,
    );
    let evcc = EvccSession::new(
        ev_side,
        Arc::new(SimEvController::new(
            EnergyTransferMode::AcThreePhaseCore,
            PaymentOption::ExternalPayment,
        )),
        trust,
        iso2_only(),
        false,
    )
    .with_shutdown(signal);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.trigger();
    });

    let secc_task = tokio::spawn(secc.run());
    let evcc_reason = evcc.run().await;
    let secc_reason = secc_task.await.unwrap();

    assert!(evcc_reason.is_graceful(), "EVCC: {:?}", evcc_reason);
    assert!(secc_reason.is_graceful(), "SECC: {:?}", secc_reason);
    let record = store.all().pop().unwrap();
    assert_eq!(record.phase, SessionPhase::Terminated);
}

/// Process shutdown on the SECC side: the session stops reading at its
/// next suspension point and records a clean external-shutdown stop.
#[tokio::test(start_paused = true)]
async fn secc_shutdown_closes_the_session() {
    let pki = PkiFixture::new();
    let store = Arc::new(SessionStore::new());
    let trust = pki.trust_store();
    let (handle, signal) = shutdown::channel();

    let (ev_side, se_side) = tokio::io::duplex(32 * 1024);
    let secc = SeccSession::new(
        se_side,
        Arc::new(SimEvseController::new(vec![
            EnergyTransferMode::AcThreePhaseCore,
        ])),
        trust.clone(),
        store.clone(),
        policy(),
        false,
    )
    .with_shutdown(signal);
    let evcc = EvccSession::new(
        ev_side,
        Arc::new(SimEvController::new(
            EnergyTransferMode::AcThreePhaseCore,
            PaymentOption::ExternalPayment,
        )),
        trust,
        iso2_only(),
        false,
    );

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(3500)).await;
        handle.trigger();
    });

    let secc_task = tokio::spawn(secc.run());
    let evcc_reason = evcc.run().await;
    let secc_reason = secc_task.await.unwrap();

    assert!(secc_reason.is_graceful(), "SECC: {:?}", secc_reason);
    assert_eq!(secc_reason.detail, "external shutdown");
    // The EVCC loses the peer mid-dialogue; that side reports the
    // broken transport
    assert!(!evcc_reason.is_graceful());
    let record = store.all().pop().unwrap();
    assert_eq!(record.phase, SessionPhase::Terminated);
}

/// Operator termination through the session store (the path the
/// external cache's cancellation set feeds): the SECC answers the next
/// loop request with EVSENotification=Stop and the EVCC winds the
/// session down through SessionStop.
#[tokio::test(start_paused = true)]
async fn operator_cancel_stops_the_session() {
    let pki = PkiFixture::new();
    let store = Arc::new(SessionStore::new());
    let trust = pki.trust_store();

    let (ev_side, se_side) = tokio::io::duplex(32 * 1024);
    let secc = SeccSession::new(
        se_side,
        Arc::new(SimEvseController::new(vec![
            EnergyTransferMode::AcThreePhaseCore,
        ])),
        trust.clone(),
        store.clone(),
        policy(),
        false,
    );
    let evcc = EvccSession::new(
        ev_side,
        Arc::new(SimEvController::new(
            EnergyTransferMode::AcThreePhaseCore,
            PaymentOption::ExternalPayment,
        )),
        trust,
        iso2_only(),
        false,
    );

    // The operator learns the id from the store (or the mirror) and
    // asks for termination
    let canceller = store.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            if let Some(record) = canceller.all().pop() {
                canceller.request_cancel(record.session_id);
                return;
            }
        }
    });

    let secc_task = tokio::spawn(secc.run());
    let evcc_reason = evcc.run().await;
    let secc_reason = secc_task.await.unwrap();

    assert!(evcc_reason.is_graceful(), "EVCC: {:?}", evcc_reason);
    assert!(secc_reason.is_graceful(), "SECC: {:?}", secc_reason);
    let record = store.all().pop().unwrap();
    assert_eq!(record.phase, SessionPhase::Terminated);
}
