//! End-to-end ISO 15118-20 scenarios (DC branch) over duplex transport

use std::sync::Arc;

use v2g_core::dialect::Dialect;
use v2g_core::messages::common::{EnergyTransferMode, PaymentOption};
use v2g_core::session::{SessionPhase, StopReason};
use v2g_evcc::{EvccSession, SimEvController};
use v2g_secc::{SeccSession, SessionPolicy, SessionStore, SimEvseController};
use v2g_tests::{iso20_only, PkiFixture};

fn policy() -> SessionPolicy {
    SessionPolicy {
        supported_dialects: vec![Dialect::Iso20, Dialect::Iso2],
        supported_auth_options: vec![PaymentOption::ExternalPayment, PaymentOption::Contract],
        free_charging_service: false,
        allow_cert_install_service: true,
    }
}

async fn run_pair(
    evcc_controller: Arc<SimEvController>,
    secc_controller: Arc<SimEvseController>,
    tls: bool,
) -> (StopReason, StopReason, Arc<SessionStore>) {
    let pki = PkiFixture::new();
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
    let evcc = EvccSession::new(ev_side, evcc_controller, trust, iso20_only(), tls);

    let secc_task = tokio::spawn(secc.run());
    let evcc_reason = evcc.run().await;
    let secc_reason = secc_task.await.unwrap();
    (evcc_reason, secc_reason, store)
}

/// DC, EIM: setup, authorization, service selection, schedule
/// exchange, cable check, pre-charge, charge loop, welding detection,
/// session stop.
#[tokio::test(start_paused = true)]
async fn happy_path_dc_eim() {
    let evcc = Arc::new(SimEvController::new(
        EnergyTransferMode::DcExtended,
        PaymentOption::ExternalPayment,
    ));
    let secc = Arc::new(
        SimEvseController::new(vec![EnergyTransferMode::DcExtended]).stop_after(3),
    );

    let (evcc_reason, secc_reason, store) = run_pair(evcc, secc, false).await;

    assert!(evcc_reason.is_graceful(), "EVCC: {:?}", evcc_reason);
    assert!(secc_reason.is_graceful(), "SECC: {:?}", secc_reason);
    let record = store.all().pop().unwrap();
    assert_eq!(record.dialect.as_deref(), Some("iso20"));
    assert_eq!(record.phase, SessionPhase::Terminated);
    assert_eq!(record.auth_method.as_deref(), Some("ExternalPayment"));
}

/// DC, PnC: the -20 challenge travels in AuthorizationSetupRes and the
/// signed AuthorizationReq carries the contract chain.
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
    assert!(record.tls);
}

/// The deferred-authorization path: the oracle reports Ongoing for a
/// few polls before accepting.
#[tokio::test(start_paused = true)]
async fn authorization_polls_until_accepted() {
    let evcc = Arc::new(SimEvController::new(
        EnergyTransferMode::DcExtended,
        PaymentOption::ExternalPayment,
    ));
    let secc = Arc::new(
        SimEvseController::new(vec![EnergyTransferMode::DcExtended])
            .auth_polls(3)
            .stop_after(2),
    );

    let (evcc_reason, secc_reason, _store) = run_pair(evcc, secc, false).await;

    assert!(evcc_reason.is_graceful(), "EVCC: {:?}", evcc_reason);
    assert!(secc_reason.is_graceful(), "SECC: {:?}", secc_reason);
}
