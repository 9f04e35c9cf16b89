//! start-evcc - run the vehicle-side engine for one charging session

use std::process::exit;
use std::sync::Arc;

use v2g_core::messages::common::{EnergyTransferMode, PaymentOption};
use v2g_evcc::{EvccConfig, EvccError, EvccHandler, SimEvController};
use v2g_pki::TrustStore;
use v2gd::exit_code;

#[tokio::main]
async fn main() {
    v2gd::init_tracing();

    let config = match EvccConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            exit(exit_code::CONFIG);
        }
    };

    let pki = match TrustStore::load(&config.pki_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, "PKI startup failure");
            exit(exit_code::STARTUP);
        }
    };

    if !config.controller_sim {
        tracing::error!("no controller available: set EVCC_CONTROLLER_SIM=true");
        exit(exit_code::CONFIG);
    }
    let auth = if config.use_tls {
        PaymentOption::Contract
    } else {
        PaymentOption::ExternalPayment
    };
    let controller = Arc::new(SimEvController::new(
        EnergyTransferMode::AcThreePhaseCore,
        auth,
    ));

    let shutdown = v2gd::spawn_shutdown_watcher();
    let handler = EvccHandler::new(config, controller, pki).with_shutdown(shutdown);
    match handler.run().await {
        Ok(reason) if reason.is_graceful() => exit(exit_code::OK),
        Ok(reason) => {
            tracing::error!(detail = %reason.detail, "session failed");
            exit(exit_code::INTERNAL);
        }
        Err(EvccError::Cancelled) => {
            tracing::info!("shut down before a session was established");
            exit(exit_code::OK);
        }
        Err(e) => {
            let code = match e {
                EvccError::Config(_) => exit_code::CONFIG,
                EvccError::Transport(_) | EvccError::Security(_) => exit_code::STARTUP,
                _ => exit_code::INTERNAL,
            };
            tracing::error!(error = %e, "EVCC terminated");
            exit(code);
        }
    }
}
