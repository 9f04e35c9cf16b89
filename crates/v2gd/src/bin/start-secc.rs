//! start-secc - run the charging-station-side engine

use std::process::exit;
use std::sync::Arc;

use v2g_core::messages::common::EnergyTransferMode;
use v2g_pki::TrustStore;
use v2g_secc::{SeccConfig, SeccServer, SessionStore, SimEvseController};
use v2gd::exit_code;

#[tokio::main]
async fn main() {
    v2gd::init_tracing();

    let config = match SeccConfig::from_env() {
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
        // Real controller integrations register here; only the
        // simulator ships with the stack itself
        tracing::error!("no controller available: set SECC_CONTROLLER_SIM=true");
        exit(exit_code::CONFIG);
    }
    let controller = Arc::new(SimEvseController::new(vec![
        EnergyTransferMode::AcThreePhaseCore,
        EnergyTransferMode::DcExtended,
    ]));

    let store = match &config.redis {
        Some(endpoint) => Arc::new(SessionStore::with_mirror(endpoint)),
        None => Arc::new(SessionStore::new()),
    };

    let shutdown = v2gd::spawn_shutdown_watcher();
    let server = SeccServer::new(config, controller, pki, store);
    match server.run(shutdown).await {
        Ok(()) => exit(exit_code::OK),
        Err(e) => {
            tracing::error!(error = %e, "SECC terminated");
            let code = match e {
                v2g_secc::SeccError::Config(_) => exit_code::CONFIG,
                v2g_secc::SeccError::Transport(_) | v2g_secc::SeccError::Security(_) => {
                    exit_code::STARTUP
                }
                _ => exit_code::INTERNAL,
            };
            exit(code);
        }
    }
}
