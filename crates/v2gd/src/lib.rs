//! Shared plumbing for the `start-secc` and `start-evcc` binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Exit codes shared by both entry points.
pub mod exit_code {
    /// Clean termination
    pub const OK: i32 = 0;
    /// Malformed environment or missing PKI
    pub const CONFIG: i32 = 1;
    /// Transport or PKI startup failure
    pub const STARTUP: i32 = 2;
    /// Unhandled internal error
    pub const INTERNAL: i32 = 3;
}

/// Initialize tracing from `LOG_LEVEL` (falling back to `RUST_LOG`,
/// then to info).
pub fn init_tracing() {
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .map(|level| tracing_subscriber::EnvFilter::new(level))
        .or_else(|| tracing_subscriber::EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolve on SIGINT or, on unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Spawn the signal watcher, returning the observer side for the
/// server and session loops.
pub fn spawn_shutdown_watcher() -> v2g_core::shutdown::ShutdownSignal {
    let (handle, signal) = v2g_core::shutdown::channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received, stopping sessions");
        handle.trigger();
    });
    signal
}
