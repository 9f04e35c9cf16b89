//! SECC front-end: SDP responder and the TCP/TLS accept loops
//!
//! The SECC binds one plain-TCP and (when an EVSE identity is
//! available) one TLS listener on ephemeral ports of the interface's
//! link-local address, then answers SDP requests with whichever
//! endpoint matches the requested security. Each accepted connection
//! runs an independent session task; sessions share only the trust
//! store, the controller, and the session store.

use std::net::SocketAddrV6;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info, warn};

use v2g_core::dialect::Dialect;
use v2g_core::shutdown::ShutdownSignal;
use v2g_pki::TrustStore;
use v2g_transport::sdp::{self, SdpResponse, SdpSecurity, SdpTransportProtocol};
use v2g_transport::tls::server_acceptor;
use v2g_transport::udp::{sdp_server_socket, NetInterface};
use v2g_transport::{TransportError, V2gStream};

use crate::config::SeccConfig;
use crate::controller::EvseController;
use crate::error::SeccError;
use crate::session::{SeccSession, SessionPolicy};
use crate::store::SessionStore;

pub struct SeccServer {
    config: SeccConfig,
    controller: Arc<dyn EvseController>,
    pki: Arc<TrustStore>,
    store: Arc<SessionStore>,
}

impl SeccServer {
    pub fn new(
        config: SeccConfig,
        controller: Arc<dyn EvseController>,
        pki: Arc<TrustStore>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            config,
            controller,
            pki,
            store,
        }
    }

    pub fn store(&self) -> Arc<SessionStore> {
        self.store.clone()
    }

    /// Bind everything and serve until the shutdown signal is raised.
    /// Active sessions observe the same signal and close themselves.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<(), SeccError> {
        let iface = NetInterface::resolve(&self.config.iface)?;

        let tcp_listener = bind_ephemeral(&iface).await?;
        let tcp_port = tcp_listener
            .local_addr()
            .map_err(TransportError::Io)?
            .port();

        let identity = self.pki.secc_identity();
        let (tls_listener, tls_port) = match &identity {
            Some(_) => {
                let listener = bind_ephemeral(&iface).await?;
                let port = listener.local_addr().map_err(TransportError::Io)?.port();
                (Some(listener), Some(port))
            }
            None => {
                if self.config.enforce_tls {
                    return Err(SeccError::Config(v2g_core::config::ConfigError::Pki(
                        "SECC_ENFORCE_TLS requires an EVSE identity in the PKI directory"
                            .to_string(),
                    )));
                }
                warn!("no EVSE identity; serving plain TCP only");
                (None, None)
            }
        };

        info!(
            iface = %iface.name,
            link_local = %iface.link_local,
            tcp_port,
            tls_port = tls_port.unwrap_or(0),
            enforce_tls = self.config.enforce_tls,
            "SECC listening"
        );

        // SDP responder task, ended by the same shutdown signal
        let sdp_socket = sdp_server_socket(&iface)?;
        let sdp_policy = SdpPolicy {
            address: iface.link_local,
            tcp_port,
            tls_port,
            enforce_tls: self.config.enforce_tls,
        };
        let mut sdp_shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sdp_shutdown.raised() => {}
                result = sdp::serve(&sdp_socket, move |req| sdp_policy.answer(req.security)) => {
                    if let Err(e) = result {
                        error!(error = %e, "SDP responder stopped");
                    }
                }
            }
        });

        // TLS accept loop
        if let (Some(listener), Some(identity)) = (tls_listener, identity) {
            let pnc_offered = self
                .config
                .supported_auth_options
                .contains(&v2g_core::messages::common::PaymentOption::Contract);
            // TLS 1.2 unless only -20 is offered
            let tls_dialect = if self.config.supported_dialects == vec![Dialect::Iso20] {
                Dialect::Iso20
            } else {
                Dialect::Iso2
            };
            let acceptor = server_acceptor(tls_dialect, &identity, &self.pki, pnc_offered)?;
            let controller = self.controller.clone();
            let pki = self.pki.clone();
            let store = self.store.clone();
            let policy = SessionPolicy::from(&self.config);
            let mut accept_shutdown = shutdown.clone();
            let session_shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let accepted = tokio::select! {
                        _ = accept_shutdown.raised() => return,
                        accepted = listener.accept() => accepted,
                    };
                    let (tcp, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "TLS accept failed");
                            continue;
                        }
                    };
                    let acceptor = acceptor.clone();
                    let controller = controller.clone();
                    let pki = pki.clone();
                    let store = store.clone();
                    let policy = policy.clone();
                    let signal = session_shutdown.clone();
                    tokio::spawn(async move {
                        match acceptor.accept(tcp).await {
                            Ok(tls) => {
                                info!(%peer, "TLS session accepted");
                                let stream = V2gStream::TlsServer(Box::new(tls));
                                SeccSession::new(stream, controller, pki, store, policy, true)
                                    .with_shutdown(signal)
                                    .run()
                                    .await;
                            }
                            Err(e) => warn!(%peer, error = %e, "TLS handshake failed"),
                        }
                    });
                }
            });
        }

        // Plain TCP accept loop on this task
        let mut accept_shutdown = shutdown.clone();
        loop {
            let accepted = tokio::select! {
                _ = accept_shutdown.raised() => {
                    info!("shutdown signal raised, no longer accepting connections");
                    return Ok(());
                }
                accepted = tcp_listener.accept() => accepted,
            };
            let (tcp, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };
            info!(%peer, "TCP session accepted");
            let controller = self.controller.clone();
            let pki = self.pki.clone();
            let store = self.store.clone();
            let policy = SessionPolicy::from(&self.config);
            let signal = shutdown.clone();
            tokio::spawn(async move {
                SeccSession::new(V2gStream::Tcp(tcp), controller, pki, store, policy, false)
                    .with_shutdown(signal)
                    .run()
                    .await;
            });
        }
    }
}

async fn bind_ephemeral(iface: &NetInterface) -> Result<TcpListener, SeccError> {
    let addr = SocketAddrV6::new(iface.link_local, 0, 0, iface.index);
    TcpListener::bind(addr)
        .await
        .map_err(|source| {
            SeccError::Transport(TransportError::Bind {
                addr: addr.to_string(),
                source,
            })
        })
}

/// How SDP requests map to advertised endpoints.
#[derive(Clone, Copy)]
struct SdpPolicy {
    address: std::net::Ipv6Addr,
    tcp_port: u16,
    tls_port: Option<u16>,
    enforce_tls: bool,
}

impl SdpPolicy {
    /// Always answer; when policy forbids the requested security the
    /// response names the required one instead (never a silent drop).
    fn answer(&self, requested: SdpSecurity) -> SdpResponse {
        let (security, port) = match (requested, self.tls_port, self.enforce_tls) {
            (SdpSecurity::Tls, Some(port), _) => (SdpSecurity::Tls, port),
            // TLS asked for but unavailable: offer what exists
            (SdpSecurity::Tls, None, _) => (SdpSecurity::NoTls, self.tcp_port),
            // Plain TCP refused under enforce-tls: answer with the TLS
            // endpoint so the refusal is visible to the EVCC
            (SdpSecurity::NoTls, Some(port), true) => (SdpSecurity::Tls, port),
            (SdpSecurity::NoTls, _, false) => (SdpSecurity::NoTls, self.tcp_port),
            (SdpSecurity::NoTls, None, true) => (SdpSecurity::NoTls, self.tcp_port),
        };
        SdpResponse {
            address: self.address,
            port,
            security,
            transport: SdpTransportProtocol::Tcp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(enforce: bool, tls: bool) -> SdpPolicy {
        SdpPolicy {
            address: std::net::Ipv6Addr::LOCALHOST,
            tcp_port: 50_000,
            tls_port: tls.then_some(50_001),
            enforce_tls: enforce,
        }
    }

    #[test]
    fn enforce_tls_answers_with_tls_endpoint() {
        let answer = policy(true, true).answer(SdpSecurity::NoTls);
        assert_eq!(answer.security, SdpSecurity::Tls);
        assert_eq!(answer.port, 50_001);
    }

    #[test]
    fn relaxed_policy_grants_request() {
        let answer = policy(false, true).answer(SdpSecurity::NoTls);
        assert_eq!(answer.security, SdpSecurity::NoTls);
        assert_eq!(answer.port, 50_000);

        let answer = policy(false, true).answer(SdpSecurity::Tls);
        assert_eq!(answer.security, SdpSecurity::Tls);
        assert_eq!(answer.port, 50_001);
    }

    #[test]
    fn missing_identity_downgrades_tls_request() {
        let answer = policy(false, false).answer(SdpSecurity::Tls);
        assert_eq!(answer.security, SdpSecurity::NoTls);
        assert_eq!(answer.port, 50_000);
    }
}
