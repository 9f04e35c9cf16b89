//! EVCC connection handler: discovery, transport selection, session
//!
//! Runs one complete charging attempt: SDP over the configured NIC,
//! then TCP (optionally upgraded to TLS) to the advertised endpoint,
//! then the session state machine.

use std::net::SocketAddrV6;
use std::sync::Arc;

use tokio::net::TcpStream;
use tracing::{info, warn};

use v2g_core::config::ConfigError;
use v2g_core::dialect::{AppProtocol, Dialect};
use v2g_core::messages::common::PaymentOption;
use v2g_core::session::StopReason;
use v2g_core::shutdown::ShutdownSignal;
use v2g_pki::TrustStore;
use v2g_transport::sdp;
use v2g_transport::tls::{client_connector, secc_server_name};
use v2g_transport::udp::{sdp_client_socket, NetInterface};
use v2g_transport::{SdpRequest, SdpSecurity, SdpTransportProtocol, TransportError, V2gStream};

use crate::config::EvccConfig;
use crate::controller::EvController;
use crate::error::EvccError;
use crate::session::EvccSession;

pub struct EvccHandler {
    config: EvccConfig,
    controller: Arc<dyn EvController>,
    pki: Arc<TrustStore>,
    shutdown: Option<ShutdownSignal>,
}

impl EvccHandler {
    pub fn new(config: EvccConfig, controller: Arc<dyn EvController>, pki: Arc<TrustStore>) -> Self {
        Self {
            config,
            controller,
            pki,
            shutdown: None,
        }
    }

    /// Observe the process-wide shutdown flag; discovery is abandoned
    /// and a running session sends its SessionStop and closes.
    pub fn with_shutdown(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = Some(signal);
        self
    }

    /// Discover the SECC and run one session to completion.
    pub async fn run(mut self) -> Result<StopReason, EvccError> {
        let iface = NetInterface::resolve(&self.config.iface)?;
        info!(iface = %iface.name, link_local = %iface.link_local, "starting SDP discovery");

        let socket = sdp_client_socket(&iface)?;
        let request = SdpRequest {
            security: if self.config.use_tls {
                SdpSecurity::Tls
            } else {
                SdpSecurity::NoTls
            },
            transport: SdpTransportProtocol::Tcp,
        };
        let discovery = sdp::discover(
            &socket,
            iface.sdp_multicast_target(),
            request,
            self.preferred_dialect(),
        );
        let response = tokio::select! {
            _ = v2g_core::shutdown::cancelled(&mut self.shutdown) => {
                return Err(EvccError::Cancelled)
            }
            response = discovery => response?,
        };

        if self.config.enforce_tls && response.security != SdpSecurity::Tls {
            // The SECC refused TLS (or we asked for plain TCP somewhere
            // it is not acceptable); that is a local policy failure
            return Err(EvccError::Config(ConfigError::Invalid {
                key: "EVCC_ENFORCE_TLS".to_string(),
                detail: "SECC endpoint does not offer TLS".to_string(),
            }));
        }
        if response.transport != SdpTransportProtocol::Tcp {
            return Err(EvccError::Transport(TransportError::BadSdpDatagram(20)));
        }

        let addr = SocketAddrV6::new(response.address, response.port, 0, iface.index);
        info!(%addr, tls = matches!(response.security, SdpSecurity::Tls), "connecting to SECC");
        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;

        let (stream, tls) = match response.security {
            SdpSecurity::Tls => {
                let identity = match self.controller.auth_method() {
                    PaymentOption::Contract => self
                        .pki
                        .contract_identity()
                        .or_else(|| self.pki.oem_identity()),
                    PaymentOption::ExternalPayment => None,
                };
                if identity.is_none() && self.controller.auth_method() == PaymentOption::Contract {
                    warn!("PnC requested but no client identity available; TLS will be server-auth only");
                }
                let connector =
                    client_connector(self.preferred_dialect(), self.pki.clone(), identity.as_ref())?;
                let tls_stream = connector
                    .connect(secc_server_name(), tcp)
                    .await
                    .map_err(|e| TransportError::Tls(e.to_string()))?;
                (V2gStream::TlsClient(Box::new(tls_stream)), true)
            }
            SdpSecurity::NoTls => (V2gStream::Tcp(tcp), false),
        };

        let mut session = EvccSession::new(
            stream,
            self.controller.clone(),
            self.pki.clone(),
            self.config.supported_protocols.clone(),
            tls,
        );
        if let Some(signal) = self.shutdown.take() {
            session = session.with_shutdown(signal);
        }
        Ok(session.run().await)
    }

    /// TLS version selection happens before SAP, so it follows the
    /// highest-priority protocol we are about to offer.
    fn preferred_dialect(&self) -> Dialect {
        self.config
            .supported_protocols
            .iter()
            .min_by_key(|p| p.priority)
            .and_then(AppProtocol::dialect)
            .unwrap_or(Dialect::Iso2)
    }
}
