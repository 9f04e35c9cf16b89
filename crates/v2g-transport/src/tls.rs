//! TLS contexts for the HLC stream
//!
//! -2 sessions run TLS 1.2 with the ECDHE-ECDSA AES-128-GCM profile
//! (the nearest rustls-supported suite to the ISO 15118-2 mandate,
//! which names a CBC suite rustls deliberately omits); -20 sessions
//! run TLS 1.3. The EVCC validates the SECC's chain against the V2G
//! anchor set instead of webpki hostname rules, which is what the
//! standard actually asks for on a link-local network.

use std::sync::Arc;
use std::time::SystemTime;

use rustls::client::{ServerCertVerified, ServerCertVerifier};
use rustls::server::AllowAnyAuthenticatedClient;
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerConfig, ServerName};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::debug;

use v2g_core::dialect::Dialect;
use v2g_pki::{AnchorRole, IdentityMaterial, TrustStore};

use crate::error::TransportError;

static ISO2_PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS12];
static ISO20_PROTOCOL_VERSIONS: &[&rustls::SupportedProtocolVersion] = &[&rustls::version::TLS13];

fn protocol_versions(dialect: Dialect) -> &'static [&'static rustls::SupportedProtocolVersion] {
    match dialect {
        Dialect::Iso2 => ISO2_PROTOCOL_VERSIONS,
        Dialect::Iso20 => ISO20_PROTOCOL_VERSIONS,
    }
}

fn cipher_suites(dialect: Dialect) -> Vec<rustls::SupportedCipherSuite> {
    match dialect {
        Dialect::Iso2 => vec![rustls::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256],
        Dialect::Iso20 => vec![
            rustls::cipher_suite::TLS13_AES_256_GCM_SHA384,
            rustls::cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
        ],
    }
}

fn identity_parts(identity: &IdentityMaterial) -> (Vec<Certificate>, PrivateKey) {
    let certs = identity.chain.iter().cloned().map(Certificate).collect();
    (certs, PrivateKey(identity.key_pkcs8.clone()))
}

/// Server-side TLS context for the SECC listener.
///
/// `mutual` requests a client certificate validated against the MO and
/// OEM anchors (payment-by-contract flow); otherwise the handshake is
/// server-auth only.
pub fn server_acceptor(
    dialect: Dialect,
    identity: &IdentityMaterial,
    store: &TrustStore,
    mutual: bool,
) -> Result<TlsAcceptor, TransportError> {
    let (certs, key) = identity_parts(identity);

    let builder = ServerConfig::builder()
        .with_cipher_suites(&cipher_suites(dialect))
        .with_safe_default_kx_groups()
        .with_protocol_versions(protocol_versions(dialect))
        .map_err(|e| TransportError::Tls(e.to_string()))?;

    let config = if mutual {
        let mut roots = RootCertStore::empty();
        for der in store
            .anchors(AnchorRole::Mo)
            .into_iter()
            .chain(store.anchors(AnchorRole::Oem))
        {
            roots
                .add(&Certificate(der))
                .map_err(|e| TransportError::Tls(e.to_string()))?;
        }
        builder
            .with_client_cert_verifier(Arc::new(AllowAnyAuthenticatedClient::new(roots)))
            .with_single_cert(certs, key)
    } else {
        builder.with_no_client_auth().with_single_cert(certs, key)
    }
    .map_err(|e| TransportError::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Chain validation in place of webpki hostname rules: the SECC leaf
/// must validate against the V2G root anchors.
struct SeccChainVerifier {
    store: Arc<TrustStore>,
}

impl ServerCertVerifier for SeccChainVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let mut chain = Vec::with_capacity(1 + intermediates.len());
        chain.push(end_entity.0.clone());
        chain.extend(intermediates.iter().map(|c| c.0.clone()));

        let now_ts = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        self.store
            .validate(&chain, AnchorRole::V2g, now_ts)
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        debug!("SECC certificate chain accepted");
        Ok(ServerCertVerified::assertion())
    }
}

/// Client-side TLS context for the EVCC.
///
/// `client_identity` carries the OEM provisioning (-2) or contract
/// (-20 PnC) chain, presented only when the server asks.
pub fn client_connector(
    dialect: Dialect,
    store: Arc<TrustStore>,
    client_identity: Option<&IdentityMaterial>,
) -> Result<TlsConnector, TransportError> {
    let builder = ClientConfig::builder()
        .with_cipher_suites(&cipher_suites(dialect))
        .with_safe_default_kx_groups()
        .with_protocol_versions(protocol_versions(dialect))
        .map_err(|e| TransportError::Tls(e.to_string()))?
        .with_custom_certificate_verifier(Arc::new(SeccChainVerifier { store }));

    let config = match client_identity {
        Some(identity) => {
            let (certs, key) = identity_parts(identity);
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| TransportError::Tls(e.to_string()))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// The SNI name used on the wire. ISO 15118 peers meet over link-local
/// addresses, so the name is a fixed label the verifier ignores.
pub fn secc_server_name() -> ServerName {
    ServerName::try_from("secc").unwrap_or(ServerName::IpAddress(std::net::IpAddr::V6(
        std::net::Ipv6Addr::LOCALHOST,
    )))
}
