//! SDP discovery scenarios over loopback UDP

use std::net::Ipv6Addr;

use tokio::net::UdpSocket;

use v2g_core::dialect::Dialect;
use v2g_transport::sdp::{self, SdpRequest, SdpResponse, SdpSecurity, SdpTransportProtocol};

async fn serve_with(
    response_for: impl Fn(SdpSecurity) -> SdpResponse + Send + 'static,
) -> std::net::SocketAddr {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = sdp::serve(&server, move |req| response_for(req.security)).await;
    });
    addr
}

/// S2: the SECC enforces TLS; a plain-TCP request is answered with the
/// TLS endpoint instead of being dropped, and the mismatch is visible
/// to the client.
#[tokio::test]
async fn enforce_tls_refusal_is_answered() {
    let addr = serve_with(|_| SdpResponse {
        address: Ipv6Addr::LOCALHOST,
        port: 64000,
        security: SdpSecurity::Tls,
        transport: SdpTransportProtocol::Tcp,
    })
    .await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let response = sdp::discover(
        &client,
        addr,
        SdpRequest {
            security: SdpSecurity::NoTls,
            transport: SdpTransportProtocol::Tcp,
        },
        Dialect::Iso2,
    )
    .await
    .unwrap();

    // The refusal: granted security differs from the requested one
    assert_eq!(response.security, SdpSecurity::Tls);
    assert_eq!(response.port, 64000);
}

/// Discovery retransmits until the responder finally answers.
#[tokio::test]
async fn discovery_survives_dropped_requests() {
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        // Ignore the first two requests, answer the third
        for _ in 0..2 {
            let _ = server.recv_from(&mut buf).await;
        }
        if let Ok((_, from)) = server.recv_from(&mut buf).await {
            let response = SdpResponse {
                address: Ipv6Addr::LOCALHOST,
                port: 64001,
                security: SdpSecurity::NoTls,
                transport: SdpTransportProtocol::Tcp,
            };
            let _ = server
                .send_to(&response.to_frame().to_bytes(), from)
                .await;
        }
    });

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let response = sdp::discover(
        &client,
        addr,
        SdpRequest {
            security: SdpSecurity::NoTls,
            transport: SdpTransportProtocol::Tcp,
        },
        Dialect::Iso2,
    )
    .await
    .unwrap();
    assert_eq!(response.port, 64001);
}
