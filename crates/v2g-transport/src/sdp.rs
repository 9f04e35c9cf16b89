//! SECC Discovery Protocol engine
//!
//! The EVCC multicasts a two-byte request naming the security and
//! transport it wants; the SECC answers unicast with its endpoint.
//! The client retransmits with doubling back-off (250 ms initial,
//! capped per dialect, 50 attempts absolute); the server answers every
//! well-formed request, substituting its required security mode when
//! policy forbids the requested one instead of staying silent.

use std::net::{Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use v2g_core::dialect::{payload_type, Dialect};
use v2g_codec::v2gtp::V2gtpFrame;

use crate::error::TransportError;

/// Initial client retransmission delay.
pub const SDP_INITIAL_BACKOFF: Duration = Duration::from_millis(250);
/// Absolute retransmission cap.
pub const SDP_MAX_ATTEMPTS: u32 = 50;

/// Requested/granted transport security.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpSecurity {
    Tls,
    NoTls,
}

impl SdpSecurity {
    fn to_byte(self) -> u8 {
        match self {
            SdpSecurity::Tls => 0x00,
            SdpSecurity::NoTls => 0x10,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(SdpSecurity::Tls),
            0x10 => Some(SdpSecurity::NoTls),
            _ => None,
        }
    }
}

/// Requested/granted transport protocol. UDP is defined by the wire
/// format but never offered by this stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpTransportProtocol {
    Tcp,
    Udp,
}

impl SdpTransportProtocol {
    fn to_byte(self) -> u8 {
        match self {
            SdpTransportProtocol::Tcp => 0x00,
            SdpTransportProtocol::Udp => 0x10,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(SdpTransportProtocol::Tcp),
            0x10 => Some(SdpTransportProtocol::Udp),
            _ => None,
        }
    }
}

/// The two-byte SDP request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdpRequest {
    pub security: SdpSecurity,
    pub transport: SdpTransportProtocol,
}

impl SdpRequest {
    pub fn to_frame(&self) -> V2gtpFrame {
        V2gtpFrame::new(
            payload_type::SDP_REQUEST,
            vec![self.security.to_byte(), self.transport.to_byte()],
        )
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, TransportError> {
        if payload.len() != 2 {
            return Err(TransportError::BadSdpDatagram(payload.len()));
        }
        let security = SdpSecurity::from_byte(payload[0])
            .ok_or(TransportError::BadSdpDatagram(payload.len()))?;
        let transport = SdpTransportProtocol::from_byte(payload[1])
            .ok_or(TransportError::BadSdpDatagram(payload.len()))?;
        Ok(Self {
            security,
            transport,
        })
    }
}

/// The twenty-byte SDP response body: SECC endpoint plus the granted
/// security and transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SdpResponse {
    pub address: Ipv6Addr,
    pub port: u16,
    pub security: SdpSecurity,
    pub transport: SdpTransportProtocol,
}

impl SdpResponse {
    pub fn to_frame(&self) -> V2gtpFrame {
        let mut payload = Vec::with_capacity(20);
        payload.extend_from_slice(&self.address.octets());
        payload.extend_from_slice(&self.port.to_be_bytes());
        payload.push(self.security.to_byte());
        payload.push(self.transport.to_byte());
        V2gtpFrame::new(payload_type::SDP_RESPONSE, payload)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, TransportError> {
        if payload.len() != 20 {
            return Err(TransportError::BadSdpDatagram(payload.len()));
        }
        let mut octets = [0u8; 16];
        octets.copy_from_slice(&payload[..16]);
        let port = u16::from_be_bytes([payload[16], payload[17]]);
        let security = SdpSecurity::from_byte(payload[18])
            .ok_or(TransportError::BadSdpDatagram(payload.len()))?;
        let transport = SdpTransportProtocol::from_byte(payload[19])
            .ok_or(TransportError::BadSdpDatagram(payload.len()))?;
        Ok(Self {
            address: Ipv6Addr::from(octets),
            port,
            security,
            transport,
        })
    }
}

/// Run SDP discovery: retransmit `request` until a response arrives or
/// the retry budget is spent.
pub async fn discover(
    socket: &UdpSocket,
    target: SocketAddr,
    request: SdpRequest,
    dialect_hint: Dialect,
) -> Result<SdpResponse, TransportError> {
    let frame = request.to_frame().to_bytes();
    let mut backoff = SDP_INITIAL_BACKOFF;
    let cap = dialect_hint.sdp_retry_cap();
    let mut buf = [0u8; 64];

    for attempt in 1..=SDP_MAX_ATTEMPTS {
        socket.send_to(&frame, target).await?;
        debug!(attempt, wait_ms = backoff.as_millis() as u64, "SDP request sent");

        match tokio::time::timeout(backoff, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, from))) => match parse_response(&buf[..n]) {
                Ok(response) => {
                    info!(%from, secc = %response.address, port = response.port, "SDP response received");
                    return Ok(response);
                }
                Err(e) => warn!(%from, error = %e, "ignoring malformed SDP datagram"),
            },
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {} // timed out, retransmit
        }

        backoff = (backoff * 2).min(cap);
    }

    Err(TransportError::SdpExhausted {
        attempts: SDP_MAX_ATTEMPTS,
    })
}

fn parse_response(datagram: &[u8]) -> Result<SdpResponse, TransportError> {
    let frame = V2gtpFrame::from_bytes(datagram)?;
    if frame.payload_type != payload_type::SDP_RESPONSE {
        return Err(TransportError::BadSdpDatagram(datagram.len()));
    }
    SdpResponse::from_payload(&frame.payload)
}

/// Serve SDP: answer every well-formed request with whatever the
/// policy closure decides. Malformed datagrams are logged and dropped;
/// the loop only ends on socket failure.
pub async fn serve(
    socket: &UdpSocket,
    mut respond: impl FnMut(SdpRequest) -> SdpResponse,
) -> Result<(), TransportError> {
    let mut buf = [0u8; 64];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let request = match parse_request(&buf[..n]) {
            Ok(req) => req,
            Err(e) => {
                warn!(%from, error = %e, "ignoring malformed SDP request");
                continue;
            }
        };
        let response = respond(request);
        debug!(%from, ?request, granted = ?response.security, "answering SDP request");
        socket.send_to(&response.to_frame().to_bytes(), from).await?;
    }
}

fn parse_request(datagram: &[u8]) -> Result<SdpRequest, TransportError> {
    let frame = V2gtpFrame::from_bytes(datagram)?;
    if frame.payload_type != payload_type::SDP_REQUEST {
        return Err(TransportError::BadSdpDatagram(datagram.len()));
    }
    SdpRequest::from_payload(&frame.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_codec_round_trip() {
        let req = SdpRequest {
            security: SdpSecurity::NoTls,
            transport: SdpTransportProtocol::Tcp,
        };
        let frame = req.to_frame();
        assert_eq!(frame.payload, vec![0x10, 0x00]);
        assert_eq!(SdpRequest::from_payload(&frame.payload).unwrap(), req);
    }

    #[test]
    fn response_codec_round_trip() {
        let res = SdpResponse {
            address: "fe80::1cf:22ff:fe81:1".parse().unwrap(),
            port: 61341,
            security: SdpSecurity::Tls,
            transport: SdpTransportProtocol::Tcp,
        };
        let frame = res.to_frame();
        assert_eq!(frame.payload.len(), 20);
        assert_eq!(SdpResponse::from_payload(&frame.payload).unwrap(), res);
    }

    #[test]
    fn junk_bytes_are_rejected() {
        assert!(SdpRequest::from_payload(&[0x42, 0x00]).is_err());
        assert!(SdpResponse::from_payload(&[0; 19]).is_err());
    }

    #[tokio::test]
    async fn discover_against_local_responder() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let endpoint = SdpResponse {
            address: Ipv6Addr::LOCALHOST,
            port: 50_000,
            security: SdpSecurity::NoTls,
            transport: SdpTransportProtocol::Tcp,
        };
        tokio::spawn(async move {
            let _ = serve(&server, move |_| endpoint).await;
        });

        let got = discover(
            &client,
            server_addr,
            SdpRequest {
                security: SdpSecurity::NoTls,
                transport: SdpTransportProtocol::Tcp,
            },
            Dialect::Iso2,
        )
        .await
        .unwrap();
        assert_eq!(got, endpoint);
    }
}
