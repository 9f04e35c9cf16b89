//! Transport error type

use thiserror::Error;
use v2g_codec::CodecError;

/// Socket, TLS, or framing failure. Session-fatal after the session is
/// established; ISO 15118 sessions are not resumable across connection
/// loss, so nothing here is retried except SDP discovery.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("frame of {len} bytes exceeds dialect maximum {max}")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("malformed frame: {0}")]
    Frame(#[from] CodecError),

    #[error("peer closed the connection")]
    PeerClosed,

    #[error("SDP gave up after {attempts} requests")]
    SdpExhausted { attempts: u32 },

    #[error("malformed SDP datagram ({0} bytes)")]
    BadSdpDatagram(usize),

    #[error("network interface {0} not found")]
    InterfaceNotFound(String),

    #[error("no link-local IPv6 address on interface {0}")]
    NoLinkLocal(String),
}
