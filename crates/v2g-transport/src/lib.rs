//! v2g-transport - network plumbing for the ISO 15118 stack
//!
//! Two channels:
//! - UDP multicast on `ff02::1` port 15118 for SDP discovery
//! - a framed TCP or TLS stream for the HLC session itself
//!
//! The TLS module pins protocol versions and cipher suites per dialect
//! and swaps webpki hostname rules for ISO chain validation against
//! the V2G anchors.

pub mod error;
pub mod framed;
pub mod sdp;
pub mod stream;
pub mod tls;
pub mod udp;

pub use error::TransportError;
pub use framed::FramedStream;
pub use sdp::{SdpRequest, SdpResponse, SdpSecurity, SdpTransportProtocol};
pub use stream::V2gStream;
pub use udp::{NetInterface, SDP_MULTICAST_ADDR, SDP_PORT};
