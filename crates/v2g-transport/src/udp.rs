//! IPv6 link-local UDP sockets for SDP
//!
//! Both roles bind on the configured interface; the client sends to
//! the all-nodes multicast group with hop limit 255, the server joins
//! the group and answers unicast.

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::error::TransportError;

/// All-nodes link-scoped multicast group (`ff02::1`).
pub const SDP_MULTICAST_ADDR: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);
/// Fixed SDP port.
pub const SDP_PORT: u16 = 15118;
/// Mandated hop limit for SDP datagrams.
pub const SDP_HOP_LIMIT: u32 = 255;

/// A resolved network interface: index for scoping, link-local address
/// for binding and for the advertised SECC endpoint.
#[derive(Debug, Clone)]
pub struct NetInterface {
    pub name: String,
    pub index: u32,
    pub link_local: Ipv6Addr,
}

impl NetInterface {
    /// Look the interface up by name and find its link-local IPv6
    /// address. Fails fast at startup when the NIC is misconfigured.
    pub fn resolve(name: &str) -> Result<Self, TransportError> {
        let addrs = if_addrs::get_if_addrs().map_err(TransportError::Io)?;
        let mut found = false;
        for ifa in addrs {
            if ifa.name != name {
                continue;
            }
            found = true;
            if let std::net::IpAddr::V6(v6) = ifa.addr.ip() {
                if v6.segments()[0] & 0xffc0 == 0xfe80 {
                    let index = ifa.index.unwrap_or(0);
                    if index == 0 {
                        return Err(TransportError::InterfaceNotFound(name.to_string()));
                    }
                    return Ok(Self {
                        name: name.to_string(),
                        index,
                        link_local: v6,
                    });
                }
            }
        }
        if found {
            Err(TransportError::NoLinkLocal(name.to_string()))
        } else {
            Err(TransportError::InterfaceNotFound(name.to_string()))
        }
    }

    /// The multicast destination scoped to this interface.
    pub fn sdp_multicast_target(&self) -> SocketAddr {
        SocketAddrV6::new(SDP_MULTICAST_ADDR, SDP_PORT, 0, self.index).into()
    }
}

fn new_v6_socket() -> Result<Socket, TransportError> {
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_only_v6(true)?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Socket for the SDP client: ephemeral port on the interface's
/// link-local address, multicast hop limit 255.
pub fn sdp_client_socket(iface: &NetInterface) -> Result<UdpSocket, TransportError> {
    let socket = new_v6_socket()?;
    socket.set_multicast_hops_v6(SDP_HOP_LIMIT)?;
    socket.set_multicast_if_v6(iface.index)?;
    let bind_addr = SocketAddrV6::new(iface.link_local, 0, 0, iface.index);
    socket
        .bind(&bind_addr.into())
        .map_err(|source| TransportError::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;
    let socket = UdpSocket::from_std(socket.into())?;
    debug!(iface = %iface.name, local = %bind_addr, "SDP client socket ready");
    Ok(socket)
}

/// Socket for the SDP server: fixed port, joined to the all-nodes
/// group on the interface.
pub fn sdp_server_socket(iface: &NetInterface) -> Result<UdpSocket, TransportError> {
    let socket = new_v6_socket()?;
    socket.set_reuse_address(true)?;
    let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, SDP_PORT, 0, 0);
    socket
        .bind(&bind_addr.into())
        .map_err(|source| TransportError::Bind {
            addr: bind_addr.to_string(),
            source,
        })?;
    socket.join_multicast_v6(&SDP_MULTICAST_ADDR, iface.index)?;
    socket.set_multicast_hops_v6(SDP_HOP_LIMIT)?;
    let socket = UdpSocket::from_std(socket.into())?;
    debug!(iface = %iface.name, port = SDP_PORT, "SDP server socket joined ff02::1");
    Ok(socket)
}
