//! Family-specific multicast control over a bound UDP socket.
//!
//! The control plane holds its own handle to the connection's socket, so
//! membership and multicast options set through it apply to the socket the
//! connection reads from.

use std::{
    io,
    net::{SocketAddr, UdpSocket},
};

use socket2::{InterfaceIndexOrAddress, SockRef};

use super::{Network, interfaces::Interface};

#[derive(Debug)]
pub enum ControlPlane {
    V4(UdpSocket),
    V6(UdpSocket),
}

impl ControlPlane {
    pub(crate) fn new(network: Network, socket: &UdpSocket) -> io::Result<Self> {
        let handle = socket.try_clone()?;
        Ok(match network {
            Network::Udp4 => ControlPlane::V4(handle),
            Network::Udp6 => ControlPlane::V6(handle),
        })
    }

    pub fn network(&self) -> Network {
        match self {
            ControlPlane::V4(_) => Network::Udp4,
            ControlPlane::V6(_) => Network::Udp6,
        }
    }

    pub(crate) fn socket(&self) -> &UdpSocket {
        match self {
            ControlPlane::V4(socket) | ControlPlane::V6(socket) => socket,
        }
    }

    pub(crate) fn into_socket(self) -> UdpSocket {
        match self {
            ControlPlane::V4(socket) | ControlPlane::V6(socket) => socket,
        }
    }

    pub fn join_group(&self, iface: &Interface, group: SocketAddr) -> io::Result<()> {
        match (self, group) {
            (ControlPlane::V4(socket), SocketAddr::V4(group)) => {
                let socket = SockRef::from(socket);
                let index = InterfaceIndexOrAddress::Index(iface.index);
                socket.join_multicast_v4_n(group.ip(), &index)
            }
            (ControlPlane::V6(socket), SocketAddr::V6(group)) => {
                socket.join_multicast_v6(group.ip(), iface.index)
            }
            _ => Err(family_mismatch(group)),
        }
    }

    /// TTL for IPv4, hop limit for IPv6.
    pub fn set_multicast_ttl(&self, ttl: u32) -> io::Result<()> {
        match self {
            ControlPlane::V4(socket) => socket.set_multicast_ttl_v4(ttl),
            ControlPlane::V6(socket) => SockRef::from(socket).set_multicast_hops_v6(ttl),
        }
    }

    pub fn set_multicast_loopback(&self, on: bool) -> io::Result<()> {
        match self {
            ControlPlane::V4(socket) => socket.set_multicast_loop_v4(on),
            ControlPlane::V6(socket) => socket.set_multicast_loop_v6(on),
        }
    }

    /// Sets the socket-wide default outbound interface for multicast.
    ///
    /// This outlives the call: every later send without a per-packet
    /// interface goes out through `iface`.
    pub fn set_multicast_interface(&self, iface: &Interface) -> io::Result<()> {
        match self {
            ControlPlane::V4(socket) => {
                let addr = iface.ipv4_addr().ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrNotAvailable,
                        format!("{} has no IPv4 address", iface.name),
                    )
                })?;
                SockRef::from(socket).set_multicast_if_v4(&addr)
            }
            ControlPlane::V6(socket) => SockRef::from(socket).set_multicast_if_v6(iface.index),
        }
    }

    pub fn send_to(&self, payload: &[u8], dst: SocketAddr) -> io::Result<usize> {
        self.socket().send_to(payload, dst)
    }

    /// Sends one datagram whose outbound interface is carried in the
    /// packet-info control message rather than set on the socket.
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    ))]
    pub fn send_via_index(
        &self,
        payload: &[u8],
        if_index: u32,
        dst: SocketAddr,
    ) -> io::Result<usize> {
        use std::{io::IoSlice, os::fd::AsRawFd};

        use nix::sys::socket::{ControlMessage, MsgFlags, SockaddrIn, SockaddrIn6, sendmsg};

        let iov = [IoSlice::new(payload)];
        let sent = match (self, dst) {
            (ControlPlane::V4(socket), SocketAddr::V4(dst)) => {
                let info = libc::in_pktinfo {
                    ipi_ifindex: if_index as _,
                    ipi_spec_dst: libc::in_addr { s_addr: 0 },
                    ipi_addr: libc::in_addr { s_addr: 0 },
                };
                let cmsg = [ControlMessage::Ipv4PacketInfo(&info)];
                sendmsg(
                    socket.as_raw_fd(),
                    &iov,
                    &cmsg,
                    MsgFlags::empty(),
                    Some(&SockaddrIn::from(dst)),
                )?
            }
            (ControlPlane::V6(socket), SocketAddr::V6(dst)) => {
                let info = libc::in6_pktinfo {
                    ipi6_addr: libc::in6_addr { s6_addr: [0; 16] },
                    ipi6_ifindex: if_index as _,
                };
                let cmsg = [ControlMessage::Ipv6PacketInfo(&info)];
                sendmsg(
                    socket.as_raw_fd(),
                    &iov,
                    &cmsg,
                    MsgFlags::empty(),
                    Some(&SockaddrIn6::from(dst)),
                )?
            }
            _ => return Err(family_mismatch(dst)),
        };
        Ok(sent)
    }
}

fn family_mismatch(addr: SocketAddr) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{addr} does not match the socket's address family"),
    )
}
