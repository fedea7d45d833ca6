//! How a datagram is steered out of one particular interface.
//!
//! Platforms that accept an interface index in the per-packet control data
//! use [`PacketInfo`]. Elsewhere the only option is [`SocketOption`], which
//! changes the socket's default multicast interface right before each send.
//! That setting is shared by everyone using the socket, so concurrent sends
//! through a [`SocketOption`] connection must be serialized by the caller
//! (a `Mutex` around the connection is enough).

use std::{fmt::Debug, io, net::SocketAddr};

use super::{control::ControlPlane, interfaces::Interface};

pub trait Egress: Debug + Send + Sync {
    /// Sends `payload` to `dst` through `iface`.
    fn send_via(
        &self,
        control: &ControlPlane,
        iface: &Interface,
        payload: &[u8],
        dst: SocketAddr,
    ) -> io::Result<usize>;

    /// Whether a send leaves state behind on the socket.
    fn is_stateful(&self) -> bool;
}

/// Per-packet interface annotation (`IP_PKTINFO` / `IPV6_PKTINFO`).
#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
))]
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketInfo;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
))]
impl Egress for PacketInfo {
    fn send_via(
        &self,
        control: &ControlPlane,
        iface: &Interface,
        payload: &[u8],
        dst: SocketAddr,
    ) -> io::Result<usize> {
        control.send_via_index(payload, iface.index, dst)
    }

    fn is_stateful(&self) -> bool {
        false
    }
}

/// Set the default multicast interface, then send.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketOption;

impl Egress for SocketOption {
    fn send_via(
        &self,
        control: &ControlPlane,
        iface: &Interface,
        payload: &[u8],
        dst: SocketAddr,
    ) -> io::Result<usize> {
        control.set_multicast_interface(iface)?;
        control.send_to(payload, dst)
    }

    fn is_stateful(&self) -> bool {
        true
    }
}

pub const fn supports_packet_info() -> bool {
    cfg!(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    ))
}

/// The best strategy this platform offers.
pub fn platform_egress() -> Box<dyn Egress> {
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    ))]
    {
        Box::new(PacketInfo)
    }
    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios"
    )))]
    {
        Box::new(SocketOption)
    }
}
