//! UDP multicast over several interfaces at once.
//!
//! An ordinary UDP socket sends multicast out of whichever interface the
//! routing table picks. [`MulticastConn`] joins the group on every interface
//! it is given (or every multicast-capable one) and
//! [`write_to_multicast`](MulticastConn::write_to_multicast) sends each
//! datagram once per joined interface.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

pub mod config;
pub mod multicast;
pub mod reuse;

pub use config::MulticastConfig;
pub use multicast::{Error, Failures, Interface, MulticastConn, Network, PartialJoin};

pub const SERVER_PORT: u16 = 4983;

pub const MULTICAST_ADDRESS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 123);

pub const MDNS_PORT: u16 = 5353;

pub const MDNS_ADDRESS_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

pub const MDNS_ADDRESS_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// The mDNS group for `network`.
pub fn mdns_group(network: Network) -> SocketAddr {
    match network {
        Network::Udp4 => SocketAddrV4::new(MDNS_ADDRESS_V4, MDNS_PORT).into(),
        Network::Udp6 => SocketAddrV6::new(MDNS_ADDRESS_V6, MDNS_PORT, 0, 0).into(),
    }
}
