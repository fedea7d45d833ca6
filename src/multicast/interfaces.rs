//! Host network interfaces, as seen by the multicast layer.

use std::{
    io,
    net::{IpAddr, Ipv4Addr},
};

/// A host network interface. Read-only snapshot taken at enumeration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub index: u32,
    pub name: String,
    pub is_up: bool,
    pub is_multicast: bool,
    pub is_loopback: bool,
    pub addrs: Vec<IpAddr>,
}

impl Interface {
    /// Administratively up and multicast-capable.
    pub fn is_eligible(&self) -> bool {
        self.is_up && self.is_multicast
    }

    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        self.addrs.iter().find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }
}

/// Lists every interface eligible for multicast, in OS enumeration order.
#[tracing::instrument(level = "debug")]
pub fn multicast_interfaces() -> io::Result<Vec<Interface>> {
    Ok(all_interfaces()?
        .into_iter()
        .filter(Interface::is_eligible)
        .collect())
}

/// Finds an interface by name, whether or not it is eligible for multicast.
pub fn interface_by_name(name: &str) -> io::Result<Option<Interface>> {
    let ifaces = all_interfaces()?;
    Ok(ifaces.into_iter().find(|iface| iface.name == name))
}

pub fn loopback_interface() -> io::Result<Option<Interface>> {
    let ifaces = all_interfaces()?;
    Ok(ifaces.into_iter().find(|iface| iface.is_loopback))
}

#[cfg(unix)]
pub fn all_interfaces() -> io::Result<Vec<Interface>> {
    use nix::{
        ifaddrs::getifaddrs,
        net::if_::{InterfaceFlags, if_nametoindex},
    };

    let mut ifaces: Vec<Interface> = Vec::new();

    // getifaddrs yields one entry per address; fold them into one Interface per name.
    for entry in getifaddrs()? {
        let addr = entry.address.as_ref().and_then(ip_of);

        if let Some(existing) = ifaces
            .iter_mut()
            .find(|iface| iface.name == entry.interface_name)
        {
            existing.addrs.extend(addr);
            continue;
        }

        let index = if_nametoindex(entry.interface_name.as_str())?;
        ifaces.push(Interface {
            index,
            is_up: entry.flags.contains(InterfaceFlags::IFF_UP),
            is_multicast: entry.flags.contains(InterfaceFlags::IFF_MULTICAST),
            is_loopback: entry.flags.contains(InterfaceFlags::IFF_LOOPBACK),
            addrs: addr.into_iter().collect(),
            name: entry.interface_name,
        });
    }

    Ok(ifaces)
}

#[cfg(unix)]
fn ip_of(storage: &nix::sys::socket::SockaddrStorage) -> Option<IpAddr> {
    use std::net::{SocketAddrV4, SocketAddrV6};

    if let Some(sin) = storage.as_sockaddr_in() {
        return Some(IpAddr::V4(*SocketAddrV4::from(*sin).ip()));
    }
    let sin6 = storage.as_sockaddr_in6()?;
    Some(IpAddr::V6(*SocketAddrV6::from(*sin6).ip()))
}

#[cfg(not(unix))]
pub fn all_interfaces() -> io::Result<Vec<Interface>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface enumeration is not supported on this platform",
    ))
}
