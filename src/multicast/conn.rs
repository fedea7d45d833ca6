use std::{
    io,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace};

use super::{
    Network,
    control::ControlPlane,
    egress::{Egress, platform_egress},
    error::{Error, Failures, Handle, InterfaceId, PartialJoin},
    interfaces::{Interface, multicast_interfaces},
    join::join_all,
    writer::fan_out,
};

/// A UDP socket joined to a multicast group on one or more interfaces.
///
/// The connection is meant to have a single owner. Joining and sending take
/// no internal lock. When [`egress_is_stateful`](Self::egress_is_stateful)
/// is true, each send changes the socket's default multicast interface, so
/// two threads sending at once can push a datagram out of the wrong
/// interface. Wrap the connection in a `Mutex` if it must be shared.
#[derive(Debug)]
pub struct MulticastConn {
    socket: Option<UdpSocket>,
    network: Network,
    control: Option<ControlPlane>,
    interfaces: Vec<Interface>,
    egress: Box<dyn Egress>,
}

impl MulticastConn {
    /// Binds `addr` and joins the group `addr` names on each interface.
    ///
    /// With `interfaces` set to `None` every multicast-capable interface is
    /// tried, and a host with none fails with
    /// [`Error::NoMulticastInterfaces`]. An explicit empty list joins nothing.
    /// The connection is returned as long as one interface joined; the
    /// interfaces that did not are described by the [`PartialJoin`] warning.
    ///
    /// ```no_run
    /// use multicast_conn::{MulticastConn, Network};
    ///
    /// # fn main() -> Result<(), multicast_conn::Error> {
    /// let group = "224.0.0.251:5353".parse().unwrap();
    /// let (conn, warning) = MulticastConn::listen(Network::Udp4, None, group)?;
    /// if let Some(warning) = warning {
    ///     eprintln!("{warning}");
    /// }
    /// conn.write_to_multicast(b"hello", group)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn listen(
        network: Network,
        interfaces: Option<Vec<Interface>>,
        addr: SocketAddr,
    ) -> Result<(Self, Option<PartialJoin>), Error> {
        Self::open(network, interfaces, addr, |_| Ok(()))
    }

    /// Like [`listen`](Self::listen), with `setup` run on the socket before it is bound.
    #[tracing::instrument(name = "Listen Multicast", skip(interfaces, setup))]
    pub(crate) fn open<F>(
        network: Network,
        interfaces: Option<Vec<Interface>>,
        addr: SocketAddr,
        setup: F,
    ) -> Result<(Self, Option<PartialJoin>), Error>
    where
        F: FnOnce(&Socket) -> Result<(), Error>,
    {
        network.check(addr)?;

        let socket = bind(network, addr, setup)?;

        let candidates = match interfaces {
            Some(ifaces) => ifaces,
            None => enumerated(multicast_interfaces())?,
        };

        let control = ControlPlane::new(network, &socket)?;
        let mut members = Vec::with_capacity(candidates.len());
        let outcome = join_all(&candidates, |iface| {
            join_interface(&control, &mut members, iface, addr)
        });

        let mut conn = Self {
            socket: Some(socket),
            network,
            control: Some(control),
            interfaces: members,
            egress: platform_egress(),
        };
        match outcome {
            Ok(warning) => {
                debug!(joined = conn.interfaces.len(), "listening");
                Ok((conn, warning))
            }
            Err(e) => {
                if let Err(close_err) = conn.close() {
                    debug!(error = %close_err, "close after failed join");
                }
                Err(e)
            }
        }
    }

    /// Replaces the outbound-interface strategy used by
    /// [`write_to_multicast`](Self::write_to_multicast).
    pub fn with_egress(mut self, egress: Box<dyn Egress>) -> Self {
        self.egress = egress;
        self
    }

    /// Joins `group` on one more interface.
    #[tracing::instrument(skip(self, iface), fields(interface = %iface.name))]
    pub fn join_group(&mut self, iface: &Interface, group: SocketAddr) -> Result<(), Error> {
        self.network.check(group)?;
        let control = self.control.as_ref().ok_or(Error::Closed)?;
        let joined = join_interface(control, &mut self.interfaces, iface, group);
        joined.map_err(|source| Error::Join {
            interface: InterfaceId::from(iface),
            source,
        })
    }

    /// Multicast TTL for udp4, hop limit for udp6.
    pub fn set_multicast_ttl(&self, ttl: u32) -> Result<(), Error> {
        Ok(self.control()?.set_multicast_ttl(ttl)?)
    }

    /// Same as [`set_multicast_ttl`](Self::set_multicast_ttl).
    pub fn set_multicast_hop_limit(&self, hop_limit: u32) -> Result<(), Error> {
        self.set_multicast_ttl(hop_limit)
    }

    /// Whether datagrams sent from this socket are looped back to listeners on this host.
    pub fn set_multicast_loopback(&self, on: bool) -> Result<(), Error> {
        Ok(self.control()?.set_multicast_loopback(on)?)
    }

    /// Sends `buf` to `addr` once through every joined interface.
    ///
    /// Every interface is tried even if some fail; the failures come back
    /// together in [`Error::Send`]. An empty `buf` sends nothing.
    #[tracing::instrument(skip(self, buf), fields(len = buf.len()))]
    pub fn write_to_multicast(&self, buf: &[u8], addr: SocketAddr) -> Result<(), Error> {
        self.network.check(addr)?;
        let control = self.control()?;
        let members = &self.interfaces;
        let sent = fan_out(self.egress.as_ref(), control, members, buf, addr);
        sent.map_err(|failures| Error::Send {
            attempted: members.len(),
            failures,
        })
    }

    /// Releases the control plane and the socket. Calling it again does nothing.
    pub fn close(&mut self) -> Result<(), Error> {
        let mut failures = Failures::new();

        if let Some(control) = self.control.take()
            && let Err(e) = close_socket(control.into_socket())
        {
            failures.push(Handle::ControlPlane, e);
        }
        if let Some(socket) = self.socket.take()
            && let Err(e) = close_socket(socket)
        {
            failures.push(Handle::Socket, e);
        }
        trace!(failures = failures.len(), "closed");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Close(failures))
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Interfaces joined so far, in join order.
    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    pub fn egress_is_stateful(&self) -> bool {
        self.egress.is_stateful()
    }

    /// The bound socket, for anything not covered here.
    pub fn socket(&self) -> Result<&UdpSocket, Error> {
        self.socket.as_ref().ok_or(Error::Closed)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket()?.local_addr()?)
    }

    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), Error> {
        Ok(self.socket()?.recv_from(buf)?)
    }

    /// Plain send; the OS picks the outbound interface.
    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize, Error> {
        Ok(self.socket()?.send_to(buf, addr)?)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), Error> {
        Ok(self.socket()?.set_read_timeout(timeout)?)
    }

    fn control(&self) -> Result<&ControlPlane, Error> {
        self.control.as_ref().ok_or(Error::Closed)
    }
}

/// Enumerated candidates; finding none is an error rather than an empty join.
fn enumerated(found: io::Result<Vec<Interface>>) -> Result<Vec<Interface>, Error> {
    let ifaces = found.map_err(Error::Interfaces)?;
    if ifaces.is_empty() {
        return Err(Error::NoMulticastInterfaces);
    }
    Ok(ifaces)
}

fn join_interface(
    control: &ControlPlane,
    members: &mut Vec<Interface>,
    iface: &Interface,
    group: SocketAddr,
) -> io::Result<()> {
    control.join_group(iface, group)?;
    members.push(iface.clone());
    Ok(())
}

fn bind<F>(network: Network, addr: SocketAddr, setup: F) -> Result<UdpSocket, Error>
where
    F: FnOnce(&Socket) -> Result<(), Error>,
{
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if network == Network::Udp6 {
        socket.set_only_v6(true)?;
    }
    setup(&socket)?;
    socket
        .bind(&addr.into())
        .map_err(|source| Error::Bind { addr, source })?;
    Ok(socket.into())
}

#[cfg(unix)]
fn close_socket(socket: UdpSocket) -> io::Result<()> {
    use std::os::fd::IntoRawFd;

    Ok(nix::unistd::close(socket.into_raw_fd())?)
}

#[cfg(not(unix))]
fn close_socket(socket: UdpSocket) -> io::Result<()> {
    drop(socket);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        net::{Ipv4Addr, SocketAddr, SocketAddrV6, UdpSocket},
        time::Duration,
    };

    use super::{MulticastConn, enumerated};
    use crate::{
        MDNS_ADDRESS_V6,
        multicast::{
            Network,
            egress::SocketOption,
            error::Error,
            interfaces::{Interface, multicast_interfaces},
        },
    };

    const GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

    const READ_TIMEOUT: Duration = Duration::from_secs(2);

    fn bogus_interface(index: u32) -> Interface {
        Interface {
            index,
            name: format!("bogus{index}"),
            is_up: true,
            is_multicast: true,
            is_loopback: false,
            addrs: Vec::new(),
        }
    }

    fn loopback() -> Option<Interface> {
        crate::multicast::interfaces::loopback_interface().unwrap()
    }

    fn wildcard() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    }

    /// A udp4 connection on `addr` that has not joined any interface yet.
    fn open_unjoined(addr: SocketAddr) -> MulticastConn {
        let opened = MulticastConn::listen(Network::Udp4, Some(Vec::new()), addr);
        let (conn, warning) = opened.unwrap();
        assert!(warning.is_none());
        conn
    }

    /// Joins `iface`, sends to the group and expects the datagram back.
    fn assert_self_delivery(mut conn: MulticastConn, iface: &Interface) {
        let group = SocketAddr::from((GROUP, 5353));
        conn.join_group(iface, group).unwrap();
        conn.set_multicast_loopback(true).unwrap();
        conn.set_read_timeout(Some(READ_TIMEOUT)).unwrap();

        let port = conn.local_addr().unwrap().port();
        let dst = SocketAddr::from((GROUP, port));
        conn.write_to_multicast(b"PING", dst).unwrap();

        let mut buf = [0; 64];
        let (len, _) = conn.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"PING");
    }

    #[test]
    fn unknown_network_is_rejected() {
        assert!(matches!(
            "udp5".parse::<Network>(),
            Err(Error::InvalidNetwork(tag)) if tag == "udp5"
        ));
    }

    #[test]
    fn address_family_must_match_network() {
        let addr: SocketAddr = "[::]:0".parse().unwrap();
        assert!(matches!(
            MulticastConn::listen(Network::Udp4, Some(Vec::new()), addr),
            Err(Error::AddressFamily { .. })
        ));
    }

    #[test]
    fn unbindable_address_is_a_bind_error() {
        let addr: SocketAddr = "192.0.2.1:0".parse().unwrap();
        assert!(matches!(
            MulticastConn::listen(Network::Udp4, Some(Vec::new()), addr),
            Err(Error::Bind { .. })
        ));
    }

    #[test]
    fn empty_interface_list_opens_without_members() {
        let conn = open_unjoined(wildcard());
        assert!(conn.interfaces().is_empty());
        assert_eq!(conn.network(), Network::Udp4);
        assert_ne!(conn.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn host_without_multicast_interfaces_fails() {
        assert!(matches!(
            enumerated(Ok(Vec::new())),
            Err(Error::NoMulticastInterfaces)
        ));
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(enumerated(Err(denied)), Err(Error::Interfaces(_))));
        assert_eq!(enumerated(Ok(vec![bogus_interface(7)])).unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn enumerated_listen_joins_eligible_interfaces() {
        let eligible = multicast_interfaces().unwrap();
        let opened = MulticastConn::listen(Network::Udp4, None, SocketAddr::from((GROUP, 0)));
        if eligible.is_empty() {
            assert!(matches!(opened, Err(Error::NoMulticastInterfaces)));
            return;
        }

        let (conn, _) = opened.unwrap();
        assert!(!conn.interfaces().is_empty());
        for iface in conn.interfaces() {
            assert!(eligible.contains(iface), "{} was not enumerated", iface.name);
        }
    }

    #[test]
    fn every_join_failing_fails_the_open() {
        let addr = SocketAddr::from((GROUP, 0));
        let ifaces = vec![bogus_interface(0x00ff_fff1), bogus_interface(0x00ff_fff2)];
        match MulticastConn::listen(Network::Udp4, Some(ifaces), addr) {
            Err(Error::NoInterfaceJoined(failures)) => assert_eq!(failures.len(), 2),
            other => panic!("expected NoInterfaceJoined, got {other:?}"),
        }
    }

    #[test]
    fn failed_open_releases_the_port() {
        let port = {
            let spare = UdpSocket::bind(wildcard()).unwrap();
            spare.local_addr().unwrap().port()
        };
        let addr = SocketAddr::from((GROUP, port));

        let ifaces = vec![bogus_interface(0x00ff_fff6)];
        let opened = MulticastConn::listen(Network::Udp4, Some(ifaces), addr);
        assert!(matches!(opened, Err(Error::NoInterfaceJoined(_))));

        // Binding without address reuse only works once the failed open let go.
        UdpSocket::bind(addr).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn some_joins_failing_is_a_warning() {
        let Some(lo) = loopback() else { return };
        let addr = SocketAddr::from((GROUP, 0));
        let ifaces = vec![
            bogus_interface(0x00ff_fff3),
            lo.clone(),
            bogus_interface(0x00ff_fff4),
        ];

        let opened = MulticastConn::listen(Network::Udp4, Some(ifaces), addr);
        let (conn, warning) = opened.unwrap();
        let warning = warning.expect("two interfaces failed");
        assert_eq!(warning.attempted, 3);
        assert_eq!(warning.failures.len(), 2);
        assert_eq!(conn.interfaces(), [lo]);
    }

    #[test]
    fn failed_join_leaves_members_untouched() {
        let mut conn = open_unjoined(wildcard());
        let group = SocketAddr::from((GROUP, 5353));

        let err = conn
            .join_group(&bogus_interface(0x00ff_fff5), group)
            .unwrap_err();
        match err {
            Error::Join { interface, .. } => assert_eq!(interface.index, 0x00ff_fff5),
            other => panic!("expected Join, got {other:?}"),
        }
        assert!(conn.interfaces().is_empty());
    }

    #[test]
    fn close_is_idempotent() {
        let mut conn = open_unjoined(wildcard());
        conn.close().unwrap();
        conn.close().unwrap();

        assert!(matches!(conn.local_addr(), Err(Error::Closed)));
        assert!(matches!(conn.set_multicast_ttl(1), Err(Error::Closed)));
        let group = SocketAddr::from((GROUP, 5353));
        let err = conn.write_to_multicast(b"PING", group).unwrap_err();
        assert!(matches!(err, Error::Closed));
        let err = conn.join_group(&bogus_interface(1), group).unwrap_err();
        assert!(matches!(err, Error::Closed));
    }

    #[test]
    fn ttl_and_loopback_apply_connection_wide() {
        let conn = open_unjoined(wildcard());
        conn.set_multicast_ttl(1).unwrap();
        conn.set_multicast_loopback(false).unwrap();

        let socket = conn.socket().unwrap();
        assert_eq!(socket.multicast_ttl_v4().unwrap(), 1);
        assert!(!socket.multicast_loop_v4().unwrap());

        conn.set_multicast_hop_limit(4).unwrap();
        assert_eq!(socket.multicast_ttl_v4().unwrap(), 4);
    }

    #[test]
    fn empty_write_without_members_is_ok() {
        let conn = open_unjoined(wildcard());
        let group = SocketAddr::from((GROUP, 5353));
        conn.write_to_multicast(&[], group).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn loopback_self_delivery() {
        let Some(lo) = loopback() else { return };
        assert_self_delivery(open_unjoined(wildcard()), &lo);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn socket_option_egress_self_delivery() {
        let Some(lo) = loopback() else { return };
        let conn = open_unjoined(wildcard()).with_egress(Box::new(SocketOption));
        assert!(conn.egress_is_stateful());
        assert_self_delivery(conn, &lo);
    }

    #[cfg(unix)]
    #[test]
    fn v6_self_delivery() {
        let addr: SocketAddr = "[::]:0".parse().unwrap();
        let opened = MulticastConn::listen(Network::Udp6, Some(Vec::new()), addr);
        let Ok((mut conn, _)) = opened else {
            // No IPv6 on this host.
            return;
        };

        let group = SocketAddr::from((MDNS_ADDRESS_V6, 5353));
        let candidates = multicast_interfaces().unwrap();
        let Some(iface) = candidates
            .iter()
            .find(|iface| conn.join_group(iface, group).is_ok())
        else {
            return;
        };
        conn.set_multicast_loopback(true).unwrap();
        conn.set_read_timeout(Some(READ_TIMEOUT)).unwrap();

        let port = conn.local_addr().unwrap().port();
        let dst = SocketAddrV6::new(MDNS_ADDRESS_V6, port, 0, iface.index);
        if conn.write_to_multicast(b"PING6", dst.into()).is_err() {
            // Joined, but the interface has no usable IPv6 route.
            return;
        }

        let mut buf = [0; 64];
        let (len, _) = conn.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"PING6");
    }

    #[tokio::test]
    async fn reads_on_a_blocking_task() {
        let conn = open_unjoined(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)));
        conn.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        let conn = std::sync::Arc::new(conn);

        let reader = std::sync::Arc::clone(&conn);
        let received = tokio::task::spawn_blocking(move || {
            let mut buf = [0; 16];
            let (len, _) = reader.recv_from(&mut buf).unwrap();
            buf[..len].to_vec()
        });

        let local = conn.local_addr().unwrap();
        assert_eq!(conn.send_to(b"hi", local).unwrap(), 2);
        assert_eq!(received.await.unwrap(), b"hi");
    }

    #[test]
    fn v6_sockets_are_v6_only() {
        let addr: SocketAddr = "[::1]:0".parse().unwrap();
        let opened = MulticastConn::listen(Network::Udp6, Some(Vec::new()), addr);
        let Ok((conn, _)) = opened else {
            // No IPv6 on this host.
            return;
        };
        assert_eq!(conn.network(), Network::Udp6);
        let socket = socket2::SockRef::from(conn.socket().unwrap());
        assert!(socket.only_v6().unwrap());
    }
}
