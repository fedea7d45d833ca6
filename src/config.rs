use std::net::SocketAddr;

use serde::Deserialize;
use socket2::Socket;
use tracing::debug;

use crate::{
    multicast::{
        Error, Interface, MulticastConn, Network, PartialJoin, interfaces::interface_by_name,
    },
    reuse::{ReuseError, reuse_addr, reuse_port},
};

/// Everything needed to open a [`MulticastConn`].
#[derive(Debug, Clone, Deserialize)]
pub struct MulticastConfig {
    pub network: Network,
    pub bind: SocketAddr,
    /// Interface names to join on. All multicast-capable interfaces when absent.
    #[serde(default)]
    pub interfaces: Option<Vec<String>>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub loopback: Option<bool>,
    #[serde(default)]
    pub reuse_addr: bool,
    #[serde(default)]
    pub reuse_port: bool,
}

impl MulticastConfig {
    pub fn new(network: Network, bind: SocketAddr) -> Self {
        Self {
            network,
            bind,
            interfaces: None,
            ttl: None,
            loopback: None,
            reuse_addr: false,
            reuse_port: false,
        }
    }

    #[tracing::instrument(
        name = "Multicast Config",
        skip(self),
        fields(network = %self.network, bind = %self.bind)
    )]
    pub fn listen(&self) -> Result<(MulticastConn, Option<PartialJoin>), Error> {
        let interfaces = self.resolve_interfaces()?;
        let setup = |socket: &Socket| -> Result<(), Error> {
            if self.reuse_addr {
                tolerate_unsupported(reuse_addr(socket))?;
            }
            if self.reuse_port {
                tolerate_unsupported(reuse_port(socket))?;
            }
            Ok(())
        };

        let (mut conn, warning) = MulticastConn::open(self.network, interfaces, self.bind, setup)?;

        if let Err(e) = self.apply(&conn) {
            if let Err(close_err) = conn.close() {
                debug!(error = %close_err, "close after failed configuration");
            }
            return Err(e);
        }
        Ok((conn, warning))
    }

    /// Looks every configured name up, keeping the configured order.
    fn resolve_interfaces(&self) -> Result<Option<Vec<Interface>>, Error> {
        let Some(names) = &self.interfaces else {
            return Ok(None);
        };
        names
            .iter()
            .map(|name| {
                interface_by_name(name)
                    .map_err(Error::Interfaces)?
                    .ok_or_else(|| Error::UnknownInterface(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn apply(&self, conn: &MulticastConn) -> Result<(), Error> {
        if let Some(ttl) = self.ttl {
            conn.set_multicast_ttl(ttl)?;
        }
        if let Some(on) = self.loopback {
            conn.set_multicast_loopback(on)?;
        }
        Ok(())
    }
}

fn tolerate_unsupported(result: Result<(), ReuseError>) -> Result<(), Error> {
    match result {
        Ok(()) => Ok(()),
        Err(ReuseError::Io(e)) => Err(Error::Io(e)),
        Err(unsupported) => {
            debug!(error = %unsupported, "skipping socket reuse");
            Ok(())
        }
    }
}
