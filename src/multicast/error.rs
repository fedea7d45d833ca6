use std::{
    fmt::{self, Debug, Display},
    io,
    net::SocketAddr,
};

use thiserror::Error;

use super::{Network, interfaces::Interface};

#[derive(Debug, Error)]
pub enum Error {
    #[error("network must be either 'udp4' or 'udp6': {0}")]
    InvalidNetwork(String),

    #[error("{addr} is not a valid {network} address")]
    AddressFamily { network: Network, addr: SocketAddr },

    #[error("unknown interface: {0}")]
    UnknownInterface(String),

    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to get multicast interfaces")]
    Interfaces(#[source] io::Error),

    #[error("failed to join {interface}")]
    Join {
        interface: InterfaceId,
        #[source]
        source: io::Error,
    },

    #[error("failed to join any interface: {0}")]
    NoInterfaceJoined(Failures<InterfaceId>),

    #[error("no multicast-capable interfaces found")]
    NoMulticastInterfaces,

    #[error("failed to send on {}/{attempted} interfaces: {failures}", .failures.len())]
    Send {
        attempted: usize,
        failures: Failures<InterfaceId>,
    },

    #[error("failed to close connection: {0}")]
    Close(Failures<Handle>),

    #[error("connection is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Returned next to a usable connection when only some interfaces joined the group.
#[derive(Debug, Error)]
#[error("failed to join {}/{attempted} interfaces: {failures}", .failures.len())]
pub struct PartialJoin {
    pub attempted: usize,
    pub failures: Failures<InterfaceId>,
}

/// Identifies the interface an aggregated failure belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceId {
    pub index: u32,
    pub name: String,
}

impl From<&Interface> for InterfaceId {
    fn from(iface: &Interface) -> Self {
        Self {
            index: iface.index,
            name: iface.name.clone(),
        }
    }
}

impl Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (index {})", self.name, self.index)
    }
}

/// The resources released by [`MulticastConn::close`](super::MulticastConn::close).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    ControlPlane,
    Socket,
}

impl Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::ControlPlane => f.write_str("control plane"),
            Handle::Socket => f.write_str("socket"),
        }
    }
}

/// Failures of independent operations, kept in the order they were attempted.
#[derive(Debug)]
pub struct Failures<K> {
    entries: Vec<(K, io::Error)>,
}

impl<K> Failures<K> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, key: K, error: io::Error) {
        self.entries.push((key, error));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &io::Error)> {
        self.entries.iter().map(|(k, e)| (k, e))
    }

    pub fn into_inner(self) -> Vec<(K, io::Error)> {
        self.entries
    }
}

impl<K> Default for Failures<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Display> Display for Failures<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, error)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{key}: {error}")?;
        }
        Ok(())
    }
}

impl<K: Display + Debug> std::error::Error for Failures<K> {}
