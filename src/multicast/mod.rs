use std::{fmt, net::SocketAddr, str::FromStr};

use serde::{Deserialize, Serialize};

pub mod conn;
pub mod control;
pub mod egress;
pub mod error;
pub mod interfaces;
mod join;
mod writer;

pub use conn::MulticastConn;
pub use error::{Error, Failures, Handle, InterfaceId, PartialJoin};
pub use interfaces::Interface;

/// Address family of a multicast connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Network {
    Udp4,
    Udp6,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Udp4 => "udp4",
            Network::Udp6 => "udp6",
        }
    }

    /// Rejects addresses of the other family.
    pub(crate) fn check(self, addr: SocketAddr) -> Result<(), Error> {
        match (self, addr) {
            (Network::Udp4, SocketAddr::V4(_)) | (Network::Udp6, SocketAddr::V6(_)) => Ok(()),
            _ => Err(Error::AddressFamily {
                network: self,
                addr,
            }),
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "udp4" => Ok(Network::Udp4),
            "udp6" => Ok(Network::Udp6),
            other => Err(Error::InvalidNetwork(other.to_owned())),
        }
    }
}

impl TryFrom<String> for Network {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Network> for &'static str {
    fn from(network: Network) -> Self {
        network.as_str()
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
