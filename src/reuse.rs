//! Address and port reuse, for sharing a multicast port with other listeners.
//!
//! Both options must be set before the socket is bound. Platforms without
//! the option report a `*NotSupported` error the caller may ignore.

use std::io;

use socket2::Socket;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReuseError {
    #[error("reuseaddr: not supported on this platform")]
    AddrNotSupported,
    #[error("reuseport: not supported on this platform")]
    PortNotSupported,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ReuseError {
    pub fn is_not_supported(&self) -> bool {
        matches!(
            self,
            ReuseError::AddrNotSupported | ReuseError::PortNotSupported
        )
    }
}

#[cfg(any(unix, windows))]
pub fn reuse_addr(socket: &Socket) -> Result<(), ReuseError> {
    Ok(socket.set_reuse_address(true)?)
}

#[cfg(not(any(unix, windows)))]
pub fn reuse_addr(_socket: &Socket) -> Result<(), ReuseError> {
    Err(ReuseError::AddrNotSupported)
}

#[cfg(all(
    unix,
    not(any(
        target_os = "freebsd",
        target_os = "solaris",
        target_os = "illumos",
        target_os = "cygwin"
    ))
))]
pub fn reuse_port(socket: &Socket) -> Result<(), ReuseError> {
    Ok(socket.set_reuse_port(true)?)
}

/// FreeBSD also gets `SO_REUSEPORT_LB`, which spreads datagrams across the sharing sockets.
#[cfg(target_os = "freebsd")]
pub fn reuse_port(socket: &Socket) -> Result<(), ReuseError> {
    socket.set_reuse_port(true)?;
    Ok(socket.set_reuse_port_lb(true)?)
}

#[cfg(not(all(
    unix,
    not(any(target_os = "solaris", target_os = "illumos", target_os = "cygwin"))
)))]
pub fn reuse_port(_socket: &Socket) -> Result<(), ReuseError> {
    Err(ReuseError::PortNotSupported)
}
