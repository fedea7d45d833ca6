use std::net::SocketAddr;

use tracing::trace;

use super::{
    control::ControlPlane,
    egress::Egress,
    error::{Failures, InterfaceId},
    interfaces::Interface,
};

/// Sends `payload` once through every interface in `members`, in order.
///
/// A failure on one interface never stops the others from being tried.
pub(crate) fn fan_out(
    egress: &dyn Egress,
    control: &ControlPlane,
    members: &[Interface],
    payload: &[u8],
    dst: SocketAddr,
) -> Result<(), Failures<InterfaceId>> {
    if payload.is_empty() {
        return Ok(());
    }

    let mut failures = Failures::new();
    for iface in members {
        match egress.send_via(control, iface, payload, dst) {
            Ok(len) => trace!(interface = %iface.name, len, "sent"),
            Err(e) => {
                trace!(interface = %iface.name, error = %e, "send failed");
                failures.push(InterfaceId::from(iface), e);
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures)
    }
}
