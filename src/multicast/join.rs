use std::io;

use tracing::debug;

use super::{
    error::{Error, Failures, InterfaceId, PartialJoin},
    interfaces::Interface,
};

/// Tries `join` on every candidate and applies the partial-failure policy:
/// the connection survives as long as at least one interface joined.
///
/// Returns the warning for a partial failure, or
/// [`Error::NoInterfaceJoined`] when every attempt failed. An empty candidate
/// list attempts nothing and succeeds.
pub(crate) fn join_all<F>(
    candidates: &[Interface],
    mut join: F,
) -> Result<Option<PartialJoin>, Error>
where
    F: FnMut(&Interface) -> io::Result<()>,
{
    let mut failures = Failures::new();
    for iface in candidates {
        match join(iface) {
            Ok(()) => debug!(interface = %iface.name, index = iface.index, "joined"),
            Err(e) => {
                debug!(interface = %iface.name, index = iface.index, error = %e, "join failed");
                failures.push(InterfaceId::from(iface), e);
            }
        }
    }

    if failures.is_empty() {
        Ok(None)
    } else if failures.len() == candidates.len() {
        Err(Error::NoInterfaceJoined(failures))
    } else {
        Ok(Some(PartialJoin {
            attempted: candidates.len(),
            failures,
        }))
    }
}
