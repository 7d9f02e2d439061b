//! Residual scan: live processes matching the instance signature that the
//! process handle does not account for.

use jarvis_core::{InstanceSignature, Pid};
use tracing::debug;

use crate::error::Result;
use crate::host::ProcessHost;

/// Live processes whose command line matches `signature`.
///
/// Excludes the supervisor itself, and `expected` when it is alive (the
/// tracked instance is not a residual of itself). Sorted and deduplicated.
pub fn find_residual<H: ProcessHost + ?Sized>(
    host: &H,
    signature: &InstanceSignature,
    expected: Option<Pid>,
) -> Result<Vec<Pid>> {
    let own = host.own_pid();
    let expected = expected.filter(|pid| host.is_alive(*pid));

    let mut residual: Vec<Pid> = host
        .processes()?
        .into_iter()
        .filter(|p| p.pid != own && Some(p.pid) != expected)
        .filter(|p| signature.matches(&p.command))
        .map(|p| p.pid)
        .filter(|pid| host.is_alive(*pid))
        .collect();
    residual.sort();
    residual.dedup();

    debug!(signature = %signature, count = residual.len(), "Residual scan complete");
    Ok(residual)
}
