//! Forceful reaping: SIGTERM, bounded wait, then SIGKILL.
//!
//! Destructive, so [`reap`] demands a [`ReapAuthorization`]. The token can
//! only be obtained from an explicit operator opt-in (`--force`) or from
//! the plain `stop` command, whose policy is to always escalate.

use std::time::Duration;

use jarvis_core::Pid;
use tracing::{info, warn};

use crate::error::Result;
use crate::host::{ProcessHost, StopSignal};
use crate::pacer::Pacer;

/// How long to wait for the kernel to tear down SIGKILLed processes.
const KILL_SETTLE: Duration = Duration::from_secs(2);

/// Proof that the caller was allowed to escalate to SIGKILL.
#[derive(Debug, Clone, Copy)]
pub struct ReapAuthorization {
    _private: (),
}

impl ReapAuthorization {
    /// Authorization from an operator's force flag.
    pub fn from_force_flag(force: bool) -> Option<Self> {
        force.then_some(Self { _private: () })
    }

    /// The plain `stop` command escalates unconditionally after its grace
    /// period.
    pub fn stop_command_policy() -> Self {
        Self { _private: () }
    }
}

/// Terminate `pids`, escalating to SIGKILL after `escalation_timeout`.
///
/// Returns the pids still alive after SIGKILL. A non-empty result means a
/// process the kernel would not remove (e.g. stuck in uninterruptible
/// sleep); there is no further escalation.
pub fn reap<H: ProcessHost + ?Sized>(
    host: &H,
    _authorization: &ReapAuthorization,
    pids: &[Pid],
    escalation_timeout: Duration,
    poll_interval: Duration,
    pacer: &Pacer,
) -> Result<Vec<Pid>> {
    if pids.is_empty() {
        return Ok(Vec::new());
    }
    pacer.check()?;

    send_all(host, pids, StopSignal::Terminate);
    let stubborn = pacer.wait_for_exit(host, pids, escalation_timeout, poll_interval)?;
    if stubborn.is_empty() {
        info!(count = pids.len(), "All processes exited after SIGTERM");
        return Ok(Vec::new());
    }

    warn!(pids = ?stubborn, "Escalating to SIGKILL");
    send_all(host, &stubborn, StopSignal::Kill);
    let survivors = pacer.wait_for_exit(host, &stubborn, KILL_SETTLE, poll_interval)?;
    if !survivors.is_empty() {
        warn!(pids = ?survivors, "Processes survived SIGKILL");
    }
    Ok(survivors)
}

fn send_all<H: ProcessHost + ?Sized>(host: &H, pids: &[Pid], signal: StopSignal) {
    for pid in pids {
        if let Err(e) = host.signal(*pid, signal) {
            warn!(pid = %pid, signal = ?signal, error = %e, "Failed to signal process");
        }
    }
}
