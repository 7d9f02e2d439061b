//! Graceful stop: SIGTERM and a bounded wait. Never escalates.

use std::time::Duration;

use jarvis_core::Pid;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::host::{ProcessHost, StopSignal};
use crate::pacer::Pacer;

/// Result of a graceful stop attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    StillAlive,
}

/// Ask `pid` to terminate and wait up to `grace` for it to exit.
///
/// A pid that cannot be signalled because it is already gone counts as
/// stopped. Only an interrupt of the supervisor itself is an error.
pub fn stop<H: ProcessHost + ?Sized>(
    host: &H,
    pid: Pid,
    grace: Duration,
    poll_interval: Duration,
    pacer: &Pacer,
) -> Result<StopOutcome> {
    pacer.check()?;

    match host.signal(pid, StopSignal::Terminate) {
        Ok(true) => debug!(pid = %pid, "Sent SIGTERM"),
        Ok(false) => {
            debug!(pid = %pid, "Process already gone");
            return Ok(StopOutcome::Stopped);
        }
        Err(e) => {
            warn!(pid = %pid, error = %e, "Could not signal process");
            return Ok(if host.is_alive(pid) {
                StopOutcome::StillAlive
            } else {
                StopOutcome::Stopped
            });
        }
    }

    let alive = pacer.wait_for_exit(host, &[pid], grace, poll_interval)?;
    if alive.is_empty() {
        info!(pid = %pid, "Process stopped");
        Ok(StopOutcome::Stopped)
    } else {
        warn!(pid = %pid, grace_ms = grace.as_millis() as u64, "Process still alive after grace period");
        Ok(StopOutcome::StillAlive)
    }
}
