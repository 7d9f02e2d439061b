//! Plain `start`, `stop`, `restart` and `status` commands.
//!
//! Unlike the clean restart, plain `stop` always escalates to SIGKILL once
//! its grace period runs out, and it only acts on the tracked instance.
//! A recorded pid counts as the instance only while it is alive and its
//! command line matches the signature; anything else is a stale handle.

use std::path::PathBuf;

use jarvis_core::{InstanceSignature, Pid, Timings};
use jarvis_persistence::PidStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::LifecycleError;
use crate::host::ProcessHost;
use crate::launcher::{self, LaunchSpec};
use crate::pacer::Pacer;
use crate::probe;
use crate::reaper::{self, ReapAuthorization};
use crate::scanner;
use crate::stopper::{self, StopOutcome};

/// State of the tracked instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum InstanceStatus {
    Running { pid: Pid },
    /// The handle names a process that no longer exists, or one that is
    /// not this instance.
    Stale { pid: Pid },
    NotRunning,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub instance: InstanceStatus,
    /// Matching processes the handle does not account for.
    pub untracked: Vec<Pid>,
    pub pid_file: PathBuf,
}

impl StatusReport {
    pub fn is_running(&self) -> bool {
        matches!(self.instance, InstanceStatus::Running { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StartReport {
    Started { pid: Pid },
    AlreadyRunning { pid: Pid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StopReport {
    NotRunning,
    /// Exited within the grace period.
    Stopped { pid: Pid },
    /// Needed escalation.
    Killed { pid: Pid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestartReport {
    pub stop: StopReport,
    pub start: StartReport,
}

/// Report liveness of the tracked instance. Read-only.
pub fn status<H: ProcessHost + ?Sized>(
    host: &H,
    store: &PidStore,
    signature: &InstanceSignature,
) -> StatusReport {
    let instance = match store.read() {
        Some(pid) if probe::is_instance(host, pid, signature) => InstanceStatus::Running { pid },
        Some(pid) => InstanceStatus::Stale { pid },
        None => InstanceStatus::NotRunning,
    };
    let tracked = match instance {
        InstanceStatus::Running { pid } => Some(pid),
        _ => None,
    };
    let untracked = scanner::find_residual(host, signature, tracked).unwrap_or_else(|e| {
        warn!(error = %e, "Could not scan for untracked instances");
        Vec::new()
    });

    StatusReport {
        instance,
        untracked,
        pid_file: store.path().to_path_buf(),
    }
}

/// Start an instance unless the tracked one is already running.
pub fn start_instance<H: ProcessHost + ?Sized>(
    host: &H,
    spec: &LaunchSpec,
    store: &PidStore,
    timings: &Timings,
    pacer: &Pacer,
) -> Result<StartReport, LifecycleError> {
    spec.verify()?;

    if let Some(pid) = store.read() {
        if probe::is_instance(host, pid, spec.signature()) {
            info!(pid = %pid, "Instance already running");
            return Ok(StartReport::AlreadyRunning { pid });
        }
        info!(pid = %pid, "Clearing stale process handle");
        store.clear()?;
    }

    let pid = launcher::start(host, spec, store, timings.verify_delay, pacer)?;
    Ok(StartReport::Started { pid })
}

/// Stop the tracked instance: SIGTERM, grace period, then SIGKILL.
pub fn stop_instance<H: ProcessHost + ?Sized>(
    host: &H,
    store: &PidStore,
    signature: &InstanceSignature,
    timings: &Timings,
    pacer: &Pacer,
) -> Result<StopReport, LifecycleError> {
    let Some(pid) = store.read() else {
        return Ok(StopReport::NotRunning);
    };
    if !probe::is_instance(host, pid, signature) {
        info!(pid = %pid, "Process handle is stale");
        store.clear()?;
        return Ok(StopReport::NotRunning);
    }

    let report = match stopper::stop(host, pid, timings.stop_grace, timings.poll_interval, pacer)? {
        StopOutcome::Stopped => StopReport::Stopped { pid },
        StopOutcome::StillAlive => {
            let survivors = reaper::reap(
                host,
                &ReapAuthorization::stop_command_policy(),
                &[pid],
                timings.escalation_timeout,
                timings.poll_interval,
                pacer,
            )?;
            if !survivors.is_empty() {
                return Err(LifecycleError::ReapSurvivor { pids: survivors });
            }
            StopReport::Killed { pid }
        }
    };
    store.clear()?;
    Ok(report)
}

/// `stop` then `start`. Launch prerequisites are checked before stopping.
pub fn restart_instance<H: ProcessHost + ?Sized>(
    host: &H,
    spec: &LaunchSpec,
    store: &PidStore,
    timings: &Timings,
    pacer: &Pacer,
) -> Result<RestartReport, LifecycleError> {
    spec.verify()?;
    let stop = stop_instance(host, store, spec.signature(), timings, pacer)?;
    let start = start_instance(host, spec, store, timings, pacer)?;
    Ok(RestartReport { stop, start })
}
