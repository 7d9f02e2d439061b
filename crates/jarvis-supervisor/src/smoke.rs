//! One-shot smoke test: launch, watch for a while, stop.

use std::time::{Duration, Instant};

use jarvis_core::{Pid, Timings};
use jarvis_persistence::PidStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::control::{self, StopReport};
use crate::error::LifecycleError;
use crate::host::ProcessHost;
use crate::launcher::{self, LaunchSpec};
use crate::pacer::Pacer;
use crate::probe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SmokeReport {
    pub pid: Pid,
    pub window_secs: u64,
    pub stop: StopReport,
}

/// Launch an instance, require it to stay alive for `window`, then stop it.
///
/// Refuses to run while a tracked instance is alive. If the instance dies
/// during the window the handle is cleared and the result is
/// [`LifecycleError::VerifyFailed`].
pub fn run_smoke<H: ProcessHost + ?Sized>(
    host: &H,
    spec: &LaunchSpec,
    store: &PidStore,
    timings: &Timings,
    window: Duration,
    pacer: &Pacer,
) -> Result<SmokeReport, LifecycleError> {
    spec.verify()?;
    if let Some(pid) = store.read().filter(|pid| probe::is_instance(host, *pid, spec.signature())) {
        return Err(LifecycleError::Setup(format!(
            "instance {} is already running; stop it before a smoke test",
            pid
        )));
    }

    let pid = launcher::start(host, spec, store, timings.verify_delay, pacer)?;
    info!(pid = %pid, window_secs = window.as_secs(), "Smoke instance started");

    let deadline = Instant::now() + window;
    let mut survived = true;
    loop {
        if !host.is_alive(pid) {
            survived = false;
            break;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        pacer.pause(timings.poll_interval.max(Duration::from_millis(1)).min(deadline - now))?;
    }

    let stop = control::stop_instance(host, store, spec.signature(), timings, pacer)?;
    if !survived {
        warn!(pid = %pid, "Smoke instance died during the observation window");
        return Err(LifecycleError::VerifyFailed(format!(
            "instance {} exited during the {}s smoke window",
            pid,
            window.as_secs()
        )));
    }

    Ok(SmokeReport {
        pid,
        window_secs: window.as_secs(),
        stop,
    })
}
