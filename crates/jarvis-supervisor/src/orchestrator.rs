//! Clean-restart orchestration.
//!
//! Runs the phases of a clean restart as an explicit state machine:
//!
//! ```text
//! Idle → Delaying? → Stopping → Scanning ─┬─────────────→ Starting → Verifying → Done
//!                                          ├→ Reaping ────┘      │            │
//!                                          └→ Failed             └→ Failed ←──┘
//! ```
//!
//! - A failed graceful stop is soft: the scan decides whether anything is
//!   left over.
//! - Residual processes abort the run unless the operator passed `--force`.
//! - Processes that survive SIGKILL abort the run.
//! - In dry-run mode only reads happen (handle file, liveness probes,
//!   process table). Every action is logged instead of performed, read
//!   failures are logged as warnings, and the run always ends in `Done`.
//!   Only an interrupt of the supervisor itself cuts a dry run short.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jarvis_core::{Pid, Timings};
use jarvis_persistence::PidStore;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{format_pids, LifecycleError, StartError, SupervisorError};
use crate::host::ProcessHost;
use crate::launcher::{self, LaunchSpec};
use crate::pacer::Pacer;
use crate::probe;
use crate::reaper::{self, ReapAuthorization};
use crate::scanner;
use crate::stopper::{self, StopOutcome};

/// Phases of a clean restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Idle,
    Delaying,
    Stopping,
    Scanning,
    Reaping,
    Starting,
    Verifying,
    Done,
    Failed,
}

/// Operator options for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunOptions {
    /// Seconds to wait before stopping anything.
    pub delay_secs: u64,
    /// Authorizes the Reaping phase.
    pub force: bool,
    /// Log actions instead of performing them.
    pub dry_run: bool,
}

impl RunOptions {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Ok,
    /// Logged and carried on (e.g. a graceful stop that timed out).
    Soft,
    Skipped,
    /// Dry run: the action was only described.
    Simulated,
    Fatal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseRecord {
    pub state: LifecycleState,
    pub outcome: PhaseOutcome,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// In-memory record of one orchestration. Never persisted.
#[derive(Debug, Serialize)]
pub struct LifecycleRun {
    pub options: RunOptions,
    pub state: LifecycleState,
    pub started_at: DateTime<Utc>,
    pub phases: Vec<PhaseRecord>,
    /// Residual processes found by the scan, before any reaping.
    pub residuals: Vec<Pid>,
    /// Verified pid of the new instance.
    pub final_pid: Option<Pid>,
    pub failure: Option<String>,
    #[serde(skip)]
    error: Option<LifecycleError>,
}

impl LifecycleRun {
    fn new(options: RunOptions) -> Self {
        Self {
            options,
            state: LifecycleState::Idle,
            started_at: Utc::now(),
            phases: Vec::new(),
            residuals: Vec::new(),
            final_pid: None,
            failure: None,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == LifecycleState::Done
    }

    pub fn error(&self) -> Option<&LifecycleError> {
        self.error.as_ref()
    }

    pub fn exit_code(&self) -> i32 {
        self.error.as_ref().map_or(0, LifecycleError::exit_code)
    }

    fn enter(&mut self, state: LifecycleState) {
        info!(from = ?self.state, to = ?state, "Lifecycle transition");
        self.state = state;
    }

    fn record(&mut self, outcome: PhaseOutcome, detail: impl Into<String>) {
        let detail = detail.into();
        match outcome {
            PhaseOutcome::Soft | PhaseOutcome::Fatal => warn!(state = ?self.state, "{}", detail),
            PhaseOutcome::Simulated => info!(state = ?self.state, "[dry-run] {}", detail),
            _ => info!(state = ?self.state, "{}", detail),
        }
        self.phases.push(PhaseRecord {
            state: self.state,
            outcome,
            detail,
            at: Utc::now(),
        });
    }

    fn fail(&mut self, error: LifecycleError) {
        warn!(state = ?self.state, error = %error, "Lifecycle run failed");
        self.failure = Some(error.to_string());
        self.error = Some(error);
        self.state = LifecycleState::Failed;
    }
}

/// Sequences stop → scan → reap → start for one deployment.
pub struct Orchestrator<'a, H: ProcessHost + ?Sized> {
    host: &'a H,
    spec: &'a LaunchSpec,
    store: &'a PidStore,
    timings: Timings,
    pacer: &'a Pacer,
}

impl<'a, H: ProcessHost + ?Sized> Orchestrator<'a, H> {
    pub fn new(
        host: &'a H,
        spec: &'a LaunchSpec,
        store: &'a PidStore,
        timings: Timings,
        pacer: &'a Pacer,
    ) -> Self {
        Self {
            host,
            spec,
            store,
            timings,
            pacer,
        }
    }

    /// Execute a clean restart. Failures are reported in the returned run.
    pub fn run(&self, options: RunOptions) -> LifecycleRun {
        let mut run = LifecycleRun::new(options);
        match self.drive(&mut run) {
            Ok(pid) => {
                run.final_pid = pid;
                run.enter(LifecycleState::Done);
            }
            Err(e) => run.fail(e),
        }
        run
    }

    fn drive(&self, run: &mut LifecycleRun) -> Result<Option<Pid>, LifecycleError> {
        let RunOptions {
            delay_secs,
            force,
            dry_run,
        } = run.options;

        if let Err(e) = self.spec.verify() {
            if !dry_run {
                run.record(PhaseOutcome::Fatal, e.to_string());
                return Err(e.into());
            }
            run.record(PhaseOutcome::Simulated, format!("would abort before any change: {}", e));
        }

        if delay_secs > 0 {
            run.enter(LifecycleState::Delaying);
            if dry_run {
                run.record(PhaseOutcome::Simulated, format!("would wait {}s", delay_secs));
            } else {
                self.pacer.pause(run.options.delay())?;
                run.record(PhaseOutcome::Ok, format!("waited {}s", delay_secs));
            }
        }

        run.enter(LifecycleState::Stopping);
        let tracked = self.stop_tracked(run, dry_run)?;

        run.enter(LifecycleState::Scanning);
        self.pacer.check()?;
        // A dry run never asked the tracked instance to stop, so it is not
        // a residual yet.
        let expected = if dry_run { tracked } else { None };
        let mut residuals = match scanner::find_residual(self.host, self.spec.signature(), expected) {
            Ok(found) => found,
            Err(SupervisorError::Interrupted) => return Err(LifecycleError::Interrupted),
            Err(e) if dry_run => {
                run.record(PhaseOutcome::Soft, format!("process scan failed, residuals unknown: {}", e));
                Vec::new()
            }
            Err(e) => {
                run.record(PhaseOutcome::Fatal, format!("process scan failed: {}", e));
                return Err(e.into());
            }
        };
        if let Some(pid) = tracked {
            if !dry_run && self.host.is_alive(pid) && !residuals.contains(&pid) {
                residuals.push(pid);
                residuals.sort();
            }
        }
        run.residuals = residuals.clone();

        if residuals.is_empty() {
            run.record(PhaseOutcome::Ok, "no residual processes");
        } else if !force {
            let detail = format!(
                "residual processes present, not authorized to remove: {}",
                format_pids(&residuals)
            );
            if !dry_run {
                run.record(PhaseOutcome::Fatal, detail);
                return Err(LifecycleError::ResidualUnauthorized { pids: residuals });
            }
            run.record(PhaseOutcome::Simulated, format!("would abort (exit 2): {}", detail));
        } else {
            run.record(PhaseOutcome::Ok, format!("residual processes: {}", format_pids(&residuals)));
            run.enter(LifecycleState::Reaping);
            self.reap(run, &residuals, force, dry_run)?;
        }

        run.enter(LifecycleState::Starting);
        if dry_run {
            run.record(PhaseOutcome::Simulated, format!("would launch: {}", self.spec.signature()));
            run.enter(LifecycleState::Verifying);
            run.record(
                PhaseOutcome::Simulated,
                format!(
                    "would check liveness after {}ms",
                    self.timings.verify_delay.as_millis()
                ),
            );
            return Ok(None);
        }

        let pid = match launcher::start(
            self.host,
            self.spec,
            self.store,
            self.timings.verify_delay,
            self.pacer,
        ) {
            Ok(pid) => pid,
            Err(StartError::ImmediateExit { pid }) => {
                run.record(PhaseOutcome::Ok, format!("spawned pid {}", pid));
                run.enter(LifecycleState::Verifying);
                let detail = format!("instance {} exited immediately after start", pid);
                run.record(PhaseOutcome::Fatal, detail.clone());
                return Err(LifecycleError::VerifyFailed(detail));
            }
            Err(e) => {
                run.record(PhaseOutcome::Fatal, e.to_string());
                return Err(e.into());
            }
        };
        run.record(PhaseOutcome::Ok, format!("spawned pid {}", pid));

        run.enter(LifecycleState::Verifying);
        match self.store.read() {
            Some(recorded) if recorded == pid && self.host.is_alive(pid) => {
                run.record(PhaseOutcome::Ok, format!("instance {} running", pid));
                Ok(Some(pid))
            }
            recorded => {
                let detail = match recorded {
                    None => format!("pid file missing after starting {}", pid),
                    Some(other) if other != pid => {
                        format!("pid file names {} but started {}", other, pid)
                    }
                    Some(_) => format!("instance {} not alive", pid),
                };
                run.record(PhaseOutcome::Fatal, detail.clone());
                Err(LifecycleError::VerifyFailed(detail))
            }
        }
    }

    /// Stopping phase. Returns the tracked pid if it was a live instance on
    /// entry. A handle naming a dead or foreign process is stale.
    fn stop_tracked(&self, run: &mut LifecycleRun, dry_run: bool) -> Result<Option<Pid>, LifecycleError> {
        let Some(pid) = self.store.read() else {
            run.record(PhaseOutcome::Skipped, "no process handle recorded");
            return Ok(None);
        };

        if !probe::is_instance(self.host, pid, self.spec.signature()) {
            if dry_run {
                run.record(PhaseOutcome::Simulated, format!("would clear stale handle for pid {}", pid));
            } else {
                self.store.clear()?;
                run.record(PhaseOutcome::Skipped, format!("cleared stale handle for pid {}", pid));
            }
            return Ok(None);
        }

        if dry_run {
            run.record(
                PhaseOutcome::Simulated,
                format!(
                    "would send SIGTERM to pid {} and wait up to {}s",
                    pid,
                    self.timings.stop_grace.as_secs()
                ),
            );
            return Ok(Some(pid));
        }

        match stopper::stop(
            self.host,
            pid,
            self.timings.stop_grace,
            self.timings.poll_interval,
            self.pacer,
        )? {
            StopOutcome::Stopped => {
                self.store.clear()?;
                run.record(PhaseOutcome::Ok, format!("pid {} stopped", pid));
            }
            StopOutcome::StillAlive => {
                run.record(
                    PhaseOutcome::Soft,
                    format!("stop timeout: pid {} still alive after grace period", pid),
                );
            }
        }
        Ok(Some(pid))
    }

    fn reap(
        &self,
        run: &mut LifecycleRun,
        residuals: &[Pid],
        force: bool,
        dry_run: bool,
    ) -> Result<(), LifecycleError> {
        if dry_run {
            run.record(
                PhaseOutcome::Simulated,
                format!(
                    "would send SIGTERM to {} and SIGKILL after {}s",
                    format_pids(residuals),
                    self.timings.escalation_timeout.as_secs()
                ),
            );
            return Ok(());
        }

        let Some(authorization) = ReapAuthorization::from_force_flag(force) else {
            return Err(LifecycleError::ResidualUnauthorized {
                pids: residuals.to_vec(),
            });
        };
        let survivors = reaper::reap(
            self.host,
            &authorization,
            residuals,
            self.timings.escalation_timeout,
            self.timings.poll_interval,
            self.pacer,
        )?;
        if !survivors.is_empty() {
            run.record(
                PhaseOutcome::Fatal,
                format!("processes survived SIGKILL: {}", format_pids(&survivors)),
            );
            return Err(LifecycleError::ReapSurvivor { pids: survivors });
        }
        run.record(PhaseOutcome::Ok, format!("removed {}", format_pids(residuals)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{StopSignal, SystemHost};
    use crate::testing::{sleeper_spec, stubborn_spec, unique_token, FakeHost};
    use jarvis_core::InstanceSignature;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        host: FakeHost,
        spec: LaunchSpec,
        store: PidStore,
        pacer: Pacer,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.yaml");
        std::fs::write(&config, "telegram: {}\n").unwrap();
        let spec = LaunchSpec::new(
            InstanceSignature::python_module("sh", "jarvis", &config),
            dir.path(),
        )
        .with_required_file(&config);
        let store = PidStore::new(dir.path().join("run/jarvis.pid"));
        Fixture {
            _dir: dir,
            host: FakeHost::new(),
            spec,
            store,
            pacer: Pacer::new(),
        }
    }

    fn timings() -> Timings {
        Timings {
            stop_grace: Duration::from_millis(50),
            escalation_timeout: Duration::from_millis(50),
            verify_delay: Duration::ZERO,
            poll_interval: Duration::from_millis(5),
        }
    }

    impl Fixture {
        fn run(&self, options: RunOptions) -> LifecycleRun {
            Orchestrator::new(&self.host, &self.spec, &self.store, timings(), &self.pacer).run(options)
        }

        fn running_instance(&self, ignores_term: bool) -> Pid {
            let pid = self
                .host
                .add_process(&self.spec.signature().to_string(), ignores_term);
            self.store.write(pid).unwrap();
            pid
        }

        fn visited(run: &LifecycleRun) -> Vec<LifecycleState> {
            let mut states: Vec<LifecycleState> = Vec::new();
            for phase in &run.phases {
                if states.last() != Some(&phase.state) {
                    states.push(phase.state);
                }
            }
            states
        }
    }

    fn force() -> RunOptions {
        RunOptions {
            force: true,
            ..RunOptions::default()
        }
    }

    #[test]
    fn test_restart_cooperative_instance() {
        let f = fixture();
        let old = f.running_instance(false);

        let run = f.run(RunOptions::default());

        assert!(run.succeeded(), "{:?}", run.failure);
        assert_eq!(run.exit_code(), 0);
        let new = run.final_pid.unwrap();
        assert_ne!(new, old);
        assert!(!f.host.is_alive(old));
        assert_eq!(f.store.read(), Some(new));
        assert_eq!(f.host.live_matching(f.spec.signature()), vec![new]);
        assert_eq!(
            Fixture::visited(&run),
            vec![
                LifecycleState::Stopping,
                LifecycleState::Scanning,
                LifecycleState::Starting,
                LifecycleState::Verifying
            ]
        );
    }

    #[test]
    fn test_no_handle_starts_fresh() {
        let f = fixture();
        let run = f.run(RunOptions::default());

        assert!(run.succeeded());
        assert_eq!(run.phases[0].outcome, PhaseOutcome::Skipped);
        assert_eq!(f.host.spawn_count(), 1);
    }

    #[test]
    fn test_stale_handle_is_cleared_and_fresh_instance_started() {
        let f = fixture();
        let old = f.running_instance(false);
        f.host.kill_externally(old);

        let run = f.run(RunOptions::default());

        assert!(run.succeeded());
        let new = run.final_pid.unwrap();
        assert_ne!(new, old);
        assert_eq!(f.store.read(), Some(new));
        // Nothing to signal
        assert!(f.host.signals_sent().is_empty());
    }

    #[test]
    fn test_stubborn_instance_without_force_fails_with_exit_2() {
        let f = fixture();
        let old = f.running_instance(true);

        let run = f.run(RunOptions::default());

        assert_eq!(run.state, LifecycleState::Failed);
        assert_eq!(run.exit_code(), 2);
        assert_eq!(run.residuals, vec![old]);
        assert!(f.host.is_alive(old));
        assert_eq!(f.host.spawn_count(), 0);
        assert!(run
            .phases
            .iter()
            .any(|p| p.state == LifecycleState::Stopping && p.outcome == PhaseOutcome::Soft));
        assert!(!f.host.signals_sent().iter().any(|(_, s)| *s == StopSignal::Kill));
    }

    #[test]
    fn test_stubborn_instance_with_force_is_reaped() {
        let f = fixture();
        let old = f.running_instance(true);

        let run = f.run(force());

        assert!(run.succeeded(), "{:?}", run.failure);
        assert!(!f.host.is_alive(old));
        assert!(f.host.signals_sent().contains(&(old, StopSignal::Kill)));
        assert!(Fixture::visited(&run).contains(&LifecycleState::Reaping));
        assert_eq!(f.host.live_matching(f.spec.signature()), vec![run.final_pid.unwrap()]);
    }

    #[test]
    fn test_untracked_second_instance_without_force() {
        let f = fixture();
        let tracked = f.running_instance(false);
        let manual = f.host.add_process(&f.spec.signature().to_string(), false);

        let run = f.run(RunOptions::default());

        assert_eq!(run.exit_code(), 2);
        assert_eq!(run.residuals, vec![manual]);
        assert!(!f.host.is_alive(tracked));
        assert!(f.host.is_alive(manual));
    }

    #[test]
    fn test_untracked_second_instance_with_force_leaves_exactly_one() {
        let f = fixture();
        f.running_instance(false);
        f.host.add_process(&f.spec.signature().to_string(), true);

        let run = f.run(force());

        assert!(run.succeeded());
        assert_eq!(f.host.live_matching(f.spec.signature()), vec![run.final_pid.unwrap()]);
    }

    #[test]
    fn test_reap_survivor_is_fatal() {
        let f = fixture();
        let stuck = f.host.add_unkillable(&f.spec.signature().to_string());

        let run = f.run(force());

        assert_eq!(run.state, LifecycleState::Failed);
        assert_eq!(run.exit_code(), 3);
        assert!(matches!(run.error(), Some(LifecycleError::ReapSurvivor { pids }) if pids == &vec![stuck]));
        assert_eq!(f.host.spawn_count(), 0);
    }

    #[test]
    fn test_immediate_exit_fails_verification() {
        let f = fixture();
        f.host.crash_on_spawn();

        let run = f.run(RunOptions::default());

        assert_eq!(run.exit_code(), 4);
        assert_eq!(run.phases.last().unwrap().state, LifecycleState::Verifying);
        assert_eq!(f.store.read(), None);
    }

    #[test]
    fn test_setup_error_aborts_before_mutation() {
        let f = fixture();
        let old = f.running_instance(false);
        std::fs::remove_file(f.spec.working_dir().join("config.yaml")).unwrap();

        let run = f.run(force());

        assert_eq!(run.exit_code(), 1);
        assert!(f.host.is_alive(old));
        assert!(f.host.signals_sent().is_empty());
        assert_eq!(f.store.read(), Some(old));
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let f = fixture();
        let tracked = f.running_instance(true);
        let manual = f.host.add_process(&f.spec.signature().to_string(), false);
        let before = std::fs::read(f.store.path()).unwrap();

        let run = f.run(RunOptions {
            delay_secs: 3600,
            force: true,
            dry_run: true,
        });

        assert!(run.succeeded());
        assert_eq!(run.exit_code(), 0);
        assert!(f.host.signals_sent().is_empty());
        assert_eq!(f.host.spawn_count(), 0);
        assert!(f.host.is_alive(tracked) && f.host.is_alive(manual));
        assert_eq!(std::fs::read(f.store.path()).unwrap(), before);
        assert_eq!(run.residuals, vec![manual]);
        assert!(run
            .phases
            .iter()
            .all(|p| matches!(p.outcome, PhaseOutcome::Simulated | PhaseOutcome::Ok)));
        assert_eq!(
            Fixture::visited(&run),
            vec![
                LifecycleState::Delaying,
                LifecycleState::Stopping,
                LifecycleState::Scanning,
                LifecycleState::Reaping,
                LifecycleState::Starting,
                LifecycleState::Verifying
            ]
        );
    }

    #[test]
    fn test_dry_run_succeeds_even_when_real_run_would_fail() {
        let f = fixture();
        f.host.add_process(&f.spec.signature().to_string(), false);
        let stale = Pid::new(77).unwrap();
        f.store.write(stale).unwrap();
        std::fs::remove_file(f.spec.working_dir().join("config.yaml")).unwrap();

        let run = f.run(RunOptions {
            dry_run: true,
            ..RunOptions::default()
        });

        assert!(run.succeeded());
        assert_eq!(f.store.read(), Some(stale));
        assert!(run.phases.iter().any(|p| p.detail.contains("would abort (exit 2)")));
    }

    #[test]
    fn test_reused_pid_in_handle_is_never_signalled() {
        let f = fixture();
        let stranger = f.host.add_process("sleep 30", false);
        f.store.write(stranger).unwrap();

        let run = f.run(force());

        assert!(run.succeeded(), "{:?}", run.failure);
        assert!(f.host.is_alive(stranger));
        assert!(!f.host.signals_sent().iter().any(|(pid, _)| *pid == stranger));
        assert!(run.residuals.is_empty());
        assert_eq!(f.store.read(), run.final_pid);
    }

    #[test]
    fn test_dry_run_tolerates_scan_failure() {
        let f = fixture();
        f.running_instance(false);
        f.host.fail_listing();

        let run = f.run(RunOptions {
            dry_run: true,
            ..RunOptions::default()
        });

        assert!(run.succeeded(), "{:?}", run.failure);
        assert_eq!(run.exit_code(), 0);
        assert!(run
            .phases
            .iter()
            .any(|p| p.state == LifecycleState::Scanning && p.outcome == PhaseOutcome::Soft));
        assert!(f.host.signals_sent().is_empty());
    }

    #[test]
    fn test_scan_failure_is_fatal_outside_dry_run() {
        let f = fixture();
        f.host.fail_listing();

        let run = f.run(RunOptions::default());

        assert_eq!(run.state, LifecycleState::Failed);
        assert_eq!(run.exit_code(), 1);
        assert_eq!(f.host.spawn_count(), 0);
    }

    #[test]
    fn test_instance_ignoring_sigterm_needs_force_on_next_run() {
        let f = fixture();
        f.host.spawned_ignore_term();
        let first = f.run(RunOptions::default()).final_pid.unwrap();

        let blocked = f.run(RunOptions::default());
        assert_eq!(blocked.exit_code(), 2);
        assert_eq!(blocked.residuals, vec![first]);
        assert!(f.host.is_alive(first));

        let forced = f.run(force());
        assert!(forced.succeeded(), "{:?}", forced.failure);
        assert!(!f.host.is_alive(first));
        assert!(f.host.signals_sent().contains(&(first, StopSignal::Kill)));
        assert_eq!(f.host.live_matching(f.spec.signature()), vec![forced.final_pid.unwrap()]);
    }

    fn real_timings() -> Timings {
        Timings {
            stop_grace: Duration::from_millis(300),
            escalation_timeout: Duration::from_millis(300),
            verify_delay: Duration::from_millis(200),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn kill_matching(host: &SystemHost, signature: &InstanceSignature) {
        for pid in scanner::find_residual(host, signature, None).unwrap() {
            let _ = host.signal(pid, StopSignal::Kill);
        }
    }

    #[test]
    fn test_real_second_instance_without_force_exits_2() {
        let host = SystemHost::new();
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path().join("run/jarvis.pid"));
        let spec = sleeper_spec(dir.path(), &unique_token());
        let pacer = Pacer::new();
        let tracked = launcher::start(&host, &spec, &store, Duration::from_millis(200), &pacer).unwrap();
        let manual = host.spawn_detached(&spec).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let run = Orchestrator::new(&host, &spec, &store, real_timings(), &pacer).run(RunOptions::default());

        assert_eq!(run.exit_code(), 2, "{:?}", run.failure);
        assert_eq!(run.residuals, vec![manual]);
        assert!(!host.is_alive(tracked));
        assert!(host.is_alive(manual));
        assert_eq!(scanner::find_residual(&host, spec.signature(), None).unwrap(), vec![manual]);

        kill_matching(&host, spec.signature());
    }

    #[test]
    fn test_real_stubborn_instance_without_force_survives() {
        let host = SystemHost::new();
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path().join("run/jarvis.pid"));
        let spec = stubborn_spec(dir.path(), &unique_token());
        let pacer = Pacer::new();
        let tracked = launcher::start(&host, &spec, &store, Duration::from_millis(200), &pacer).unwrap();

        let run = Orchestrator::new(&host, &spec, &store, real_timings(), &pacer).run(RunOptions::default());

        assert_eq!(run.exit_code(), 2, "{:?}", run.failure);
        assert_eq!(run.residuals, vec![tracked]);
        assert!(host.is_alive(tracked));
        assert_eq!(scanner::find_residual(&host, spec.signature(), None).unwrap(), vec![tracked]);

        kill_matching(&host, spec.signature());
    }

    #[test]
    fn test_real_force_leaves_exactly_one_instance() {
        let host = SystemHost::new();
        let dir = tempfile::tempdir().unwrap();
        let store = PidStore::new(dir.path().join("run/jarvis.pid"));
        let spec = stubborn_spec(dir.path(), &unique_token());
        let pacer = Pacer::new();
        let tracked = launcher::start(&host, &spec, &store, Duration::from_millis(200), &pacer).unwrap();
        let manual = host.spawn_detached(&spec).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        let run = Orchestrator::new(&host, &spec, &store, real_timings(), &pacer).run(force());

        assert!(run.succeeded(), "{:?}", run.failure);
        let new = run.final_pid.unwrap();
        assert!(!host.is_alive(tracked));
        assert!(!host.is_alive(manual));
        assert_eq!(store.read(), Some(new));
        assert_eq!(scanner::find_residual(&host, spec.signature(), None).unwrap(), vec![new]);

        kill_matching(&host, spec.signature());
    }

    #[test]
    fn test_interrupt_during_delay_skips_remaining_phases() {
        let f = fixture();
        let old = f.running_instance(false);
        f.pacer.interrupt();

        let run = f.run(RunOptions {
            delay_secs: 60,
            ..RunOptions::default()
        });

        assert_eq!(run.exit_code(), 130);
        assert!(f.host.is_alive(old));
        assert_eq!(f.store.read(), Some(old));
        assert_eq!(f.host.spawn_count(), 0);
    }

    #[test]
    fn test_run_serializes_to_json() {
        let f = fixture();
        let run = f.run(RunOptions::default());
        let json = serde_json::to_value(&run).unwrap();

        assert_eq!(json["state"], "done");
        assert_eq!(json["options"]["force"], false);
        assert!(json["final_pid"].is_u64());
    }
}
