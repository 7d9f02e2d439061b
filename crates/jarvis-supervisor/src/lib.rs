//! Process lifecycle supervision for Jarvis deployments.
//!
//! This crate replaces the run/stop/restart-clean scripts of a deployment:
//! - **probe**: liveness of a pid via the null signal, and whether a live
//!   pid still runs the instance
//! - **stopper**: SIGTERM and a bounded wait, never escalating
//! - **scanner**: processes matching the instance signature that the
//!   handle does not account for
//! - **reaper**: SIGTERM, then SIGKILL, only with explicit authorization
//! - **launcher**: detached spawn, pid recording, post-start check
//! - **orchestrator**: the clean-restart state machine
//! - **control**: plain start/stop/restart/status
//! - **smoke**: one-shot launch-and-stop check
//! - **unit**: systemd unit rendering
//!
//! # Example
//!
//! ```no_run
//! use jarvis_core::DeploymentConfig;
//! use jarvis_persistence::PidStore;
//! use jarvis_supervisor::{LaunchSpec, Orchestrator, Pacer, RunOptions, SystemHost};
//!
//! let config = DeploymentConfig::load(None).unwrap();
//! let host = SystemHost::new();
//! let spec = LaunchSpec::from_config(&config);
//! let store = PidStore::new(config.pid_file());
//! let pacer = Pacer::with_signal_handlers().unwrap();
//!
//! let run = Orchestrator::new(&host, &spec, &store, config.timings(), &pacer)
//!     .run(RunOptions { force: true, ..RunOptions::default() });
//! std::process::exit(run.exit_code());
//! ```

pub mod control;
pub mod error;
pub mod host;
pub mod launcher;
pub mod orchestrator;
pub mod pacer;
pub mod probe;
pub mod reaper;
pub mod scanner;
pub mod smoke;
pub mod stopper;
pub mod unit;

#[cfg(test)]
pub(crate) mod testing;

pub use control::{InstanceStatus, RestartReport, StartReport, StatusReport, StopReport};
pub use error::{LifecycleError, Result, StartError, SupervisorError};
pub use host::{ProcessEntry, ProcessHost, StopSignal, SystemHost};
pub use launcher::LaunchSpec;
pub use orchestrator::{LifecycleRun, LifecycleState, Orchestrator, PhaseOutcome, PhaseRecord, RunOptions};
pub use pacer::Pacer;
pub use reaper::ReapAuthorization;
pub use smoke::SmokeReport;
pub use stopper::StopOutcome;
pub use unit::{render_unit, UnitSpec};
