//! Error types for lifecycle supervision.

use jarvis_core::Pid;
use jarvis_persistence::PersistenceError;
use thiserror::Error;

/// Errors raised by the process host and the individual lifecycle steps.
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// The supervisor itself received SIGINT/SIGTERM/SIGHUP during a wait.
    #[error("interrupted by signal")]
    Interrupted,

    /// A signal could not be delivered for a reason other than the
    /// process being gone.
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: Pid,
        #[source]
        source: nix::errno::Errno,
    },

    /// The process table could not be enumerated.
    #[error("failed to list processes: {0}")]
    ProcessList(String),

    /// The instance could not be spawned.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process handle could not be written or cleared.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from launching a new instance.
#[derive(Error, Debug)]
pub enum StartError {
    /// A launch prerequisite is missing. Nothing was changed.
    #[error("setup error: {0}")]
    Setup(String),

    /// The instance was spawned but was gone at the post-start check.
    #[error("instance {pid} exited immediately after start")]
    ImmediateExit { pid: Pid },

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Fatal outcomes of a lifecycle command, each with its own exit code.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Missing launcher dependency; aborted before any mutation.
    #[error("setup error: {0}")]
    Setup(String),

    /// Matching processes remain and removal was not authorized.
    #[error("residual processes present, not authorized to remove (use --force): {}", format_pids(.pids))]
    ResidualUnauthorized { pids: Vec<Pid> },

    /// Processes survived SIGKILL.
    #[error("processes survived SIGKILL: {}", format_pids(.pids))]
    ReapSurvivor { pids: Vec<Pid> },

    /// The new instance could not be confirmed running.
    #[error("post-start verification failed: {0}")]
    VerifyFailed(String),

    /// The supervisor was signalled; remaining phases were skipped.
    #[error("interrupted by signal; remaining phases skipped")]
    Interrupted,

    /// Unexpected host failure (process table, pid file, spawn).
    #[error(transparent)]
    Host(SupervisorError),
}

impl LifecycleError {
    /// Process exit code reported to the operator.
    pub fn exit_code(&self) -> i32 {
        match self {
            LifecycleError::Setup(_) => 1,
            LifecycleError::ResidualUnauthorized { .. } => 2,
            LifecycleError::ReapSurvivor { .. } => 3,
            LifecycleError::VerifyFailed(_) => 4,
            LifecycleError::Interrupted => 130,
            LifecycleError::Host(_) => 1,
        }
    }
}

impl From<SupervisorError> for LifecycleError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Interrupted => LifecycleError::Interrupted,
            other => LifecycleError::Host(other),
        }
    }
}

impl From<PersistenceError> for LifecycleError {
    fn from(err: PersistenceError) -> Self {
        LifecycleError::Host(SupervisorError::Persistence(err))
    }
}

impl From<StartError> for LifecycleError {
    fn from(err: StartError) -> Self {
        match err {
            StartError::Setup(msg) => LifecycleError::Setup(msg),
            StartError::ImmediateExit { pid } => {
                LifecycleError::VerifyFailed(format!("instance {} exited immediately after start", pid))
            }
            StartError::Supervisor(e) => e.into(),
        }
    }
}

pub(crate) fn format_pids(pids: &[Pid]) -> String {
    pids.iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;
