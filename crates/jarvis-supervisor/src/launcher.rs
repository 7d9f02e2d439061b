//! Launching new instances.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jarvis_core::{DeploymentConfig, InstanceSignature, Pid};
use jarvis_persistence::PidStore;
use tracing::{info, warn};

use crate::error::{StartError, SupervisorError};
use crate::host::ProcessHost;
use crate::pacer::Pacer;

/// Everything needed to spawn one instance.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    signature: InstanceSignature,
    working_dir: PathBuf,
    output_log: Option<PathBuf>,
    required_files: Vec<PathBuf>,
}

impl LaunchSpec {
    pub fn new(signature: InstanceSignature, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            signature,
            working_dir: working_dir.into(),
            output_log: None,
            required_files: Vec::new(),
        }
    }

    /// Launch spec for a deployment: its signature, run from the root,
    /// output appended to `logs/jarvis.out`, config file required.
    pub fn from_config(config: &DeploymentConfig) -> Self {
        Self::new(config.signature(), config.root())
            .with_output_log(config.output_log())
            .with_required_file(config.config_path())
    }

    pub fn with_output_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_log = Some(path.into());
        self
    }

    pub fn with_required_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.required_files.push(path.into());
        self
    }

    pub fn signature(&self) -> &InstanceSignature {
        &self.signature
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn output_log(&self) -> Option<&Path> {
        self.output_log.as_deref()
    }

    /// Check launch prerequisites without touching anything.
    ///
    /// # Errors
    /// [`StartError::Setup`] naming the first missing prerequisite.
    pub fn verify(&self) -> Result<(), StartError> {
        if !self.working_dir.is_dir() {
            return Err(StartError::Setup(format!(
                "working directory not found: {}",
                self.working_dir.display()
            )));
        }

        let program = self.signature.program();
        if program.contains('/') {
            let path = Path::new(program);
            let path = if path.is_absolute() {
                path.to_path_buf()
            } else {
                self.working_dir.join(path)
            };
            if !path.is_file() {
                return Err(StartError::Setup(format!("interpreter not found: {}", path.display())));
            }
        } else if which::which(program).is_err() {
            return Err(StartError::Setup(format!("interpreter not found in PATH: {}", program)));
        }

        if let Some(missing) = self.required_files.iter().find(|f| !f.is_file()) {
            return Err(StartError::Setup(format!("required file not found: {}", missing.display())));
        }

        Ok(())
    }
}

/// Spawn an instance, record its pid and confirm it survived startup.
///
/// Sleeps `verify_delay` after spawning, then checks liveness once. If the
/// instance is already gone the handle is cleared so it never points at a
/// dead process.
///
/// # Errors
/// - [`StartError::ImmediateExit`] if the instance died during `verify_delay`
/// - [`StartError::Supervisor`] if spawning or recording the handle failed,
///   or the wait was interrupted (the handle is left as-is)
pub fn start<H: ProcessHost + ?Sized>(
    host: &H,
    spec: &LaunchSpec,
    store: &PidStore,
    verify_delay: Duration,
    pacer: &Pacer,
) -> Result<Pid, StartError> {
    pacer.check()?;

    let pid = host.spawn_detached(spec)?;
    info!(pid = %pid, signature = %spec.signature(), "Spawned instance");

    if let Err(e) = store.write(pid) {
        warn!(pid = %pid, error = %e, "Instance running but pid file could not be written");
        return Err(SupervisorError::from(e).into());
    }

    pacer.pause(verify_delay)?;

    if !host.is_alive(pid) {
        warn!(pid = %pid, "Instance exited immediately after start");
        if let Err(e) = store.clear() {
            warn!(error = %e, "Failed to clear pid file of dead instance");
        }
        return Err(StartError::ImmediateExit { pid });
    }

    Ok(pid)
}
