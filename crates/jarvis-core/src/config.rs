//! Deployment configuration for jarvisctl.
//!
//! Every Jarvis deployment lives under a single root directory:
//!
//! ```text
//! <root>/
//! ├── .env.local    # Secrets and overrides (optional)
//! ├── .venv/        # Python virtualenv (optional)
//! ├── config.yaml   # Assistant configuration
//! ├── logs/
//! │   └── jarvis.out   # stdout/stderr of detached instances
//! └── run/
//!     └── jarvis.pid   # Process handle of the running instance
//! ```
//!
//! # Environment Variables
//!
//! - `JARVIS_ROOT`: Deployment root (default: current directory)
//! - `JARVIS_PYTHON`: Interpreter (default: `<root>/.venv/bin/python` or `python3`)
//! - `JARVIS_MODULE`: Module entry point (default: `jarvis`)
//! - `JARVIS_CONFIG`: Assistant config path (default: `<root>/config.yaml`)
//! - `JARVIS_STOP_GRACE_SECS`: Grace period for `stop` (default: 10)
//! - `JARVIS_ESCALATION_SECS`: Wait before SIGKILL when reaping (default: 5)
//! - `JARVIS_VERIFY_DELAY_MS`: Wait before the post-start liveness check (default: 1000)
//! - `JARVIS_POLL_INTERVAL_MS`: Liveness polling interval (default: 200)
//!
//! Variables may also be set in `<root>/.env.local`; real environment
//! variables take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::signature::InstanceSignature;

/// Environment variable for the deployment root.
pub const ROOT_ENV: &str = "JARVIS_ROOT";

/// Environment variable for the interpreter.
pub const PYTHON_ENV: &str = "JARVIS_PYTHON";

/// Environment variable for the module entry point.
pub const MODULE_ENV: &str = "JARVIS_MODULE";

/// Environment variable for the assistant config path.
pub const CONFIG_ENV: &str = "JARVIS_CONFIG";

pub const STOP_GRACE_ENV: &str = "JARVIS_STOP_GRACE_SECS";
pub const ESCALATION_ENV: &str = "JARVIS_ESCALATION_SECS";
pub const VERIFY_DELAY_ENV: &str = "JARVIS_VERIFY_DELAY_MS";
pub const POLL_INTERVAL_ENV: &str = "JARVIS_POLL_INTERVAL_MS";

const DEFAULT_MODULE: &str = "jarvis";
const DEFAULT_INTERPRETER: &str = "python3";
const DEFAULT_CONFIG_FILE: &str = "config.yaml";

const VENV_PYTHON: &str = ".venv/bin/python";
const ENV_FILE: &str = ".env.local";
const PID_FILE: &str = "run/jarvis.pid";
const OUTPUT_LOG: &str = "logs/jarvis.out";

/// Wait and polling intervals used by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long `stop` waits after SIGTERM before escalating.
    pub stop_grace: Duration,
    /// How long the reaper waits after SIGTERM before SIGKILL.
    pub escalation_timeout: Duration,
    /// Delay between spawn and the single post-start liveness check.
    pub verify_delay: Duration,
    /// Interval between liveness probes while waiting for exit.
    pub poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(10),
            escalation_timeout: Duration::from_secs(5),
            verify_delay: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(200),
        }
    }
}

/// Resolved configuration of one deployment root.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    root: PathBuf,
    interpreter: String,
    module: String,
    config_path: PathBuf,
    timings: Timings,
}

impl DeploymentConfig {
    /// Load configuration for a deployment root.
    ///
    /// `root` defaults to the current directory. `~` is expanded.
    /// `<root>/.env.local` is loaded before environment overrides are read.
    ///
    /// # Errors
    /// Returns an error if the root does not exist, the env file is
    /// malformed, or an override cannot be parsed.
    pub fn load(root: Option<&Path>) -> Result<Self> {
        let root = resolve_root(root)?;

        let env_path = root.join(ENV_FILE);
        if env_path.exists() {
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::EnvFile {
                path: env_path.clone(),
                message: e.to_string(),
            })?;
            tracing::debug!(path = %env_path.display(), "Loaded env file");
        }

        Self::from_lookup(root, |key| std::env::var(key).ok())
    }

    /// Build configuration from an explicit root and a variable lookup.
    pub fn from_lookup<F>(root: PathBuf, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interpreter = lookup(PYTHON_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(|v| expand(&v))
            .unwrap_or_else(|| {
                let venv = root.join(VENV_PYTHON);
                if venv.exists() {
                    venv.display().to_string()
                } else {
                    DEFAULT_INTERPRETER.to_string()
                }
            });

        let module = lookup(MODULE_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODULE.to_string());

        let config_path = lookup(CONFIG_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(|v| absolutize(&root, PathBuf::from(expand(&v))))
            .unwrap_or_else(|| root.join(DEFAULT_CONFIG_FILE));

        let defaults = Timings::default();
        let timings = Timings {
            stop_grace: duration_var(&lookup, STOP_GRACE_ENV, Duration::from_secs)?
                .unwrap_or(defaults.stop_grace),
            escalation_timeout: duration_var(&lookup, ESCALATION_ENV, Duration::from_secs)?
                .unwrap_or(defaults.escalation_timeout),
            verify_delay: duration_var(&lookup, VERIFY_DELAY_ENV, Duration::from_millis)?
                .unwrap_or(defaults.verify_delay),
            poll_interval: duration_var(&lookup, POLL_INTERVAL_ENV, Duration::from_millis)?
                .unwrap_or(defaults.poll_interval),
        };

        Ok(Self {
            root,
            interpreter,
            module,
            config_path,
            timings,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Path of the assistant's `config.yaml`.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// Override the timings, e.g. from command-line flags.
    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Get the process handle file path.
    pub fn pid_file(&self) -> PathBuf {
        self.root.join(PID_FILE)
    }

    /// Get the file that receives stdout/stderr of detached instances.
    pub fn output_log(&self) -> PathBuf {
        self.root.join(OUTPUT_LOG)
    }

    /// Get the `.env.local` path.
    pub fn env_file(&self) -> PathBuf {
        self.root.join(ENV_FILE)
    }

    /// The invocation that launches and identifies this deployment's instance.
    pub fn signature(&self) -> InstanceSignature {
        InstanceSignature::python_module(&self.interpreter, &self.module, &self.config_path)
    }
}

fn resolve_root(root: Option<&Path>) -> Result<PathBuf> {
    let root = match root {
        Some(path) => PathBuf::from(expand(&path.to_string_lossy())),
        None => std::env::current_dir()?,
    };
    if !root.is_dir() {
        return Err(ConfigError::RootNotFound(root));
    }
    Ok(root.canonicalize().unwrap_or(root))
}

fn expand(value: &str) -> String {
    shellexpand::tilde(value.trim()).into_owned()
}

fn absolutize(root: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}

fn duration_var<F>(lookup: &F, key: &str, unit: fn(u64) -> Duration) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(|n| Some(unit(n)))
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}
