//! systemd unit rendering.
//!
//! Under systemd the instance runs in the foreground and systemd owns the
//! lifecycle, so the rendered unit uses the same signature the supervisor
//! launches, with the interpreter resolved to an absolute path.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jarvis_core::DeploymentConfig;

use crate::error::StartError;

/// Inputs for a `.service` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    pub description: String,
    /// Absolute program followed by its arguments.
    pub exec_start: Vec<String>,
    pub working_dir: PathBuf,
    pub env_file: PathBuf,
    pub user: Option<String>,
    pub stop_timeout: Duration,
}

impl UnitSpec {
    /// Build a unit for `config`, running as `user` if given.
    ///
    /// # Errors
    /// [`StartError::Setup`] if the interpreter cannot be resolved.
    pub fn from_config(config: &DeploymentConfig, user: Option<String>) -> Result<Self, StartError> {
        let signature = config.signature();
        let program = resolve_program(signature.program(), config.root())?;

        let mut exec_start = vec![program.display().to_string()];
        exec_start.extend(signature.args().iter().cloned());

        Ok(Self {
            description: "Jarvis Telegram assistant".to_string(),
            exec_start,
            working_dir: config.root().to_path_buf(),
            env_file: config.env_file(),
            user,
            stop_timeout: config.timings().stop_grace,
        })
    }
}

fn resolve_program(program: &str, root: &Path) -> Result<PathBuf, StartError> {
    if program.contains('/') {
        let path = Path::new(program);
        return Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        });
    }
    which::which(program)
        .map_err(|e| StartError::Setup(format!("cannot resolve {} for ExecStart: {}", program, e)))
}

/// Render the `.service` file.
pub fn render_unit(spec: &UnitSpec) -> String {
    let exec_start = spec
        .exec_start
        .iter()
        .map(|arg| quote_arg(arg))
        .collect::<Vec<_>>()
        .join(" ");

    let mut out = String::new();
    let _ = writeln!(out, "[Unit]");
    let _ = writeln!(out, "Description={}", spec.description);
    let _ = writeln!(out, "After=network-online.target");
    let _ = writeln!(out, "Wants=network-online.target");
    let _ = writeln!(out);
    let _ = writeln!(out, "[Service]");
    let _ = writeln!(out, "Type=simple");
    if let Some(user) = &spec.user {
        let _ = writeln!(out, "User={}", user);
    }
    let _ = writeln!(out, "WorkingDirectory={}", quote_arg(&spec.working_dir.display().to_string()));
    let _ = writeln!(out, "EnvironmentFile=-{}", spec.env_file.display());
    let _ = writeln!(out, "Environment=PYTHONUNBUFFERED=1");
    let _ = writeln!(out, "ExecStart={}", exec_start);
    let _ = writeln!(out, "Restart=on-failure");
    let _ = writeln!(out, "RestartSec=5");
    let _ = writeln!(out, "KillSignal=SIGTERM");
    let _ = writeln!(out, "TimeoutStopSec={}", spec.stop_timeout.as_secs().max(1));
    let _ = writeln!(out);
    let _ = writeln!(out, "[Install]");
    let _ = writeln!(out, "WantedBy=multi-user.target");
    out
}

/// Quote one argument for systemd command-line parsing.
///
/// `%` and `$` are specifier/variable prefixes and are doubled; arguments
/// containing whitespace or quotes are wrapped in double quotes.
fn quote_arg(arg: &str) -> String {
    let escaped = arg.replace('%', "%%").replace('$', "$$");
    if !escaped.is_empty() && !escaped.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '\\') {
        return escaped;
    }
    let mut quoted = String::with_capacity(escaped.len() + 2);
    quoted.push('"');
    for c in escaped.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
