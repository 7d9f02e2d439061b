//! Instance signature: the argv that launches a Jarvis instance and
//! identifies it in the process table.

use std::fmt;
use std::path::Path;

use serde::Serialize;

/// Exact invocation of a service instance.
///
/// The same value is used to spawn the process and to recognise it later,
/// so an instance started by the launcher always matches its own signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceSignature {
    program: String,
    args: Vec<String>,
}

impl InstanceSignature {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `<interpreter> -m <module> --config <config>`.
    pub fn python_module(interpreter: &str, module: &str, config: &Path) -> Self {
        Self::new(
            interpreter,
            vec![
                "-m".to_string(),
                module.to_string(),
                "--config".to_string(),
                config.display().to_string(),
            ],
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Whether a space-joined command line belongs to this instance.
    ///
    /// Substring match, so wrappers such as `nohup` or `setsid` in front of
    /// the interpreter still count. The match must end at an argument
    /// boundary: `--config /a/config.yaml` does not match
    /// `--config /a/config.yaml.bak`.
    pub fn matches(&self, command_line: &str) -> bool {
        if self.program.is_empty() {
            return false;
        }
        let needle = self.to_string();
        command_line.match_indices(&needle).any(|(start, _)| {
            command_line[start + needle.len()..]
                .chars()
                .next()
                .map_or(true, char::is_whitespace)
        })
    }
}

impl fmt::Display for InstanceSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
