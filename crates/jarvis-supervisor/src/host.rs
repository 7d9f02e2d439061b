//! Operating-system seam for the supervisor.
//!
//! All process-table access goes through [`ProcessHost`] so the lifecycle
//! logic can be exercised against an in-memory table in tests.
//! [`SystemHost`] is the real implementation.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use jarvis_core::Pid;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;
use tracing::{debug, trace};

use crate::error::{Result, SupervisorError};
use crate::launcher::LaunchSpec;
use crate::probe;

/// Termination signals the supervisor sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM: ask the process to shut down.
    Terminate,
    /// SIGKILL: cannot be caught or ignored.
    Kill,
}

impl StopSignal {
    fn as_nix(self) -> Signal {
        match self {
            StopSignal::Terminate => Signal::SIGTERM,
            StopSignal::Kill => Signal::SIGKILL,
        }
    }
}

/// One row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: Pid,
    /// Space-joined argv.
    pub command: String,
}

/// Process-table operations used by the lifecycle steps.
pub trait ProcessHost {
    /// Pid of the supervisor itself, never reported as a residual.
    fn own_pid(&self) -> Pid;

    /// Whether `pid` is a live process. Never fails.
    fn is_alive(&self, pid: Pid) -> bool;

    /// Deliver `signal` to `pid`.
    ///
    /// Returns `Ok(false)` when no such process exists.
    fn signal(&self, pid: Pid, signal: StopSignal) -> Result<bool>;

    /// Snapshot of the process table.
    fn processes(&self) -> Result<Vec<ProcessEntry>>;

    /// Space-joined argv of `pid`, or `None` if it cannot be read.
    fn command_line(&self, pid: Pid) -> Option<String>;

    /// Start `spec` in its own session so it outlives the supervisor.
    fn spawn_detached(&self, spec: &LaunchSpec) -> Result<Pid>;
}

/// [`ProcessHost`] backed by the running kernel.
///
/// Children spawned through this host are kept so they can be reaped;
/// otherwise an instance that crashes on start would linger as a zombie
/// and still answer the null signal.
#[derive(Debug, Default)]
pub struct SystemHost {
    children: Mutex<HashMap<Pid, Child>>,
}

impl SystemHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Some(alive)` if `pid` is one of our children.
    fn child_alive(&self, pid: Pid) -> Option<bool> {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        let child = children.get_mut(&pid)?;
        match child.try_wait() {
            Ok(None) => Some(true),
            Ok(Some(status)) => {
                debug!(pid = %pid, status = %status, "Reaped child");
                children.remove(&pid);
                Some(false)
            }
            Err(_) => None,
        }
    }
}

impl ProcessHost for SystemHost {
    fn own_pid(&self) -> Pid {
        Pid::current()
    }

    fn is_alive(&self, pid: Pid) -> bool {
        self.child_alive(pid).unwrap_or_else(|| probe::is_alive(pid))
    }

    fn signal(&self, pid: Pid, signal: StopSignal) -> Result<bool> {
        let Some(raw) = pid.as_raw() else {
            return Ok(false);
        };
        trace!(pid = %pid, signal = ?signal, "Sending signal");
        match kill(NixPid::from_raw(raw), signal.as_nix()) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(source) => Err(SupervisorError::Signal { pid, source }),
        }
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        list_processes()
    }

    fn command_line(&self, pid: Pid) -> Option<String> {
        read_command_line(pid)
    }

    fn spawn_detached(&self, spec: &LaunchSpec) -> Result<Pid> {
        let signature = spec.signature();
        let mut cmd = Command::new(signature.program());
        cmd.args(signature.args())
            .current_dir(spec.working_dir())
            .stdin(Stdio::null());

        match spec.output_log() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let log = OpenOptions::new().create(true).append(true).open(path)?;
                cmd.stdout(log.try_clone()?).stderr(log);
            }
            None => {
                cmd.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }

        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()?;
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: signature.program().to_string(),
            source,
        })?;
        let pid = Pid::new(child.id())
            .ok_or_else(|| SupervisorError::ProcessList("spawn returned pid 0".to_string()))?;

        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pid, child);
        Ok(pid)
    }
}

/// Enumerate processes from `/proc`.
#[cfg(target_os = "linux")]
fn list_processes() -> Result<Vec<ProcessEntry>> {
    let entries = std::fs::read_dir("/proc")
        .map_err(|e| SupervisorError::ProcessList(format!("/proc: {}", e)))?;

    let mut processes = Vec::new();
    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<Pid>().ok()) else {
            continue;
        };
        // Processes can exit between readdir and read
        if let Some(command) = read_command_line(pid) {
            processes.push(ProcessEntry { pid, command });
        }
    }
    Ok(processes)
}

/// `/proc/<pid>/cmdline` with NULs turned into spaces. Kernel threads have
/// an empty cmdline and yield `None`.
#[cfg(target_os = "linux")]
fn read_command_line(pid: Pid) -> Option<String> {
    let raw = std::fs::read(format!("/proc/{}/cmdline", pid)).ok()?;
    let command = raw
        .split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    (!command.is_empty()).then_some(command)
}

/// Enumerate processes with `ps`.
#[cfg(not(target_os = "linux"))]
fn list_processes() -> Result<Vec<ProcessEntry>> {
    let output = Command::new("ps")
        .args(["-axo", "pid=,command="])
        .output()
        .map_err(|e| SupervisorError::ProcessList(format!("ps: {}", e)))?;
    if !output.status.success() {
        return Err(SupervisorError::ProcessList(format!(
            "ps exited with {}",
            output.status
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let (pid, command) = line.split_once(char::is_whitespace)?;
            Some(ProcessEntry {
                pid: pid.parse().ok()?,
                command: command.trim().to_string(),
            })
        })
        .collect())
}

#[cfg(not(target_os = "linux"))]
fn read_command_line(pid: Pid) -> Option<String> {
    let output = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", "command="])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let command = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!command.is_empty()).then_some(command)
}
