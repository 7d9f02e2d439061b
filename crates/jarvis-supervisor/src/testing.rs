//! Test support: an in-memory process table and real-process fixtures.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use jarvis_core::{InstanceSignature, Pid};

use crate::error::{Result, SupervisorError};
use crate::host::{ProcessEntry, ProcessHost, StopSignal};
use crate::launcher::LaunchSpec;

#[derive(Debug)]
struct FakeProc {
    command: String,
    ignores_term: bool,
    unkillable: bool,
}

#[derive(Debug)]
struct FakeState {
    procs: BTreeMap<Pid, FakeProc>,
    next_pid: u32,
    signals: Vec<(Pid, StopSignal)>,
    spawns: u32,
    crash_on_spawn: bool,
    spawned_ignore_term: bool,
    listing_fails: bool,
}

/// Deterministic [`ProcessHost`] for state-machine tests.
#[derive(Debug)]
pub(crate) struct FakeHost {
    state: RefCell<FakeState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(FakeState {
                procs: BTreeMap::new(),
                next_pid: 1000,
                signals: Vec::new(),
                spawns: 0,
                crash_on_spawn: false,
                spawned_ignore_term: false,
                listing_fails: false,
            }),
        }
    }

    fn insert(&self, command: &str, ignores_term: bool, unkillable: bool) -> Pid {
        let mut state = self.state.borrow_mut();
        state.next_pid += 1;
        let pid = Pid::new(state.next_pid).unwrap();
        state.procs.insert(
            pid,
            FakeProc {
                command: command.to_string(),
                ignores_term,
                unkillable,
            },
        );
        pid
    }

    pub fn add_process(&self, command: &str, ignores_term: bool) -> Pid {
        self.insert(command, ignores_term, false)
    }

    pub fn add_unkillable(&self, command: &str) -> Pid {
        self.insert(command, true, true)
    }

    pub fn add_entry(&self, pid: Pid, command: &str) {
        self.state.borrow_mut().procs.insert(
            pid,
            FakeProc {
                command: command.to_string(),
                ignores_term: false,
                unkillable: false,
            },
        );
    }

    /// Simulate a process dying outside the supervisor's control.
    pub fn kill_externally(&self, pid: Pid) {
        self.state.borrow_mut().procs.remove(&pid);
    }

    /// Spawned instances die before the post-start check.
    pub fn crash_on_spawn(&self) {
        self.state.borrow_mut().crash_on_spawn = true;
    }

    /// Spawned instances ignore SIGTERM.
    pub fn spawned_ignore_term(&self) {
        self.state.borrow_mut().spawned_ignore_term = true;
    }

    /// `processes()` fails from now on.
    pub fn fail_listing(&self) {
        self.state.borrow_mut().listing_fails = true;
    }

    pub fn signals_sent(&self) -> Vec<(Pid, StopSignal)> {
        self.state.borrow().signals.clone()
    }

    pub fn spawn_count(&self) -> u32 {
        self.state.borrow().spawns
    }

    pub fn live_matching(&self, signature: &InstanceSignature) -> Vec<Pid> {
        self.state
            .borrow()
            .procs
            .iter()
            .filter(|(_, p)| signature.matches(&p.command))
            .map(|(pid, _)| *pid)
            .collect()
    }
}

impl ProcessHost for FakeHost {
    fn own_pid(&self) -> Pid {
        Pid::new(1).unwrap()
    }

    fn is_alive(&self, pid: Pid) -> bool {
        self.state.borrow().procs.contains_key(&pid)
    }

    fn signal(&self, pid: Pid, signal: StopSignal) -> Result<bool> {
        let mut state = self.state.borrow_mut();
        let Some(entry) = state.procs.get(&pid) else {
            return Ok(false);
        };
        let dies = match signal {
            StopSignal::Terminate => !entry.ignores_term && !entry.unkillable,
            StopSignal::Kill => !entry.unkillable,
        };
        if dies {
            state.procs.remove(&pid);
        }
        state.signals.push((pid, signal));
        Ok(true)
    }

    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        let state = self.state.borrow();
        if state.listing_fails {
            return Err(SupervisorError::ProcessList("ps: not found".into()));
        }
        Ok(state
            .procs
            .iter()
            .map(|(pid, p)| ProcessEntry {
                pid: *pid,
                command: p.command.clone(),
            })
            .collect())
    }

    fn command_line(&self, pid: Pid) -> Option<String> {
        self.state.borrow().procs.get(&pid).map(|p| p.command.clone())
    }

    fn spawn_detached(&self, spec: &LaunchSpec) -> Result<Pid> {
        let (crash, ignores_term) = {
            let mut state = self.state.borrow_mut();
            state.spawns += 1;
            (state.crash_on_spawn, state.spawned_ignore_term)
        };
        if spec.signature().program().is_empty() {
            return Err(SupervisorError::ProcessList("empty program".into()));
        }
        let pid = self.insert(&spec.signature().to_string(), ignores_term, false);
        if crash {
            self.kill_externally(pid);
        }
        Ok(pid)
    }
}

static TOKEN_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A fixed-width numeric token unique to this test process, usable as a
/// `sleep` duration. Fixed width keeps one token from being a substring
/// of another.
pub(crate) fn unique_token() -> String {
    let n = TOKEN_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("600.{:07}{:06}", std::process::id(), n)
}

/// `sleep <token>`: exits on SIGTERM.
pub(crate) fn sleeper_spec(dir: &Path, token: &str) -> LaunchSpec {
    LaunchSpec::new(InstanceSignature::new("sleep", vec![token.to_string()]), dir)
}

/// A shell that ignores SIGTERM until killed. It spins without forking so
/// nothing outlives a SIGKILL.
pub(crate) fn stubborn_spec(dir: &Path, token: &str) -> LaunchSpec {
    LaunchSpec::new(
        InstanceSignature::new(
            "sh",
            vec![
                "-c".to_string(),
                format!("trap '' TERM; while :; do :; done; : {}", token),
            ],
        ),
        dir,
    )
}
