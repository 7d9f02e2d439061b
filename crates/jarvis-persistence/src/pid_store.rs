//! Process handle store.
//!
//! One plain-text pid file per deployment root. The file is a hint, not a
//! source of truth: the recorded process may have exited without cleanup,
//! so callers must re-check liveness before acting on it.
//!
//! Single-writer contract: nothing here locks the file. Running two
//! lifecycle commands against the same root at once is unsupported.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use jarvis_core::Pid;
use tracing::{debug, warn};

use crate::atomic::{atomic_write, remove_if_exists};
use crate::error::Result;

/// Stores the pid of the currently running instance.
#[derive(Debug, Clone)]
pub struct PidStore {
    path: PathBuf,
}

impl PidStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `pid`, replacing any previous value.
    pub fn write(&self, pid: Pid) -> Result<()> {
        atomic_write(&self.path, format!("{}\n", pid).as_bytes())?;
        debug!(pid = %pid, path = %self.path.display(), "Recorded process handle");
        Ok(())
    }

    /// The recorded pid, or `None` if the file is missing or unparsable.
    pub fn read(&self) -> Option<Pid> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read pid file");
                return None;
            }
        };

        match contents.parse::<Pid>() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed pid file");
                None
            }
        }
    }

    /// Remove the record. A missing file is not an error.
    pub fn clear(&self) -> Result<()> {
        if remove_if_exists(&self.path)? {
            debug!(path = %self.path.display(), "Cleared process handle");
        }
        Ok(())
    }
}
