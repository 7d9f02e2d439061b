//! Persistence layer for jarvisctl.
//!
//! Crash-safe state files using atomic file operations (write to temp file,
//! then rename). The only state that outlives a command is the process
//! handle of the running instance.
//!
//! # Example
//!
//! ```no_run
//! use jarvis_core::Pid;
//! use jarvis_persistence::PidStore;
//!
//! let store = PidStore::new("/srv/jarvis/run/jarvis.pid");
//! store.write(Pid::new(4242).unwrap()).unwrap();
//! assert_eq!(store.read(), Pid::new(4242));
//! store.clear().unwrap();
//! ```

pub mod atomic;
pub mod error;
pub mod pid_store;

pub use error::{PersistenceError, Result};
pub use pid_store::PidStore;
