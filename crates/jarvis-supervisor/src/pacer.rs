//! Interruptible waits.
//!
//! Every wait in the supervisor (pre-delay, grace periods, post-start
//! check) goes through a [`Pacer`]. When the supervisor itself receives
//! SIGINT, SIGTERM or SIGHUP, the next wait returns
//! [`SupervisorError::Interrupted`] and the caller abandons the remaining
//! phases without rollback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jarvis_core::Pid;

use crate::error::{Result, SupervisorError};
use crate::host::ProcessHost;

/// Longest single sleep between interrupt checks.
const SLICE: Duration = Duration::from_millis(50);

/// Sleeps in short slices and watches an interrupt flag.
#[derive(Debug, Clone, Default)]
pub struct Pacer {
    interrupted: Arc<AtomicBool>,
}

impl Pacer {
    /// A pacer that is only interrupted through [`Pacer::interrupt`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A pacer whose flag is raised by SIGINT, SIGTERM and SIGHUP.
    ///
    /// Registering replaces the default disposition, so those signals no
    /// longer kill the process outright.
    pub fn with_signal_handlers() -> std::io::Result<Self> {
        let pacer = Self::new();
        for sig in [
            signal_hook::consts::SIGINT,
            signal_hook::consts::SIGTERM,
            signal_hook::consts::SIGHUP,
        ] {
            signal_hook::flag::register(sig, Arc::clone(&pacer.interrupted))?;
        }
        Ok(pacer)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Fail fast if an interrupt is pending.
    pub fn check(&self) -> Result<()> {
        if self.is_interrupted() {
            Err(SupervisorError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration` unless interrupted first.
    pub fn pause(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(SLICE));
        }
    }

    /// Poll until every pid is dead or `timeout` elapses.
    ///
    /// Returns the pids still alive at the end, in input order.
    pub fn wait_for_exit<H: ProcessHost + ?Sized>(
        &self,
        host: &H,
        pids: &[Pid],
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<Pid>> {
        let deadline = Instant::now() + timeout;
        let poll_interval = poll_interval.max(Duration::from_millis(1));
        loop {
            let alive: Vec<Pid> = pids.iter().copied().filter(|p| host.is_alive(*p)).collect();
            let now = Instant::now();
            if alive.is_empty() || now >= deadline {
                return Ok(alive);
            }
            self.pause(poll_interval.min(deadline - now))?;
        }
    }
}
