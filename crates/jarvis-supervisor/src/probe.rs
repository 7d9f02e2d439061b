//! Liveness probing.

use jarvis_core::{InstanceSignature, Pid};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid as NixPid;
use tracing::debug;

use crate::host::ProcessHost;

/// Whether `pid` names a live process.
///
/// Sends the null signal, which performs the existence and permission
/// checks of `kill(2)` without delivering anything. `EPERM` means the
/// process exists under another user and counts as alive. Zombies do not.
pub fn is_alive(pid: Pid) -> bool {
    let Some(raw) = pid.as_raw() else {
        return false;
    };

    match kill(NixPid::from_raw(raw), None) {
        Ok(()) => !is_zombie(pid),
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Whether `pid` is alive and still runs `signature`.
///
/// A recorded pid can outlive its process and be reused by an unrelated
/// one, typically after a reboot. A live pid whose command line is
/// unreadable or does not match is not treated as the instance.
pub fn is_instance<H: ProcessHost + ?Sized>(host: &H, pid: Pid, signature: &InstanceSignature) -> bool {
    if !host.is_alive(pid) {
        return false;
    }
    match host.command_line(pid) {
        Some(command) if signature.matches(&command) => true,
        command => {
            debug!(pid = %pid, command = ?command, "Live pid does not belong to this instance");
            false
        }
    }
}

/// Exited but not yet reaped by its parent.
#[cfg(target_os = "linux")]
fn is_zombie(pid: Pid) -> bool {
    // Format: "<pid> (<comm>) <state> ...". comm may contain spaces and
    // parentheses, so the state is read after the last ')'.
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            let rest = &stat[stat.rfind(')')? + 1..];
            rest.split_whitespace().next().map(|state| state == "Z")
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: Pid) -> bool {
    false
}
