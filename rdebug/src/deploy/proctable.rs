//! OS process table queries

use sysinfo::{Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System};

fn with_process<T>(pid: u32, f: impl FnOnce(Option<&Process>) -> T) -> T {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::nothing(),
    );
    f(sys.process(pid))
}

/// Whether the pid is present in the process table.
///
/// Zombies count as gone: they no longer run and only wait to be reaped.
pub fn is_alive(pid: u32) -> bool {
    with_process(pid, |process| {
        process.is_some_and(|p| !matches!(p.status(), ProcessStatus::Zombie | ProcessStatus::Dead))
    })
}

/// Ask the process to terminate. Returns false if it was not found or the
/// signal could not be delivered.
pub fn terminate(pid: u32) -> bool {
    with_process(pid, |process| match process {
        // Platforms without SIGTERM fall back to a hard kill
        Some(p) => p.kill_with(Signal::Term).unwrap_or_else(|| p.kill()),
        None => false,
    })
}

/// Kill the process without giving it a chance to clean up
pub fn force_kill(pid: u32) -> bool {
    with_process(pid, |process| process.is_some_and(|p| p.kill()))
}

/// Liveness checks and signals used when replacing a deployment
pub trait ProcessTable: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;

    fn terminate(&self, pid: u32) -> bool;

    fn force_kill(&self, pid: u32) -> bool;
}

/// The host's process table
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        is_alive(pid)
    }

    fn terminate(&self, pid: u32) -> bool {
        terminate(pid)
    }

    fn force_kill(&self, pid: u32) -> bool {
        force_kill(pid)
    }
}
