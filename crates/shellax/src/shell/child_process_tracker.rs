//! Child process tracking for background pipelines
//!
//! Background stages are not waited for when they are launched. Their pids
//! are recorded here and reclaimed with non-blocking waits, normally once per
//! prompt cycle, so finished children never linger as zombies.

use std::cell::RefCell;
use std::rc::Rc;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tracing::{debug, warn};

/// A background child whose exit status has been collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReapedChild {
    pub pid: Pid,
    /// Exit code, or 128 + signal number for a signal death
    pub status: i32,
}

/// Tracks background child processes spawned by the shell.
#[derive(Debug, Clone)]
pub struct ChildProcessTracker {
    inner: Rc<RefCell<ChildProcessTrackerInner>>,
}

#[derive(Debug, Default)]
struct ChildProcessTrackerInner {
    /// Process IDs of tracked children
    pids: Vec<Pid>,
}

impl Default for ChildProcessTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildProcessTracker {
    /// Create a new process tracker.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChildProcessTrackerInner::default())),
        }
    }

    /// Track a child process.
    pub fn track(&self, pid: Pid) {
        debug!(pid = %pid, "tracker.track");
        self.inner.borrow_mut().pids.push(pid);
    }

    /// Get all tracked PIDs.
    pub fn pids(&self) -> Vec<Pid> {
        self.inner.borrow().pids.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().pids.is_empty()
    }

    /// Collect every tracked child that has terminated, without blocking.
    pub fn reap(&self) -> Vec<ReapedChild> {
        let mut reaped = Vec::new();

        self.inner
            .borrow_mut()
            .pids
            .retain(|&pid| match try_wait(pid) {
                Ok(Some(status)) => {
                    debug!(pid = %pid, status, "tracker.reap");
                    reaped.push(ReapedChild { pid, status });
                    false
                }
                Ok(None) => true,
                Err(Errno::ECHILD) => {
                    debug!(pid = %pid, "tracker.reap: not a child");
                    false
                }
                Err(err) => {
                    warn!(pid = %pid, error = %err, "tracker.reap failed");
                    true
                }
            });

        reaped
    }
}

// ============================================================================
// Waiting
// ============================================================================

/// Block until `pid` terminates and return its status.
pub(crate) fn wait_for(pid: Pid) -> nix::Result<i32> {
    loop {
        let status = retry_eintr(|| waitpid(pid, None))?;
        if let Some(code) = status_code(status) {
            return Ok(code);
        }
    }
}

/// Poll `pid`; `None` while it is still running.
fn try_wait(pid: Pid) -> nix::Result<Option<i32>> {
    let status = retry_eintr(|| waitpid(pid, Some(WaitPidFlag::WNOHANG)))?;
    Ok(status_code(status))
}

fn status_code(status: WaitStatus) -> Option<i32> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}

/// Repeat a system call until it is not interrupted by a signal.
fn retry_eintr<T>(mut f: impl FnMut() -> nix::Result<T>) -> nix::Result<T> {
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}
