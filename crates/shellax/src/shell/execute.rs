//! Shell execution engine
//!
//! Runs a parsed [`Command`] chain. Builtins run inside the interpreter;
//! every other stage becomes one child process, wired to its neighbours
//! with OS pipes and to files named by its redirects.
//!
//! A pipeline moves through `Parsed -> Spawning(i of n) -> AllSpawned ->
//! Waiting | Detached -> Reaped`. Foreground pipelines are reaped before
//! [`execute`] returns; background ones are handed to the state's
//! [`ChildProcessTracker`](super::child_process_tracker::ChildProcessTracker).
//!
//! Nothing that can block (opening a FIFO, a slow device) happens in the
//! interpreter: each stage opens its own redirect targets after the fork.

use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStringExt;
use std::ptr;

use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::libc;
use nix::sys::signal::{signal, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup2, fork, ForkResult, Pid};
use tracing::{debug, warn};

use crate::error::{Result, ShellError};
use crate::parser::{parse, Command, RedirectOp};
use crate::shell::child_process_tracker::wait_for;
use crate::shell::commands::ShellCommandContext;
use crate::shell::types::{ExecuteResult, ShellState};
use crate::shell::which::resolve_command_path;

/// Stdin of a background pipeline that has no `<` of its own.
const NULL_DEVICE: &str = "/dev/null";

// ============================================================================
// Public API
// ============================================================================

/// Execute a parsed command chain.
///
/// Failures are reported as diagnostics on standard error and turned into a
/// non-zero status; only `exit` stops the read loop.
pub fn execute(chain: &Command, state: &ShellState) -> ExecuteResult {
    if chain.next.is_some() && chain.stages().any(Command::is_empty) {
        let err = ShellError::syntax("|");
        state.report(&err);
        return ExecuteResult::from_exit_code(err.exit_status());
    }

    if chain.is_empty() {
        return ExecuteResult::from_exit_code(0);
    }

    if let Some(builtin) = state.resolve_builtin(&chain.name) {
        if chain.next.is_some() {
            warn!(builtin = %chain.name, "stages piped after a builtin are not run");
        }
        return builtin.execute(ShellCommandContext {
            name: &chain.name,
            args: &chain.args,
            state,
        });
    }

    match execute_pipeline(chain, state) {
        Ok(result) => result,
        Err(err) => {
            state.report(&err);
            ExecuteResult::from_exit_code(err.exit_status())
        }
    }
}

/// Parse and execute one line.
pub fn execute_str(line: &str, state: &ShellState) -> ExecuteResult {
    execute(&parse(line), state)
}

// ============================================================================
// Pipeline Execution
// ============================================================================

fn execute_pipeline(chain: &Command, state: &ShellState) -> Result<ExecuteResult> {
    let plans = chain
        .stages()
        .enumerate()
        .map(|(index, stage)| StagePlan::new(index, stage, state))
        .collect::<Result<Vec<_>>>()?;

    // Every pipe exists before the first stage is spawned.
    let pipes = open_pipes(plans.len() - 1)?;
    debug!(stages = plans.len(), background = chain.background, "pipeline.start");

    let mut pids = Vec::with_capacity(plans.len());
    let mut failure = None;
    for (index, plan) in plans.iter().enumerate() {
        match spawn_stage(index, plan, &pipes) {
            Ok(pid) => {
                debug!(stage = index, pid = %pid, name = %plan.name, "pipeline.spawn");
                pids.push(pid);
            }
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    // Each child holds its own copies now.
    drop(pipes);
    drop(plans);

    let tracker = state.process_tracker();

    if let Some(err) = failure {
        // Stages already running are reclaimed like a background job.
        for &pid in &pids {
            tracker.track(pid);
        }
        return Err(err);
    }

    if chain.background {
        for &pid in &pids {
            tracker.track(pid);
        }
        match pids.last() {
            Some(pid) if state.announce_background() => eprintln!("[{}]", pid),
            _ => {}
        }
        debug!(pids = ?pids, "pipeline.detached");
        return Ok(ExecuteResult::from_exit_code(0));
    }

    let mut status = 0;
    let mut pids = pids.into_iter();
    while let Some(pid) = pids.next() {
        match wait_for(pid) {
            Ok(code) => status = code,
            Err(err) => {
                for pid in pids.by_ref() {
                    tracker.track(pid);
                }
                return Err(ShellError::Wait(err));
            }
        }
    }

    debug!(status, "pipeline.reaped");
    Ok(ExecuteResult::from_exit_code(status))
}

// ============================================================================
// Stage Preparation
// ============================================================================

/// Everything a stage needs, prepared before forking so the child only
/// opens, duplicates and closes descriptors and replaces its image.
struct StagePlan {
    name: String,
    background: bool,
    /// Owns the strings `argv_ptrs` points into
    _argv: Vec<CString>,
    /// `name`, args, then a null sentinel
    argv_ptrs: Vec<*const libc::c_char>,
    /// The resolved program, or the diagnostic the stage prints instead
    program: std::result::Result<CString, Vec<u8>>,
    /// Diagnostic prefix used if `execv` itself fails
    exec_prefix: Vec<u8>,
    /// Applied in order, after the pipe wiring
    redirects: Vec<RedirectPlan>,
}

impl StagePlan {
    fn new(index: usize, stage: &Command, state: &ShellState) -> Result<Self> {
        let argv = stage
            .argv()
            .into_iter()
            .map(to_cstring)
            .collect::<Result<Vec<_>>>()?;
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(ptr::null()))
            .collect();

        let program = match resolve_command_path(&stage.name, state.path_env().as_deref()) {
            Ok(path) => Ok(CString::new(path.into_os_string().into_vec()).map_err(|_| {
                ShellError::NulByte {
                    arg: stage.name.clone(),
                }
            })?),
            Err(err) => {
                debug!(name = %stage.name, "pipeline.resolve failed");
                Err(format!("{}\n", state.diagnostic(&err)).into_bytes())
            }
        };

        let mut redirects = Vec::new();
        // Background jobs must not compete with the read loop for the terminal.
        if stage.background && index == 0 && stage.redirects.input.is_none() {
            redirects.push(RedirectPlan::new(RedirectOp::Input, NULL_DEVICE, state)?);
        }
        for op in [RedirectOp::Input, RedirectOp::Output, RedirectOp::Append] {
            if let Some(path) = stage.redirects.get(op) {
                redirects.push(RedirectPlan::new(op, path, state)?);
            }
        }

        Ok(Self {
            name: stage.name.clone(),
            background: stage.background,
            _argv: argv,
            argv_ptrs,
            program,
            exec_prefix: state.diagnostic(format!("{}: ", stage.name)).into_bytes(),
            redirects,
        })
    }
}

fn to_cstring(arg: &str) -> Result<CString> {
    CString::new(arg).map_err(|_| ShellError::NulByte {
        arg: arg.to_string(),
    })
}

/// One redirect target, opened by the stage process itself.
struct RedirectPlan {
    path: CString,
    flags: OFlag,
    target: RawFd,
    /// `-<identity>: <path>: `
    error_prefix: Vec<u8>,
}

impl RedirectPlan {
    fn new(op: RedirectOp, path: &str, state: &ShellState) -> Result<Self> {
        let (flags, target) = match op {
            RedirectOp::Input => (OFlag::O_RDONLY, libc::STDIN_FILENO),
            RedirectOp::Output => (
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
                libc::STDOUT_FILENO,
            ),
            RedirectOp::Append => (
                OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
                libc::STDOUT_FILENO,
            ),
        };

        Ok(Self {
            path: to_cstring(path)?,
            flags,
            target,
            error_prefix: state.diagnostic(format!("{}: ", path)).into_bytes(),
        })
    }

    /// Open the target and move it onto its standard descriptor.
    fn apply(&self) -> std::result::Result<(), Errno> {
        let fd = loop {
            match open(self.path.as_c_str(), self.flags, Mode::from_bits_truncate(0o644)) {
                Err(Errno::EINTR) => continue,
                result => break result?,
            }
        };
        if fd != self.target {
            dup2(fd, self.target)?;
            close(fd)?;
        }
        Ok(())
    }
}

/// One OS pipe; stage `i` writes to pipe `i` and stage `i + 1` reads it.
struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    fn fds(&self) -> [RawFd; 2] {
        [self.read.as_raw_fd(), self.write.as_raw_fd()]
    }
}

/// Create `count` pipes whose ends are never inherited across `execv`.
fn open_pipes(count: usize) -> Result<Vec<Pipe>> {
    let mut pipes = Vec::with_capacity(count);
    for _ in 0..count {
        let (read, write) = cloexec_pipe().map_err(ShellError::Pipe)?;
        pipes.push(Pipe { read, write });
    }
    Ok(pipes)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    // Atomic, so a fork on another thread never sees an inheritable end.
    nix::unistd::pipe2(OFlag::O_CLOEXEC)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn cloexec_pipe() -> nix::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

// ============================================================================
// Spawning
// ============================================================================

fn spawn_stage(index: usize, plan: &StagePlan, pipes: &[Pipe]) -> Result<Pid> {
    let stdin = index.checked_sub(1).map(|i| pipes[i].read.as_raw_fd());
    let stdout = pipes.get(index).map(|pipe| pipe.write.as_raw_fd());

    // SAFETY: the child only performs async-signal-safe calls (sigaction,
    // open, dup2, close, write, execv, _exit) on data prepared before the
    // fork.
    match unsafe { fork() }.map_err(ShellError::Fork)? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => run_stage(plan, stdin, stdout, pipes),
    }
}

/// Body of a forked stage. Never returns.
fn run_stage(
    plan: &StagePlan,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    pipes: &[Pipe],
) -> ! {
    // Dispositions survive execv. Background stages keep ignoring terminal
    // interrupts; they share the interpreter's process group.
    let interrupts = if plan.background {
        SigHandler::SigIgn
    } else {
        SigHandler::SigDfl
    };
    for (sig, handler) in [
        (Signal::SIGINT, interrupts),
        (Signal::SIGQUIT, interrupts),
        (Signal::SIGPIPE, SigHandler::SigDfl),
    ] {
        // SAFETY: neither handler installs Rust code.
        let _ = unsafe { signal(sig, handler) };
    }

    for (source, target) in [(stdin, libc::STDIN_FILENO), (stdout, libc::STDOUT_FILENO)] {
        if let Some(fd) = source {
            if let Err(errno) = dup2(fd, target) {
                exit_stage(&[&plan.exec_prefix, b"dup2: ", errno.desc().as_bytes(), b"\n"], 1);
            }
        }
    }

    // Explicit redirects take precedence over the pipe wiring.
    for redirect in &plan.redirects {
        if let Err(errno) = redirect.apply() {
            exit_stage(&[&redirect.error_prefix, errno.desc().as_bytes(), b"\n"], 1);
        }
    }

    // Only 0, 1 and 2 stay open.
    for fd in pipes.iter().flat_map(Pipe::fds) {
        if fd > libc::STDERR_FILENO {
            let _ = close(fd);
        }
    }

    match &plan.program {
        Ok(program) => {
            // SAFETY: `program` and `argv_ptrs` are NUL terminated and
            // `argv_ptrs` ends with a null pointer.
            unsafe { libc::execv(program.as_ptr(), plan.argv_ptrs.as_ptr()) };
            let errno = Errno::last();
            exit_stage(&[&plan.exec_prefix, errno.desc().as_bytes(), b"\n"], 126)
        }
        Err(diagnostic) => exit_stage(&[diagnostic], 127),
    }
}

/// Write a diagnostic to standard error and terminate the stage process.
fn exit_stage(parts: &[&[u8]], code: i32) -> ! {
    for part in parts {
        write_stderr(part);
    }
    // SAFETY: _exit skips atexit handlers and buffered stdio that belong
    // to the interpreter.
    unsafe { libc::_exit(code) }
}

fn write_stderr(mut bytes: &[u8]) {
    while !bytes.is_empty() {
        // SAFETY: the pointer and length come from a live slice.
        let written =
            unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
        if written < 0 {
            if Errno::last() == Errno::EINTR {
                continue;
            }
            return;
        }
        if written == 0 {
            return;
        }
        bytes = &bytes[written as usize..];
    }
}

// ============================================================================
// Tests
// ============================================================================
