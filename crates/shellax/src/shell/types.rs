//! Core types for shell execution
//!
//! - `ShellState` - identity, search path, builtin registry and background tracker
//! - `ExecuteResult` - what the read loop should do after a line

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::rc::Rc;

use super::child_process_tracker::{ChildProcessTracker, ReapedChild};
use super::commands::ShellCommand;
use crate::error::ShellError;

/// Name used to prefix diagnostics when none is configured.
pub const DEFAULT_IDENTITY: &str = "shellax";

// ============================================================================
// Shell State
// ============================================================================

/// State shared by every line the interpreter executes.
///
/// The working directory and the environment are those of the interpreter
/// process itself; `cd` mutates them directly.
#[derive(Clone)]
pub struct ShellState {
    /// Prefix for user diagnostics (`-shellax: ...`)
    identity: String,
    /// Search path used instead of the `PATH` environment variable
    path_override: Option<OsString>,
    /// Print `[pid]` when a background pipeline starts
    announce_background: bool,
    /// Builtin commands
    commands: Rc<HashMap<String, Rc<dyn ShellCommand>>>,
    /// Background children awaiting reclamation
    process_tracker: ChildProcessTracker,
}

impl ShellState {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            path_override: None,
            announce_background: false,
            commands: Rc::new(super::commands::builtin_commands()),
            process_tracker: ChildProcessTracker::new(),
        }
    }

    pub fn new_default() -> Self {
        Self::new(DEFAULT_IDENTITY)
    }

    /// Search `path` for executables instead of the `PATH` variable.
    pub fn with_path(mut self, path: impl Into<OsString>) -> Self {
        self.path_override = Some(path.into());
        self
    }

    pub fn with_announce_background(mut self, announce: bool) -> Self {
        self.announce_background = announce;
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn announce_background(&self) -> bool {
        self.announce_background
    }

    /// The colon separated search path, if any.
    pub fn path_env(&self) -> Option<OsString> {
        self.path_override
            .clone()
            .or_else(|| std::env::var_os("PATH"))
    }

    /// Resolve a builtin by name.
    pub fn resolve_builtin(&self, name: &str) -> Option<Rc<dyn ShellCommand>> {
        self.commands.get(name).cloned()
    }

    pub fn process_tracker(&self) -> &ChildProcessTracker {
        &self.process_tracker
    }

    /// Reclaim finished background children.
    pub fn reap_background(&self) -> Vec<ReapedChild> {
        self.process_tracker.reap()
    }

    /// Format a user diagnostic with the interpreter's identity prefix.
    pub fn diagnostic(&self, message: impl fmt::Display) -> String {
        format!("-{}: {}", self.identity, message)
    }

    /// Print an error as a user diagnostic on standard error.
    pub fn report(&self, error: &ShellError) {
        eprintln!("{}", self.diagnostic(error));
    }
}

impl Default for ShellState {
    fn default() -> Self {
        Self::new_default()
    }
}

// ============================================================================
// Execution Result
// ============================================================================

/// Result of executing one command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteResult {
    /// Stop the read loop and exit the interpreter with a code: `exit <code>`
    Exit(i32),
    /// Keep reading lines; carries the status of the pipeline's last stage
    Continue(i32),
}

impl ExecuteResult {
    /// Create a simple result from an exit code.
    pub fn from_exit_code(exit_code: i32) -> ExecuteResult {
        ExecuteResult::Continue(exit_code)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ExecuteResult::Exit(code) | ExecuteResult::Continue(code) => *code,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self, ExecuteResult::Exit(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_prefix() {
        let state = ShellState::new("myshell");
        let err = ShellError::command_not_found("frob");
        assert_eq!(state.diagnostic(&err), "-myshell: frob: command not found");
    }

    #[test]
    fn test_path_override() {
        let state = ShellState::new_default().with_path("/opt/bin:/usr/bin");
        assert_eq!(state.path_env(), Some(OsString::from("/opt/bin:/usr/bin")));
    }

    #[test]
    fn test_builtins_registered() {
        let state = ShellState::new_default();
        assert!(state.resolve_builtin("cd").is_some());
        assert!(state.resolve_builtin("exit").is_some());
        assert!(state.resolve_builtin("ls").is_none());
    }

    #[test]
    fn test_execute_result_codes() {
        assert_eq!(ExecuteResult::from_exit_code(4).exit_code(), 4);
        assert!(ExecuteResult::Exit(0).is_exit());
        assert!(!ExecuteResult::Continue(0).is_exit());
    }
}
