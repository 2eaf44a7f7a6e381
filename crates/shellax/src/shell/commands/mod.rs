//! Built-in shell commands
//!
//! This module provides:
//! - `ShellCommand` trait for implementing commands that run inside the
//!   interpreter process instead of a child
//! - `ShellCommandContext` for command execution context
//! - Built-in commands: cd, exit
//! - `builtin_commands()` function to get all built-in commands

mod cd;
mod exit;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::types::{ExecuteResult, ShellState};

pub use cd::CdCommand;
pub use exit::ExitCommand;

/// Trait for implementing shell commands.
pub trait ShellCommand {
    /// Execute the command with the given context.
    fn execute(&self, context: ShellCommandContext<'_>) -> ExecuteResult;
}

/// Context provided to shell commands during execution.
pub struct ShellCommandContext<'a> {
    /// Command name as typed
    pub name: &'a str,
    /// Arguments after the name
    pub args: &'a [String],
    /// Current shell state
    pub state: &'a ShellState,
}

impl ShellCommandContext<'_> {
    /// Print a diagnostic on standard error.
    pub fn write_error(&self, message: impl fmt::Display) {
        eprintln!("{}", self.state.diagnostic(message));
    }
}

/// Get all built-in commands as a HashMap.
pub fn builtin_commands() -> HashMap<String, Rc<dyn ShellCommand>> {
    let mut commands: HashMap<String, Rc<dyn ShellCommand>> = HashMap::new();

    commands.insert("cd".to_string(), Rc::new(CdCommand));
    commands.insert("exit".to_string(), Rc::new(ExitCommand));

    commands
}
