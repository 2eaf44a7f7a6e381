//! Exit command implementation
//!
//! Exits the shell with an optional exit code.

use super::{ShellCommand, ShellCommandContext};
use crate::shell::types::ExecuteResult;

/// The `exit` command - exits the shell with an exit code.
pub struct ExitCommand;

impl ShellCommand for ExitCommand {
    fn execute(&self, context: ShellCommandContext<'_>) -> ExecuteResult {
        // Default exit code is 0
        let exit_code = context
            .args
            .first()
            .and_then(|arg| arg.parse::<i32>().ok())
            .unwrap_or(0);

        ExecuteResult::Exit(exit_code)
    }
}
