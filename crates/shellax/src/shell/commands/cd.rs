//! Cd command implementation
//!
//! Changes the working directory of the interpreter process.

use std::env;

use tracing::debug;

use super::{ShellCommand, ShellCommandContext};
use crate::error::ShellError;
use crate::shell::types::ExecuteResult;

/// The `cd` command - changes the current working directory.
///
/// With no argument it does nothing.
pub struct CdCommand;

impl ShellCommand for CdCommand {
    fn execute(&self, context: ShellCommandContext<'_>) -> ExecuteResult {
        let Some(target) = context.args.first() else {
            return ExecuteResult::from_exit_code(0);
        };

        let old_pwd = env::current_dir().ok();
        if let Err(source) = env::set_current_dir(target) {
            context.write_error(ShellError::change_directory(target, source));
            return ExecuteResult::from_exit_code(1);
        }

        // Keep $PWD and $OLDPWD in sync for child processes
        if let Some(old_pwd) = old_pwd {
            env::set_var("OLDPWD", old_pwd);
        }
        if let Ok(cwd) = env::current_dir() {
            debug!(cwd = %cwd.display(), "cd");
            env::set_var("PWD", cwd);
        }

        ExecuteResult::from_exit_code(0)
    }
}
