//! Shell execution engine
//!
//! - `types` - Core data structures (ShellState, ExecuteResult)
//! - `execute` - Pipeline execution engine
//! - `commands` - Built-in shell commands
//! - `which` - Command path resolution and name completion
//! - `child_process_tracker` - Background process reclamation

pub mod child_process_tracker;
pub mod commands;
pub mod execute;
pub mod types;
pub mod which;

// Re-export main execution functions
pub use execute::{execute, execute_str};

// Re-export types
pub use child_process_tracker::{ChildProcessTracker, ReapedChild};
pub use types::{ExecuteResult, ShellState, DEFAULT_IDENTITY};

// Re-export command types
pub use commands::{builtin_commands, ShellCommand, ShellCommandContext};
