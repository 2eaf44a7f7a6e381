//! Core of the shellax command interpreter
//!
//! Provides:
//! - [`parse`]: turns one input line into a chain of [`Command`] stages
//! - [`execute`]: runs a chain as a pipeline of child processes, or as a
//!   builtin (`cd`, `exit`) inside the interpreter
//! - [`ShellState`]: identity, search path and background children shared
//!   across lines
//!
//! ```no_run
//! use shellax::{execute, parse, ExecuteResult, ShellState};
//!
//! let state = ShellState::new_default();
//! let chain = parse("ls -l | grep rs > listing.txt");
//! if let ExecuteResult::Exit(code) = execute(&chain, &state) {
//!     std::process::exit(code);
//! }
//! ```

#[cfg(not(unix))]
compile_error!("shellax spawns processes with fork/exec and only supports unix targets");

pub mod error;
pub mod parser;
pub mod shell;

pub use error::{Result, ShellError};
pub use parser::{parse, Command, RedirectOp, Redirects};
pub use shell::{execute, execute_str, ExecuteResult, ShellState};
