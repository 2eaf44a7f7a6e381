//! Error types for parsing and pipeline execution
//!
//! Every variant renders as the message part of a user diagnostic; the
//! interpreter prefixes it with its identity (`-shellax: ...`).

use std::path::PathBuf;

/// Errors that can occur while running a command line.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    /// No executable matched on any searched path
    #[error("{name}: command not found")]
    CommandNotFound { name: String },

    /// `cd` could not enter the requested directory
    #[error("cd: {}: {source}", path.display())]
    ChangeDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage was empty where a command was required (`a | | b`, `a |`)
    #[error("syntax error near unexpected token '{token}'")]
    Syntax { token: String },

    /// An argument could not be passed to `execv`
    #[error("{arg}: argument contains a NUL byte")]
    NulByte { arg: String },

    /// pipe(2) failed
    #[error("pipe: {0}")]
    Pipe(#[source] nix::Error),

    /// fork(2) failed
    #[error("fork: {0}")]
    Fork(#[source] nix::Error),

    /// waitpid(2) failed
    #[error("wait: {0}")]
    Wait(#[source] nix::Error),
}

impl ShellError {
    pub fn command_not_found(name: impl Into<String>) -> Self {
        Self::CommandNotFound { name: name.into() }
    }

    pub fn change_directory(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ChangeDirectory {
            path: path.into(),
            source,
        }
    }

    pub fn syntax(token: impl Into<String>) -> Self {
        Self::Syntax {
            token: token.into(),
        }
    }

    /// Exit status a conventional shell reports for this failure.
    pub fn exit_status(&self) -> i32 {
        match self {
            Self::CommandNotFound { .. } => 127,
            Self::Syntax { .. } => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_not_found_message() {
        let err = ShellError::command_not_found("nonexistent12345");
        assert_eq!(err.to_string(), "nonexistent12345: command not found");
        assert_eq!(err.exit_status(), 127);
    }

    #[test]
    fn test_change_directory_message_names_path() {
        let source = std::io::Error::from(std::io::ErrorKind::NotFound);
        let err = ShellError::change_directory("/no/such/dir", source);
        assert!(err.to_string().starts_with("cd: /no/such/dir: "));
        assert_eq!(err.exit_status(), 1);
    }

    #[test]
    fn test_syntax_status() {
        let err = ShellError::syntax("|");
        assert_eq!(err.to_string(), "syntax error near unexpected token '|'");
        assert_eq!(err.exit_status(), 2);
    }
}
