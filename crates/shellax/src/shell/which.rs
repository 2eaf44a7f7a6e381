//! PATH resolution utilities
//!
//! Resolves command names to executable paths using a colon separated
//! search path, and lists executables for completion requests.

use std::collections::BTreeSet;
use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Result, ShellError};

/// Resolve a command name to the executable that should be run.
///
/// A name containing a path separator is used as typed. Otherwise each
/// directory of `path_env` is searched in order and the first executable
/// `directory/name` wins. With no search path nothing is found.
pub fn resolve_command_path(name: &str, path_env: Option<&OsStr>) -> Result<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        return Ok(PathBuf::from(name));
    }

    which(OsStr::new(name), path_env).ok_or_else(|| ShellError::command_not_found(name))
}

/// Search `path_env` for the first executable named `cmd`.
pub fn which(cmd: &OsStr, path_env: Option<&OsStr>) -> Option<PathBuf> {
    if cmd.is_empty() {
        return None;
    }

    for dir in env::split_paths(path_env?) {
        let candidate = dir.join(cmd);
        trace!(candidate = %candidate.display(), "which.probe");
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }

    None
}

/// Names of the executables in `path_env` starting with `prefix`, sorted
/// and without duplicates.
pub fn complete_command(prefix: &str, path_env: Option<&OsStr>) -> Vec<String> {
    let Some(path_env) = path_env else {
        return Vec::new();
    };

    let mut names = BTreeSet::new();
    for dir in env::split_paths(path_env) {
        let Ok(entries) = dir.read_dir() else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(prefix) && is_executable(&entry.path()) {
                names.insert(name.to_string());
            }
        }
    }

    names.into_iter().collect()
}

/// Check if a path is an executable file.
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match path.metadata() {
        Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

// ============================================================================
// Tests
// ============================================================================
