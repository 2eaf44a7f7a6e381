//! Listing for lines ending in `?`
//!
//! The last stage of the chain is completed: its name against the search
//! path when it has no arguments, otherwise its last argument against the
//! file system.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use shellax::shell::which::complete_command;
use shellax::{Command, ShellState};
use tracing::debug;

/// Sorted, de-duplicated completions for a parsed line.
pub fn candidates(chain: &Command, state: &ShellState) -> Vec<String> {
    let Some(stage) = chain.stages().last() else {
        return Vec::new();
    };

    match stage.args.last() {
        Some(partial) => complete_path(partial),
        None => complete_command(&stage.name, state.path_env().as_deref()),
    }
}

/// Directory entries matching `partial`, keeping its directory part.
/// Directories get a trailing `/`; hidden entries need a leading `.`.
pub fn complete_path(partial: &str) -> Vec<String> {
    let (dir_part, file_prefix) = match partial.rfind('/') {
        Some(idx) => partial.split_at(idx + 1),
        None => ("", partial),
    };
    let dir = if dir_part.is_empty() {
        Path::new(".")
    } else {
        Path::new(dir_part)
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "completion.read_dir failed");
            return Vec::new();
        }
    };

    let mut names = BTreeSet::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.starts_with(file_prefix) || (name.starts_with('.') && !file_prefix.starts_with('.')) {
            continue;
        }
        let suffix = if entry.path().is_dir() { "/" } else { "" };
        names.insert(format!("{dir_part}{name}{suffix}"));
    }

    names.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shellax::parse;
    use std::os::unix::fs::PermissionsExt;

    fn touch(path: &Path, mode: u32) {
        fs::write(path, "").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_completes_command_names() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        touch(&first.path().join("frobnicate"), 0o755);
        touch(&first.path().join("frobber"), 0o755);
        touch(&first.path().join("frobdata"), 0o644);
        touch(&second.path().join("frobnicate"), 0o755);

        let path = std::env::join_paths([first.path(), second.path()]).unwrap();
        let state = ShellState::new_default().with_path(path);

        assert_eq!(
            candidates(&parse("frob?"), &state),
            vec!["frobber".to_string(), "frobnicate".to_string()]
        );
    }

    #[test]
    fn test_completes_last_stage_argument() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("alpha.txt"), 0o644);
        touch(&dir.path().join("beta.txt"), 0o644);
        touch(&dir.path().join(".alpine"), 0o644);
        fs::create_dir(dir.path().join("alps")).unwrap();

        let base = dir.path().display();
        let state = ShellState::new_default().with_path("");
        let line = format!("cat x | wc {base}/al?");

        assert_eq!(
            candidates(&parse(&line), &state),
            vec![format!("{base}/alpha.txt"), format!("{base}/alps/")]
        );
        assert_eq!(
            complete_path(&format!("{base}/.al")),
            vec![format!("{base}/.alpine")]
        );
    }

    #[test]
    fn test_unreadable_directory_yields_nothing() {
        assert!(complete_path("/nonexistent/dir/12345/x").is_empty());
    }
}
