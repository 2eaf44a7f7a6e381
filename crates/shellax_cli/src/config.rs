//! Interpreter configuration
//!
//! Read from `--config <path>` or `<config_dir>/shellax/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use shellax::shell::DEFAULT_IDENTITY;

/// Settings for one interpreter session. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Diagnostic prefix: `-<identity>: message`
    pub identity: String,
    /// Shown before each line when standard input is a terminal
    pub prompt: String,
    /// `tracing` filter used when `SHELLAX_LOG` is unset
    pub log_filter: String,
    /// Print `[pid]` on background launch and `[pid] Done` when reaped
    pub announce_background: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            prompt: format!("{}$ ", DEFAULT_IDENTITY),
            log_filter: "warn".to_string(),
            announce_background: true,
        }
    }
}

impl ShellConfig {
    /// Load the explicit file, or the default one when it exists.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config at {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// `<config_dir>/shellax/config.toml`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("shellax").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_uses_defaults() {
        assert_eq!(ShellConfig::from_toml("").unwrap(), ShellConfig::default());
        assert_eq!(ShellConfig::default().prompt, "shellax$ ");
    }

    #[test]
    fn test_partial_file() {
        let config = ShellConfig::from_toml(
            r#"
identity = "mysh"
announce_background = false
"#,
        )
        .unwrap();

        assert_eq!(config.identity, "mysh");
        assert!(!config.announce_background);
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        assert!(ShellConfig::from_toml("announce_background = \"often\"").is_err());
    }

    #[test]
    fn test_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "prompt = \"> \"\nlog_filter = \"shellax=debug\"\n").unwrap();

        let config = ShellConfig::load(Some(&path)).unwrap();
        assert_eq!(config.prompt, "> ");
        assert_eq!(config.log_filter, "shellax=debug");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShellConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("reading config"));
    }
}
