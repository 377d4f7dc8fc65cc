//! User configuration, read from `<config_dir>/cwt/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cwt_agents::ManagerConfig;
use cwt_pty::SessionOptions;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Program started in every tab.
    pub command: String,
    pub args: Vec<String>,
    /// Lines of history kept per session.
    pub scrollback: usize,
    /// Redraw interval of the UI loop.
    pub tick_ms: u64,
    pub id_prefix: String,
    pub worktree_dir: String,
    /// Reopen tabs at startup for agents that are neither merged nor failed.
    pub restore_agents: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: Vec::new(),
            scrollback: cwt_vt::DEFAULT_SCROLLBACK,
            tick_ms: 50,
            id_prefix: "cwt".to_string(),
            worktree_dir: cwt_state::DEFAULT_WORKTREE_DIR.to_string(),
            restore_agents: true,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields the defaults; a missing explicit file
    /// is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        anyhow::ensure!(!config.command.trim().is_empty(), "command cannot be empty");
        anyhow::ensure!(config.tick_ms > 0, "tick_ms must be positive");
        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cwt").join("config.toml"))
    }

    pub fn session_options(&self, rows: u16, cols: u16) -> SessionOptions {
        SessionOptions {
            program: self.command.clone(),
            args: self.args.clone(),
            rows,
            cols,
            scrollback: self.scrollback,
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            id_prefix: self.id_prefix.clone(),
            worktree_dir: self.worktree_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = Config::parse(
            r#"
            command = "aider"
            args = ["--no-auto-commits"]
            tick_ms = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.command, "aider");
        assert_eq!(config.args, vec!["--no-auto-commits".to_string()]);
        assert_eq!(config.tick_ms, 100);
        assert_eq!(config.scrollback, 1_000);
        assert_eq!(config.worktree_dir, ".worktrees");
        assert!(config.restore_agents);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Config::parse("command = \"  \"").is_err());
        assert!(Config::parse("tick_ms = 0").is_err());
        assert!(Config::parse("scrollback = \"lots\"").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn loads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "id_prefix = \"agent\"\nrestore_agents = false\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.id_prefix, "agent");
        assert!(!config.restore_agents);
        assert_eq!(config.manager_config().id_prefix, "agent");

        let options = config.session_options(30, 100);
        assert_eq!(options.program, "claude");
        assert_eq!((options.rows, options.cols), (30, 100));
    }
}
