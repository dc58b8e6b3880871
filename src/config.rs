//! User configuration.
//!
//! Hooks only: engine overrides, the copy-instead-of-symlink switch,
//! verbosity and an optional default prefix. Core operations take
//! explicit arguments and never read this behind the caller's back.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::install::Prefix;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    /// Force a specific download engine ("curl" or "wget").
    #[serde(default)]
    pub download_engine: Option<String>,
    /// Force a specific unpack engine ("tar" or "7z").
    #[serde(default)]
    pub unpack_engine: Option<String>,
    /// Replace extracted symlinks with copies of their targets.
    #[serde(default)]
    pub copy_symlinks: bool,
    /// Mirror subprocess output and keep command logs.
    #[serde(default)]
    pub verbose: bool,
    /// Default installation prefix; `~` expands to the home directory.
    #[serde(default)]
    pub prefix: Option<String>,
}

fn config_file_path() -> Result<PathBuf> {
    if let Ok(dir) = env::var("PREFAB_CONFIG_DIR") {
        return Ok(PathBuf::from(dir).join("config.toml"));
    }
    let config_dir = dirs::config_dir()
        .context("unable to determine user config directory")?
        .join("prefab");
    Ok(config_dir.join("config.toml"))
}

impl Config {
    /// Load the config from disk. If the config file does not exist,
    /// write a default config file and return the default.
    pub fn load() -> Result<Config> {
        Self::load_from(&config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Config> {
        if !path.exists() {
            let default = Config::default();
            default.save_to(path)?;
            return Ok(default);
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&raw).context("parsing config toml")?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let raw = toml::to_string_pretty(self).context("serializing config to toml")?;
        fs::write(path, raw)
            .with_context(|| format!("writing config to {}", path.display()))?;
        Ok(())
    }

    /// The configured prefix root, `~`-expanded, or the built-in default.
    pub fn prefix_root(&self) -> PathBuf {
        match &self.prefix {
            Some(raw) => PathBuf::from(shellexpand::tilde(raw).into_owned()),
            None => Prefix::default_root(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_is_created_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prefab").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert!(config.download_engine.is_none());
        assert!(!config.copy_symlinks);
    }

    #[test]
    fn config_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            download_engine: Some("wget".to_string()),
            unpack_engine: None,
            copy_symlinks: true,
            verbose: true,
            prefix: Some("/opt/prefab".to_string()),
        };
        config.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.download_engine.as_deref(), Some("wget"));
        assert!(loaded.copy_symlinks);
        assert_eq!(loaded.prefix_root(), PathBuf::from("/opt/prefab"));
    }

    #[test]
    fn tilde_expands_in_prefix() {
        let config = Config {
            prefix: Some("~/prefab-root".to_string()),
            ..Default::default()
        };
        let root = config.prefix_root();
        assert!(!root.to_string_lossy().starts_with('~'));
        assert!(root.ends_with("prefab-root"));
    }

    #[test]
    fn unknown_engine_names_still_parse() {
        // Engine validation happens at detection time, not config load.
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "download_engine = \"teleport\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.download_engine.as_deref(), Some("teleport"));
    }
}
