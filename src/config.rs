//! Configuration for anigato.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (ANIGATO_HOME, ANIGATO_DB, ANIGATO_LOCALE)
//! 2. Config file (.anigato/config.yaml)
//! 3. Defaults (~/.anigato)
//!
//! Config file discovery:
//! - Searches current directory and parents for .anigato/config.yaml
//! - Paths in config file are relative to the .anigato/ directory

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::playback::quality_rank;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

const DB_FILE: &str = "library.db";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub playback: Option<PlaybackConfig>,
    #[serde(default)]
    pub fetch: Option<FetchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .anigato/)
    pub home: Option<String>,
    /// Library database file (relative to .anigato/)
    pub database: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// Preferred locale, e.g. "pt-BR"
    pub locale: Option<String>,
    /// Highest quality to pick automatically, e.g. "720p"
    pub quality: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    pub user_agent: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to anigato home
    pub home: PathBuf,
    /// Absolute path to the library database
    pub database: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Playback defaults
    pub playback: PlaybackSettings,
    /// User-Agent for manifest and overlay requests
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackSettings {
    pub locale: Option<String>,
    /// Cap derived from the configured quality label
    pub max_height: Option<u32>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".anigato").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".anigato");

    let config_file = find_config_file();
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    // Paths in the file are relative to .anigato/
    let anigato_dir = config_file
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));

    let home = if let Some(env_home) = non_empty_env("ANIGATO_HOME") {
        PathBuf::from(env_home)
    } else if let Some(home_path) = file.as_ref().and_then(|f| f.paths.home.as_deref()) {
        resolve_path(anigato_dir, home_path)
    } else {
        default_home
    };

    let database = if let Some(env_db) = non_empty_env("ANIGATO_DB") {
        PathBuf::from(env_db)
    } else if let Some(db_path) = file.as_ref().and_then(|f| f.paths.database.as_deref()) {
        resolve_path(anigato_dir, db_path)
    } else {
        home.join(DB_FILE)
    };

    let playback_file = file.as_ref().and_then(|f| f.playback.as_ref());
    let playback = PlaybackSettings {
        locale: non_empty_env("ANIGATO_LOCALE")
            .or_else(|| playback_file.and_then(|p| p.locale.clone())),
        max_height: playback_file
            .and_then(|p| p.quality.as_deref())
            .and_then(quality_rank),
    };

    let user_agent = file
        .as_ref()
        .and_then(|f| f.fetch.as_ref())
        .and_then(|f| f.user_agent.clone());

    Ok(ResolvedConfig {
        home,
        database,
        config_file,
        playback,
        user_agent,
    })
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let anigato_dir = temp.path().join(".anigato");
        std::fs::create_dir_all(&anigato_dir).unwrap();

        let config_path = anigato_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
paths:
  home: ./
  database: ../data/library.db
playback:
  locale: pt-BR
  quality: 720p
fetch:
  user_agent: anigato-test
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.paths.home, Some("./".to_string()));
        assert_eq!(config.paths.database, Some("../data/library.db".to_string()));

        let playback = config.playback.unwrap();
        assert_eq!(playback.locale.as_deref(), Some("pt-BR"));
        assert_eq!(playback.quality.as_deref().and_then(quality_rank), Some(720));
        assert_eq!(config.fetch.unwrap().user_agent.as_deref(), Some("anigato-test"));
    }

    #[test]
    fn test_minimal_config_file() {
        let config: ConfigFile = serde_yaml::from_str("version: \"1.0\"\n").unwrap();
        assert!(config.paths.home.is_none());
        assert!(config.playback.is_none());
        assert!(config.fetch.is_none());
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.anigato");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/.anigato/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/library.db"),
            PathBuf::from("/absolute/library.db")
        );
    }
}
