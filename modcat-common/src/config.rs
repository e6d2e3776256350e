//! Configuration loading and config file resolution
//!
//! Config file lookup order:
//! 1. Command-line argument (highest priority)
//! 2. `MODCAT_CONFIG` environment variable
//! 3. Platform config directory (`<config dir>/modcat/config.toml`)
//! 4. Compiled defaults (no file)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MODCAT_CONFIG";

/// Default number of concurrent workers per registry
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Logging section of the TOML config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file (stdout when absent)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// On-disk configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TomlConfig {
    /// `owner/repo` holding the published catalog
    #[serde(default)]
    pub index_repository: Option<String>,
    /// Branch that receives the publish commit
    #[serde(default = "default_publish_branch")]
    pub publish_branch: String,
    /// Merge the publish branch directly instead of opening a pull request
    #[serde(default)]
    pub merge_without_pr: bool,
    /// Prefer CurseForge metadata over Modrinth on conflict
    #[serde(default)]
    pub prefer_curseforge: bool,
    /// Concurrent workers per registry
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default)]
    pub curseforge_api_key: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_publish_branch() -> String {
    "index-update".to_string()
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            index_repository: None,
            publish_branch: default_publish_branch(),
            merge_without_pr: false,
            prefer_curseforge: false,
            worker_count: DEFAULT_WORKER_COUNT,
            curseforge_api_key: None,
            github_token: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    pub fn has_secrets(&self) -> bool {
        self.curseforge_api_key.is_some() || self.github_token.is_some()
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be at least 1".to_string()));
        }
        if let Some(repo) = &self.index_repository {
            let valid = repo
                .split_once('/')
                .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'));
            if !valid {
                return Err(Error::Config(format!(
                    "index_repository must be owner/repo, got {repo:?}"
                )));
            }
        }
        if self.publish_branch.trim().is_empty() {
            return Err(Error::Config("publish_branch must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Resolves which config file (if any) to read
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Path of the config file to load, or `None` to use compiled defaults
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        default_config_path().filter(|path| path.exists())
    }

    /// Load the resolved config
    ///
    /// A missing file yields defaults with a warning; a file that exists but
    /// does not parse is an error.
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.resolve_path() else {
            info!("No config file found, using compiled defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using compiled defaults");
            return Ok(TomlConfig::default());
        }

        let config = load_toml_config(&path)?;
        info!(path = %path.display(), "Loaded config file");

        #[cfg(unix)]
        {
            if config.has_secrets() && check_toml_permissions_loose(&path)? {
                warn!(
                    path = %path.display(),
                    "Config file holds API credentials but is readable by other users (chmod 600)"
                );
            }
        }
        Ok(config)
    }

    /// Write `config` to the resolved path, or the platform default
    ///
    /// Refuses to replace an existing file. Returns the path written.
    pub fn init(&self, config: &TomlConfig) -> Result<PathBuf> {
        let path = self
            .resolve_path()
            .or_else(default_config_path)
            .ok_or_else(|| Error::Config("no config directory on this platform".to_string()))?;
        if path.exists() {
            return Err(Error::Config(format!(
                "{} already exists, not overwriting",
                path.display()
            )));
        }
        config.validate()?;
        write_toml_config(config, &path)?;
        info!(path = %path.display(), "Wrote config file");
        Ok(path)
    }
}

/// Platform config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("modcat").join("config.toml"))
}

/// Read and validate a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Write a TOML config atomically (temp file + rename)
///
/// On Unix the file is restricted to the owner (0600) since it may hold
/// API keys.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    std::fs::write(&tmp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&tmp_path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(&tmp_path, perms)?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(Error::Io(e));
    }

    Ok(())
}

/// True if group or other can read the config file
#[cfg(unix)]
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    Ok(mode & 0o077 != 0)
}
