//! Configuration resolution for modcat-indexer
//!
//! Secrets resolve ENV → TOML. Everything else comes from the TOML file
//! with command-line overrides applied on top.

use modcat_common::config::TomlConfig;
use modcat_common::{Error, Result};
use tracing::{info, warn};

use crate::services::registry::RepositorySlug;

pub const CURSEFORGE_API_KEY_ENV: &str = "MODCAT_CURSEFORGE_API_KEY";
pub const GITHUB_TOKEN_ENV: &str = "MODCAT_GITHUB_TOKEN";

/// Validate a secret (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve one secret from the environment, then the TOML config
///
/// Returns `None` when neither source holds a valid value.
pub fn resolve_secret(name: &str, env_var: &str, toml_value: Option<&String>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in both environment and TOML config. Using environment (highest priority).",
            name
        );
    }

    if let Some(value) = env_value {
        info!("{} loaded from environment variable", name);
        return Some(value);
    }

    if let Some(value) = toml_value {
        info!("{} loaded from TOML config", name);
        return Some(value.clone());
    }

    None
}

pub fn resolve_curseforge_api_key(config: &TomlConfig) -> Result<String> {
    resolve_secret(
        "CurseForge API key",
        CURSEFORGE_API_KEY_ENV,
        config.curseforge_api_key.as_ref(),
    )
    .ok_or_else(|| {
        Error::Config(format!(
            "CurseForge API key not configured. Set {CURSEFORGE_API_KEY_ENV} or \
             curseforge_api_key in the config file"
        ))
    })
}

pub fn resolve_github_token(config: &TomlConfig) -> Result<String> {
    resolve_secret("GitHub token", GITHUB_TOKEN_ENV, config.github_token.as_ref()).ok_or_else(|| {
        Error::Config(format!(
            "GitHub token not configured. Set {GITHUB_TOKEN_ENV} or github_token in the config file"
        ))
    })
}

/// Command-line overrides of the file config
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub prefer_curseforge: bool,
    pub dry_run: bool,
    pub skip_crawl: bool,
    pub max_new: Option<usize>,
}

/// Fully resolved settings of one run
///
/// Not `Debug`: holds secrets.
#[derive(Clone)]
pub struct IndexerConfig {
    pub index_repository: RepositorySlug,
    pub publish_branch: String,
    pub merge_without_pr: bool,
    pub prefer_curseforge: bool,
    pub worker_count: usize,
    pub dry_run: bool,
    pub skip_crawl: bool,
    pub max_new: Option<usize>,
    pub curseforge_api_key: String,
    pub github_token: String,
}

impl IndexerConfig {
    pub fn resolve(config: &TomlConfig, overrides: &CliOverrides) -> Result<Self> {
        config.validate()?;

        let repository = config
            .index_repository
            .as_deref()
            .ok_or_else(|| Error::Config("index_repository is not configured".to_string()))?;
        let index_repository = RepositorySlug::parse(repository)
            .ok_or_else(|| Error::Config(format!("index_repository must be owner/repo, got {repository:?}")))?;

        Ok(Self {
            index_repository,
            publish_branch: config.publish_branch.clone(),
            merge_without_pr: config.merge_without_pr,
            prefer_curseforge: config.prefer_curseforge || overrides.prefer_curseforge,
            worker_count: config.worker_count,
            dry_run: overrides.dry_run,
            skip_crawl: overrides.skip_crawl,
            max_new: overrides.max_new,
            curseforge_api_key: resolve_curseforge_api_key(config)?,
            github_token: resolve_github_token(config)?,
        })
    }
}
