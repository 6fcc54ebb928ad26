//! Persistent CLI configuration and environment overrides.

use std::path::{Path, PathBuf};

use cram_core::config::{RemoteConfig, SyncSettings};
use cram_core::util::normalize_text_option;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

const APP_DIR: &str = "cram";
const CONFIG_FILE_NAME: &str = "cli-config.json";
const DATABASE_FILE_NAME: &str = "cram.db";

pub const ENV_SUPABASE_URL: &str = "CRAM_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "CRAM_SUPABASE_ANON_KEY";
pub const ENV_DB_PATH: &str = "CRAM_DB_PATH";
pub const ENV_OFFLINE: &str = "CRAM_OFFLINE";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub pull_page_size: Option<usize>,
    #[serde(default)]
    pub max_pull_pages: Option<usize>,
    /// Skip the network entirely, set from `CRAM_OFFLINE`
    #[serde(skip)]
    pub offline: bool,
}

const fn default_config_version() -> u32 {
    1
}

fn config_dir() -> Result<PathBuf, CliError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| CliError::Config("Failed to resolve config directory".to_string()))
}

pub fn default_config_path() -> Result<PathBuf, CliError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

fn data_dir() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

/// Directory holding the cross-process sync lock files
pub fn default_lock_dir() -> Result<PathBuf, CliError> {
    Ok(data_dir()?.join("locks"))
}

/// Whether an environment flag is set to a truthy value
pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl CliConfig {
    /// Load from the default path and apply process environment overrides.
    pub fn load() -> Result<Self, CliError> {
        Ok(Self::load_from_path(&default_config_path()?)?.with_env(|key| std::env::var(key).ok()))
    }

    pub fn load_from_path(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            CliError::Config(format!(
                "Failed to read config at {}: {}",
                path.display(),
                error
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            CliError::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), CliError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Apply `CRAM_*` overrides read through `lookup`.
    #[must_use]
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup(ENV_SUPABASE_URL)) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY)) {
            self.supabase_anon_key = Some(key);
        }
        if let Some(path) = normalize_text_option(lookup(ENV_DB_PATH)) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = lookup(ENV_OFFLINE) {
            self.offline = is_truthy(&flag);
        }
        self
    }

    /// Remote store settings, `None` when neither part is configured
    pub fn remote(&self) -> Result<Option<RemoteConfig>, CliError> {
        RemoteConfig::from_optional(self.supabase_url.clone(), self.supabase_anon_key.clone())
            .map_err(CliError::Config)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        let mut settings = SyncSettings::default();
        if let Some(size) = self.pull_page_size {
            settings = settings.with_pull_page_size(size);
        }
        if let Some(pages) = self.max_pull_pages {
            settings = settings.with_max_pull_pages(pages);
        }
        settings
    }

    /// Database path: the explicit flag, then config/env, then the data dir.
    pub fn resolve_db_path(&self, explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
        if let Some(path) = explicit.or_else(|| self.db_path.clone()) {
            return Ok(path);
        }
        Ok(data_dir()?.join(DATABASE_FILE_NAME))
    }

    fn normalize(&mut self) {
        self.supabase_url = normalize_text_option(self.supabase_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.take());
        self.pull_page_size = self.pull_page_size.filter(|size| *size > 0);
        self.max_pull_pages = self.max_pull_pages.filter(|pages| *pages > 0);
    }
}
