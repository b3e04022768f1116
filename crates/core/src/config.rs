//! Config file parsing for `~/.config/readbox/config.toml`.
//!
//! Use `parse_options_from_config` and `extract_options_from_config` to build
//! pipeline options from the loaded config so security and asset settings apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::extract::{ExtractOptions, DEFAULT_ASSET_ROUTE};
use crate::ingest::ParseOptions;
use crate::security::SecurityLimits;

/// Overrides `storage.root`.
pub const STORAGE_ROOT_ENV: &str = "READBOX_STORAGE_ROOT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assets: AssetConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploads and covers. Defaults to the platform data dir.
    pub root: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "default_asset_route")]
    pub route: String,
    #[serde(default = "default_true")]
    pub extract_cover: bool,
}

fn default_asset_route() -> String {
    DEFAULT_ASSET_ROUTE.to_string()
}
fn default_true() -> bool {
    true
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            route: default_asset_route(),
            extract_cover: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_file_size_mb: Option<u64>,
    pub max_compression_ratio: Option<u64>,
    pub max_file_count: Option<u64>,
}

impl AppConfig {
    /// Apply environment overrides, reading variables through `var`.
    pub fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(root) = var(STORAGE_ROOT_ENV).filter(|r| !r.is_empty()) {
            self.storage.root = Some(root);
        }
        self
    }

    pub fn storage_root(&self) -> PathBuf {
        match &self.storage.root {
            Some(root) => PathBuf::from(root),
            None => dirs::data_dir()
                .map(|p| p.join("readbox"))
                .unwrap_or_else(|| PathBuf::from("readbox-data")),
        }
    }
}

/// Load config from the default path, then apply environment overrides.
pub fn load_config() -> AppConfig {
    let config = match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    };
    config.with_env_overrides(|name| std::env::var(name).ok())
}

/// Load config from `path`. A missing file gives the defaults; an invalid
/// one is reported and also gives the defaults.
pub fn load_config_from(path: &Path) -> AppConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return AppConfig::default(),
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
            AppConfig::default()
        }
    }
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("readbox");
        p.push("config.toml");
        p
    })
}

/// Build security limits from config. Uses defaults for any unset values.
pub fn security_limits_from_config(c: &SecurityConfig) -> SecurityLimits {
    let mut limits = SecurityLimits::default();
    if let Some(mb) = c.max_file_size_mb {
        limits.max_resource_size_bytes = mb.saturating_mul(1024).saturating_mul(1024);
    }
    if let Some(r) = c.max_compression_ratio {
        limits.max_compression_ratio = r;
    }
    if let Some(n) = c.max_file_count {
        limits.max_file_count = n;
    }
    limits
}

pub fn parse_options_from_config(cfg: &AppConfig) -> ParseOptions {
    ParseOptions {
        limits: security_limits_from_config(&cfg.security),
        extract_cover: cfg.assets.extract_cover,
    }
}

pub fn extract_options_from_config(cfg: &AppConfig) -> ExtractOptions {
    ExtractOptions {
        asset_route: cfg.assets.route.clone(),
        limits: security_limits_from_config(&cfg.security),
    }
}
