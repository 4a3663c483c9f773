//! Settings from `config.toml`, overridden by `RECRUITOPS_*` environment variables.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_RANGE: &str = "mtd";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`.
    pub url: Option<String>,
    pub anon_key: Option<String>,
    /// Signed-in user's JWT. Falls back to the anon key when absent.
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            access_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub user_id: Option<Uuid>,
    pub local_db: Option<PathBuf>,
    pub default_range: Option<String>,
}

impl Config {
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "recruitops")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reads the config file (if any) and applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RECRUITOPS_URL") {
            self.backend.url = Some(url);
        }
        if let Some(key) = lookup("RECRUITOPS_ANON_KEY") {
            self.backend.anon_key = Some(key);
        }
        if let Some(token) = lookup("RECRUITOPS_ACCESS_TOKEN") {
            self.backend.access_token = Some(token);
        }
        if let Some(id) = lookup("RECRUITOPS_USER_ID") {
            let id = id
                .trim()
                .parse()
                .with_context(|| format!("RECRUITOPS_USER_ID is not a UUID: {}", id))?;
            self.user_id = Some(id);
        }
        if let Some(path) = lookup("RECRUITOPS_LOCAL_DB") {
            self.local_db = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn range_name(&self) -> &str {
        self.default_range.as_deref().unwrap_or(DEFAULT_RANGE)
    }

    pub fn require_user(&self) -> Result<Uuid> {
        self.user_id.ok_or_else(|| {
            anyhow!("No user id configured. Pass --user, set RECRUITOPS_USER_ID, or add user_id to config.toml")
        })
    }
}

impl BackendConfig {
    pub fn require_url(&self) -> Result<&str> {
        self.url
            .as_deref()
            .ok_or_else(|| anyhow!("Backend URL not configured. Set RECRUITOPS_URL or backend.url in config.toml"))
    }

    pub fn require_anon_key(&self) -> Result<&str> {
        self.anon_key.as_deref().ok_or_else(|| {
            anyhow!("Backend API key not configured. Set RECRUITOPS_ANON_KEY or backend.anon_key in config.toml")
        })
    }
}
