//! Configuration loading and data folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML configuration file contents for a MasterFlow service.
///
/// Every field is optional in the file; callers apply environment
/// overrides and compiled defaults on top (ENV takes priority over TOML).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Data folder holding the database and audit logs
    pub data_dir: Option<String>,
    /// HTTP listen port
    pub listen_port: Option<u16>,
    /// Bearer token for the remote workflow API
    pub api_token: Option<String>,
    /// Session cookie injected into workflow parameters
    pub session_cookie: Option<String>,
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub harvest: HarvestSection,
}

/// `[workflow]` section: outbound client tuning
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkflowSection {
    pub endpoint: Option<String>,
    pub max_retries: Option<u32>,
    pub cooldown_ms: Option<u64>,
    pub min_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// `[harvest]` section: orchestration loop tuning
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HarvestSection {
    pub min_view_count: Option<i64>,
    pub topic_limit: Option<i64>,
    pub notes_per_topic: Option<i64>,
    pub comments_per_topic: Option<i64>,
    pub topic_delay_secs: Option<u64>,
    pub comment_delay_min_secs: Option<u64>,
    pub comment_delay_max_secs: Option<u64>,
}

/// Load a TOML config file, returning defaults when the file is absent.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Ok(TomlConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Default configuration file path for a service.
///
/// Linux checks `~/.config/mflow/<service>.toml` then
/// `/etc/mflow/<service>.toml`; macOS and Windows use the platform
/// config directory.
pub fn default_config_path(service: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", service);
    if cfg!(target_os = "linux") {
        if let Some(user_config) = dirs::config_dir().map(|d| d.join("mflow").join(&file_name)) {
            if user_config.exists() {
                return Some(user_config);
            }
        }
        let system_config = PathBuf::from("/etc/mflow").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
        dirs::config_dir().map(|d| d.join("mflow").join(&file_name))
    } else {
        dirs::config_dir().map(|d| d.join("mflow").join(&file_name))
    }
}

/// Resolve the data folder following the priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(
    cli_arg: Option<&str>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.data_dir {
        return PathBuf::from(path);
    }

    get_default_data_dir()
}

/// OS-dependent default data folder path
fn get_default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("mflow"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mflow"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("mflow"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mflow"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("mflow"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mflow"))
    } else {
        PathBuf::from("./mflow_data")
    }
}
