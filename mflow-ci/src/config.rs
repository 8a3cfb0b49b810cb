//! Configuration resolution for mflow-ci
//!
//! Per-field priority: environment variable, then TOML file, then
//! compiled default. The data folder additionally honors a command-line
//! override. Secrets (API token, session cookie) warn when defined in
//! multiple sources.

use mflow_common::config::{default_config_path, load_toml_config, resolve_data_dir, TomlConfig};
use mflow_common::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::services::harvester::HarvestParams;
use crate::services::workflow_client::ClientConfig;

/// Fixed remote workflow endpoint (overridable for tests and proxies)
pub const DEFAULT_ENDPOINT: &str = "https://api.coze.cn/v1/workflow/run";

const DEFAULT_LISTEN_PORT: u16 = 5739;

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub listen_port: u16,
    /// None when no API token is configured (harvesting disabled)
    pub client: Option<ClientConfig>,
    pub harvest: HarvestParams,
}

/// Resolve the complete service configuration
pub fn resolve_settings(cli_data_dir: Option<&str>) -> Result<IngestSettings> {
    let toml_config = match config_file_path() {
        Some(path) => load_toml_config(&path)?,
        None => TomlConfig::default(),
    };

    let data_dir = resolve_data_dir(cli_data_dir, "MFLOW_DATA_DIR", &toml_config);
    let db_path = data_dir.join("mflow.db");

    let listen_port = env_u16("MFLOW_CI_PORT")
        .or(toml_config.listen_port)
        .unwrap_or(DEFAULT_LISTEN_PORT);

    let client = resolve_api_token(&toml_config).map(|api_token| ClientConfig {
        endpoint: toml_config
            .workflow
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        api_token,
        session_cookie: resolve_session_cookie(&toml_config),
        max_retries: toml_config.workflow.max_retries.unwrap_or(3),
        cooldown: Duration::from_millis(toml_config.workflow.cooldown_ms.unwrap_or(60_000)),
        min_interval: Duration::from_millis(toml_config.workflow.min_interval_ms.unwrap_or(1_000)),
        timeout: Duration::from_secs(toml_config.workflow.timeout_secs.unwrap_or(30)),
        audit_dir: data_dir.join("audit"),
    });

    Ok(IngestSettings {
        data_dir,
        db_path,
        listen_port,
        client,
        harvest: harvest_params(&toml_config),
    })
}

/// Resolve the workflow API token: ENV -> TOML
pub fn resolve_api_token(toml_config: &TomlConfig) -> Option<String> {
    let env_token = std::env::var("MFLOW_API_TOKEN")
        .ok()
        .filter(|t| is_valid_key(t));
    let toml_token = toml_config.api_token.clone().filter(|t| is_valid_key(t));

    if env_token.is_some() && toml_token.is_some() {
        warn!(
            "Workflow API token found in both environment and TOML. Using environment (highest priority)."
        );
    }

    if let Some(token) = env_token {
        info!("Workflow API token loaded from environment");
        return Some(token);
    }
    if let Some(token) = toml_token {
        info!("Workflow API token loaded from TOML config");
        return Some(token);
    }
    None
}

/// Resolve the shared session cookie: ENV -> TOML
pub fn resolve_session_cookie(toml_config: &TomlConfig) -> Option<String> {
    let env_cookie = std::env::var("MFLOW_SESSION_COOKIE")
        .ok()
        .filter(|c| is_valid_key(c));
    let toml_cookie = toml_config.session_cookie.clone().filter(|c| is_valid_key(c));

    if env_cookie.is_some() && toml_cookie.is_some() {
        warn!(
            "Session cookie found in both environment and TOML. Using environment (highest priority)."
        );
    }

    env_cookie.or(toml_cookie)
}

/// Validate a secret value (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn harvest_params(toml_config: &TomlConfig) -> HarvestParams {
    let defaults = HarvestParams::default();
    let section = &toml_config.harvest;
    HarvestParams {
        min_view_count: section.min_view_count.unwrap_or(defaults.min_view_count),
        topic_limit: section.topic_limit.unwrap_or(defaults.topic_limit),
        notes_per_topic: section.notes_per_topic.unwrap_or(defaults.notes_per_topic),
        comments_per_topic: section
            .comments_per_topic
            .map(|n| n.max(0) as usize)
            .unwrap_or(defaults.comments_per_topic),
        topic_delay: section
            .topic_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.topic_delay),
        comment_delay_min: section
            .comment_delay_min_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.comment_delay_min),
        comment_delay_max: section
            .comment_delay_max_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.comment_delay_max),
    }
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MFLOW_CI_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path("mflow-ci")
}

fn env_u16(name: &str) -> Option<u16> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
