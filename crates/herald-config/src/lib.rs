use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use herald_types::{GroupId, UserId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
}

/// OneBot v11 connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneBotConfig {
    /// Base URL of the OneBot HTTP API (e.g. "http://127.0.0.1:5700").
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Access token sent as a bearer token, if the implementation requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Address the event webhook listens on.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Only react to messages that mention the bot or reply to it.
    #[serde(default = "default_true")]
    pub require_mention: bool,
    /// Timeout for a single API call, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://127.0.0.1:5700".to_string()
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for OneBotConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            access_token: None,
            listen: default_listen(),
            require_mention: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Top-level herald configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// Groups that may issue commands and receive delivery confirmations.
    #[serde(default)]
    pub admin_groups: Vec<GroupId>,
    /// Groups that messages may be delivered to.
    #[serde(default)]
    pub receiver_groups: Vec<GroupId>,
    /// Users allowed to issue commands. Empty means every member of an
    /// admin group is allowed.
    #[serde(default)]
    pub admins: Vec<UserId>,
    /// Directory holding the job queue and log files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// OneBot transport settings.
    #[serde(default)]
    pub onebot: OneBotConfig,
}

impl HeraldConfig {
    pub fn is_admin_group(&self, group_id: GroupId) -> bool {
        self.admin_groups.contains(&group_id)
    }

    pub fn is_receiver_group(&self, group_id: GroupId) -> bool {
        self.receiver_groups.contains(&group_id)
    }

    /// Whether `user_id` may issue commands. An empty admin list is open.
    pub fn is_authorized(&self, user_id: UserId) -> bool {
        self.admins.is_empty() || self.admins.contains(&user_id)
    }

    /// Resolve the data directory, defaulting to `~/.herald/data`.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join("data")),
        }
    }

    /// Path of the persistent job queue file.
    pub fn queue_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join("queue.json"))
    }
}

/// Resolve the herald config directory (~/.herald/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".herald"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.herald/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path.
pub fn load_config() -> Result<HeraldConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path.
///
/// A missing file is created with the default (empty) configuration so the
/// operator has a template to fill in.
pub fn load_config_from(path: &Path) -> Result<HeraldConfig, ConfigError> {
    if !path.exists() {
        let config = HeraldConfig::default();
        save_config_to(&config, path)?;
        tracing::info!("Created default config file at {}", path.display());
        return Ok(config);
    }

    let content = std::fs::read_to_string(path)?;
    let config: HeraldConfig = json5::from_str(&content)?;
    tracing::info!(
        admin_groups = ?config.admin_groups,
        receiver_groups = ?config.receiver_groups,
        admins = ?config.admins,
        "Config loaded"
    );
    Ok(config)
}

/// Write configuration to `path`, creating parent directories.
pub fn save_config_to(config: &HeraldConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HeraldConfig::default();
        assert!(config.admin_groups.is_empty());
        assert!(config.onebot.require_mention);
        assert_eq!(config.onebot.api_url, "http://127.0.0.1:5700");
    }

    #[test]
    fn test_json5_parse() {
        let json5_str = r#"{
            admin_groups: [100, 101],
            receiver_groups: [200],
            admins: [],
            data_dir: "/var/lib/herald",
            onebot: { api_url: "http://bot:5700", access_token: "s3cret" },
        }"#;
        let config: HeraldConfig = json5::from_str(json5_str).unwrap();
        assert_eq!(config.admin_groups, vec![100, 101]);
        assert!(config.is_receiver_group(200));
        assert!(!config.is_receiver_group(100));
        assert_eq!(config.onebot.access_token.as_deref(), Some("s3cret"));
        assert_eq!(config.onebot.listen, "127.0.0.1:8080");
        assert_eq!(
            config.queue_file().unwrap(),
            PathBuf::from("/var/lib/herald/queue.json")
        );
    }

    #[test]
    fn test_empty_admin_list_is_open() {
        let mut config = HeraldConfig::default();
        assert!(config.is_authorized(42));
        config.admins = vec![7];
        assert!(config.is_authorized(7));
        assert!(!config.is_authorized(42));
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json5");
        let config = load_config_from(&path).unwrap();
        assert!(config.admin_groups.is_empty());
        assert!(path.exists());

        // The generated file must load back.
        let again = load_config_from(&path).unwrap();
        assert_eq!(again.onebot.timeout_secs, 30);
    }
}
