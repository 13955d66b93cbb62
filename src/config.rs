use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::MirrorError;
use crate::settings::{self, CleanupConfig};

fn default_telegram_bot_token() -> String {
    String::new()
}
fn default_data_dir() -> String {
    "./tgmirror.data".into()
}
fn default_web_enabled() -> bool {
    true
}
fn default_web_host() -> String {
    "127.0.0.1".into()
}
fn default_web_port() -> u16 {
    8000
}
fn default_cleanup_days() -> u32 {
    settings::DEFAULT_RETENTION_DAYS
}
fn default_cleanup_time() -> String {
    settings::DEFAULT_RUN_TIME.into()
}
fn default_dup_code_regex() -> String {
    settings::DEFAULT_DEDUP_PATTERN.into()
}

/// Bootstrap configuration, read once at startup from a YAML file with
/// environment overrides. The cleanup fields only seed the persisted
/// `CleanupConfig` on first run; after that the store copy wins.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_telegram_bot_token")]
    pub telegram_bot_token: String,
    #[serde(default)]
    pub dest_chat: i64,
    #[serde(default)]
    pub source_chats: Vec<i64>,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_web_enabled")]
    pub web_enabled: bool,
    #[serde(default = "default_web_host")]
    pub web_host: String,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    #[serde(default = "default_cleanup_days")]
    pub cleanup_days: u32,
    #[serde(default = "default_cleanup_time")]
    pub cleanup_time: String,
    #[serde(default = "default_dup_code_regex")]
    pub dup_code_regex: String,
}

impl Config {
    pub fn resolve_config_path() -> Result<Option<PathBuf>, MirrorError> {
        if let Ok(custom) = std::env::var("TGMIRROR_CONFIG") {
            if std::path::Path::new(&custom).exists() {
                return Ok(Some(PathBuf::from(custom)));
            }
            return Err(MirrorError::Config(format!(
                "TGMIRROR_CONFIG points to non-existent file: {custom}"
            )));
        }

        if std::path::Path::new("./tgmirror.config.yaml").exists() {
            return Ok(Some(PathBuf::from("./tgmirror.config.yaml")));
        }
        if std::path::Path::new("./tgmirror.config.yml").exists() {
            return Ok(Some(PathBuf::from("./tgmirror.config.yml")));
        }
        Ok(None)
    }

    /// Load config: YAML file if present, then env overrides, then
    /// validation. Runs entirely from env vars when no file exists.
    pub fn load() -> Result<Self, MirrorError> {
        let mut config: Config = match Self::resolve_config_path()? {
            Some(path) => {
                let path_str = path.to_string_lossy().to_string();
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    MirrorError::Config(format!("Failed to read {path_str}: {e}"))
                })?;
                serde_yaml::from_str(&content).map_err(|e| {
                    MirrorError::Config(format!("Failed to parse {path_str}: {e}"))
                })?
            }
            None => serde_yaml::from_str("{}")
                .map_err(|e| MirrorError::Config(format!("Failed to build defaults: {e}")))?,
        };
        config.apply_env_overrides()?;
        config.post_deserialize()?;
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) -> Result<(), MirrorError> {
        if let Ok(v) = std::env::var("TELEGRAM_BOT_TOKEN") {
            self.telegram_bot_token = v;
        }
        if let Ok(v) = std::env::var("DEST_CHAT") {
            self.dest_chat = v
                .trim()
                .parse()
                .map_err(|_| MirrorError::Config(format!("DEST_CHAT is not a chat id: {v}")))?;
        }
        if let Ok(v) = std::env::var("SOURCE_CHATS") {
            self.source_chats = parse_chat_list(&v)?;
        }
        if let Ok(v) = std::env::var("CLEANUP_DAYS") {
            self.cleanup_days = v
                .trim()
                .parse()
                .map_err(|_| MirrorError::Config(format!("CLEANUP_DAYS is not a number: {v}")))?;
        }
        if let Ok(v) = std::env::var("CLEANUP_TIME") {
            self.cleanup_time = v.trim().to_string();
        }
        if let Ok(v) = std::env::var("DUP_CODE_REGEX") {
            self.dup_code_regex = v;
        }
        Ok(())
    }

    /// Normalization and validation after file + env merging.
    pub(crate) fn post_deserialize(&mut self) -> Result<(), MirrorError> {
        if self.telegram_bot_token.trim().is_empty() {
            return Err(MirrorError::Config("telegram_bot_token is required".into()));
        }
        if self.dest_chat == 0 {
            return Err(MirrorError::Config("dest_chat is required".into()));
        }
        if self.source_chats.is_empty() {
            return Err(MirrorError::Config(
                "at least one source chat is required".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        self.source_chats.retain(|id| seen.insert(*id));
        if self.source_chats.contains(&self.dest_chat) {
            return Err(MirrorError::Config(
                "dest_chat must not also be a source chat".into(),
            ));
        }
        if self.data_dir.trim().is_empty() {
            self.data_dir = default_data_dir();
        }
        if self.web_host.trim().is_empty() {
            self.web_host = default_web_host();
        }
        // Seed values must be valid before they can reach the store.
        self.cleanup_seed().validate()?;
        Ok(())
    }

    /// Initial CleanupConfig for a fresh store.
    pub fn cleanup_seed(&self) -> CleanupConfig {
        CleanupConfig {
            retention_days: self.cleanup_days,
            run_time: self.cleanup_time.clone(),
            dedup_pattern: self.dup_code_regex.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Config {
            telegram_bot_token: "tok".into(),
            dest_chat: -1000,
            source_chats: vec![100],
            data_dir: "./tgmirror.data".into(),
            web_enabled: true,
            web_host: "127.0.0.1".into(),
            web_port: 8000,
            cleanup_days: default_cleanup_days(),
            cleanup_time: default_cleanup_time(),
            dup_code_regex: default_dup_code_regex(),
        }
    }
}

fn parse_chat_list(value: &str) -> Result<Vec<i64>, MirrorError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|_| {
                MirrorError::Config(format!("SOURCE_CHATS contains a non-numeric id: {part}"))
            })
        })
        .collect()
}
