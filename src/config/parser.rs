use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use super::ConfigError;
use super::validator;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub slack: SlackConfig,
    pub notifier: NotifierConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize)]
pub struct SlackConfig {
    #[serde(deserialize_with = "deserialize_secret")]
    pub bot_token: SecretString,
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    pub manager_report_time: String,
    pub manager_channel_id: String,
    #[serde(default)]
    pub manager_user_id: Option<String>,
    #[serde(default = "default_reminder_repeat_interval")]
    pub reminder_repeat_interval: u64,
    #[serde(default = "default_reminder_repeat_count")]
    pub reminder_repeat_count: u32,
    #[serde(default = "default_call_timeout")]
    pub call_timeout: u64,
    #[serde(default = "default_max_concurrent_channels")]
    pub max_concurrent_channels: usize,
}

impl NotifierConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn reminder_repeat_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_repeat_interval)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout)
    }

    /// Parsed digest time. Only valid after [`Config::validate`] succeeded.
    pub fn report_time(&self) -> Result<NaiveTime, ConfigError> {
        validator::parse_report_time(&self.manager_report_time)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        let url = self.connection_string();
        if url.starts_with("sqlite://") {
            DbType::Sqlite
        } else {
            DbType::Postgres
        }
    }

    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: default_web_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validator::validate(self)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("STANDUP_SLACK_BOT_TOKEN") {
            self.slack.bot_token = SecretString::from(value);
        }
        if let Ok(value) = std::env::var("STANDUP_MANAGER_CHANNEL_ID") {
            self.notifier.manager_channel_id = value;
        }
        if let Ok(value) = std::env::var("DATABASE_URL") {
            self.database.url = Some(value);
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn default_slack_api_url() -> String {
    "https://slack.com/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_check_interval() -> u64 {
    60
}

fn default_reminder_repeat_interval() -> u64 {
    60
}

fn default_reminder_repeat_count() -> u32 {
    5
}

fn default_call_timeout() -> u64 {
    30
}

fn default_max_concurrent_channels() -> usize {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_web_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9105
}
