use chrono::NaiveTime;
use secrecy::ExposeSecret;
use thiserror::Error;

use super::Config;
use crate::utils::clock;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid time of day for {field}: {value:?} (expected HH:MM)")]
    InvalidTime { field: &'static str, value: String },
}

pub(super) fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.slack.bot_token.expose_secret().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "slack.bot_token cannot be empty".to_string(),
        ));
    }

    if config.notifier.manager_channel_id.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "notifier.manager_channel_id cannot be empty".to_string(),
        ));
    }

    parse_report_time(&config.notifier.manager_report_time)?;

    if config.notifier.check_interval == 0 {
        return Err(ConfigError::InvalidConfig(
            "notifier.check_interval must be at least 1 second".to_string(),
        ));
    }

    // Deadlines and the digest are matched to the minute.
    if config.notifier.check_interval > 60 {
        return Err(ConfigError::InvalidConfig(
            "notifier.check_interval must not exceed 60 seconds".to_string(),
        ));
    }

    if config.notifier.reminder_repeat_interval == 0 {
        return Err(ConfigError::InvalidConfig(
            "notifier.reminder_repeat_interval must be at least 1 second".to_string(),
        ));
    }

    if config.notifier.call_timeout == 0 {
        return Err(ConfigError::InvalidConfig(
            "notifier.call_timeout must be at least 1 second".to_string(),
        ));
    }

    if config.notifier.max_concurrent_channels == 0 {
        return Err(ConfigError::InvalidConfig(
            "notifier.max_concurrent_channels must be at least 1".to_string(),
        ));
    }

    if config.database.connection_string().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "database connection string cannot be empty".to_string(),
        ));
    }

    if config.web.enabled && config.web.port == 0 {
        return Err(ConfigError::InvalidConfig(
            "web.port must be between 1 and 65535".to_string(),
        ));
    }

    Ok(())
}

pub(super) fn parse_report_time(value: &str) -> Result<NaiveTime, ConfigError> {
    clock::parse_clock(value).ok_or_else(|| ConfigError::InvalidTime {
        field: "notifier.manager_report_time",
        value: value.to_string(),
    })
}
