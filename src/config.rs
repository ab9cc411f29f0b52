//! Typed, `serde`-deserializable configuration, loaded from TOML and
//! validated before any pipeline component starts (fail fast, per the
//! rest of this ecosystem's config surfaces).

use std::{collections::BTreeMap, path::Path, time::Duration};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub inputs: Vec<InputConfig>,
    #[serde(with = "humantime_duration", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` `EnvFilter` directive string, e.g. `"info"` or
    /// `"logshipper=debug,aws_sdk_s3=warn"`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InputConfig {
    Sqs(SqsInputConfig),
    S3(S3InputConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommonInputConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(with = "humantime_duration")]
    pub poll_frequency: Duration,
    pub log_format: String,
    #[serde(default)]
    pub log_format_options: BTreeMap<String, String>,
    #[serde(default)]
    pub key_regex_fields: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub once: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqsInputConfig {
    #[serde(flatten)]
    pub common: CommonInputConfig,
    pub queues_url: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3InputConfig {
    #[serde(flatten)]
    pub common: CommonInputConfig,
    pub buckets: Vec<String>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl InputConfig {
    pub fn common(&self) -> &CommonInputConfig {
        match self {
            InputConfig::Sqs(c) => &c.common,
            InputConfig::S3(c) => &c.common,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            InputConfig::Sqs(_) => "sqs",
            InputConfig::S3(_) => "s3",
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (index, input) in self.inputs.iter().enumerate() {
            let common = input.common();
            if common.poll_frequency.is_zero() {
                return Err(ConfigError::InvalidInput {
                    index,
                    input_type: input.type_name().to_string(),
                    reason: "poll_frequency must be greater than zero".to_string(),
                });
            }
            if common.log_format.is_empty() {
                return Err(ConfigError::InvalidInput {
                    index,
                    input_type: input.type_name().to_string(),
                    reason: "log_format is required".to_string(),
                });
            }
            if let Some(pattern) = &common.key_regex_fields {
                if regex::Regex::new(pattern).is_err() {
                    return Err(ConfigError::InvalidInput {
                        index,
                        input_type: input.type_name().to_string(),
                        reason: format!("key_regex_fields is not a valid regex: {pattern}"),
                    });
                }
            }
            match input {
                InputConfig::Sqs(c) if c.queues_url.is_empty() => {
                    return Err(ConfigError::InvalidInput {
                        index,
                        input_type: "sqs".to_string(),
                        reason: "queues_url must not be empty".to_string(),
                    });
                }
                InputConfig::Sqs(c) => {
                    for queue_url in &c.queues_url {
                        if url::Url::parse(queue_url).is_err() {
                            return Err(ConfigError::InvalidInput {
                                index,
                                input_type: "sqs".to_string(),
                                reason: format!("queues_url entry is not a valid URL: {queue_url}"),
                            });
                        }
                    }
                }
                InputConfig::S3(c) if c.buckets.is_empty() => {
                    return Err(ConfigError::InvalidInput {
                        index,
                        input_type: "s3".to_string(),
                        reason: "buckets must not be empty".to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// `humantime`-free `Duration` (de)serialization: accepts a plain integer
/// number of seconds, matching the Go original's `time.Duration` config
/// surface closely enough without pulling in an extra parsing crate.
mod humantime_duration {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_sqs_input_with_no_queues() {
        let toml = r#"
            [[inputs]]
            type = "sqs"
            poll_frequency = 30
            log_format = "alb"
            queues_url = []
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_poll_frequency() {
        let toml = r#"
            [[inputs]]
            type = "s3"
            poll_frequency = 0
            log_format = "cloudfront-web"
            buckets = ["my-bucket"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_sqs_input_with_an_unparseable_queue_url() {
        let toml = r#"
            [[inputs]]
            type = "sqs"
            poll_frequency = 30
            log_format = "alb"
            queues_url = ["not a url"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_a_minimal_valid_sqs_input() {
        let toml = r#"
            shutdown_timeout = 15

            [[inputs]]
            type = "sqs"
            poll_frequency = 30
            log_format = "alb"
            queues_url = ["https://sqs.example/my-queue"]
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(15));
    }
}
