//! Top-level error taxonomy. Each concern gets its own closed enum rather
//! than a single monolithic error type; only [`ConfigError`] and
//! [`SupervisorError`] ever reach `main` — every other error is caught,
//! logged, and counted at the worker boundary (see the module docs on
//! each worker).

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("input #{index} ({input_type}): {reason}")]
    InvalidInput {
        index: usize,
        input_type: String,
        reason: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue receive failed: {0}")]
    Receive(String),

    #[error("queue delete failed: {0}")]
    Delete(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("could not open object s3://{bucket}/{key}: {detail}")]
    Open {
        bucket: String,
        key: String,
        detail: String,
    },

    #[error("could not list bucket {bucket} (prefix {prefix:?}): {detail}")]
    List {
        bucket: String,
        prefix: String,
        detail: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("message body is not a valid object-notification envelope: {0}")]
    MalformedEnvelope(#[from] serde_json::Error),
}

/// Errors raised while turning validated [`crate::config::Config`] inputs
/// into runnable [`crate::crawler::Input`]s, before the crawler ever
/// starts a scan cycle.
#[derive(Debug, thiserror::Error)]
pub enum CrawlerError {
    #[error("input #{index} ({input_type}) has the same identity as an earlier input; give it distinguishing queues/buckets")]
    DuplicateInput { index: usize, input_type: String },

    #[error("input #{index} ({input_type}) could not construct its parser: {source}")]
    ParserConstruction {
        index: usize,
        input_type: String,
        #[source]
        source: log_parser::ParserConstructionError,
    },

    #[error("input #{index} ({input_type}) has an invalid key_regex_fields pattern: {source}")]
    KeyRegex {
        index: usize,
        input_type: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors that abort the whole process. In practice only raised from
/// `main`'s top-level wiring (config load, initial client construction,
/// crawler assembly); everything downstream of supervisor startup runs
/// until shutdown and reports failures through logging and metrics, not
/// this type.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Crawler(#[from] CrawlerError),

    #[error("failed to initialize cloud clients: {0}")]
    ClientInit(String),
}
