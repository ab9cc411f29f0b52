//! Turns validated configuration inputs into running scan loops: each
//! [`Input`] periodically pushes fresh work descriptors onto `SQSCh` or
//! `S3ListCh`, and the [`Crawler`] owns the set of spawned tasks as a
//! group, start to stop. Grounded in the original source's
//! `cron.Cron`-based scheduler (`beater/s3logsbeat.go`'s `addCronInput`),
//! generalized to a plain `tokio::time::interval` loop per input instead
//! of a shared cron scheduler, since each input already has the single
//! `poll_frequency` the original also reduces cron expressions to.

use std::{
    collections::HashSet,
    hash::{Hash, Hasher},
    sync::Arc,
    time::Duration,
};

use aws_sdk_sqs::Client as SqsApiClient;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    channels::{InputMetadata, S3ListDescriptor, SqsDescriptor},
    config::{Config, InputConfig},
    errors::CrawlerError,
    queue::{QueueClient, SqsQueueClient},
    shutdown::ShutdownSignal,
};

/// One scheduled source of work. `run` owns its own periodic loop
/// (including honoring `once`) and returns once shutdown is signaled or,
/// for a `once` input, after its single scan completes.
#[async_trait::async_trait]
pub trait Input: Send + Sync {
    /// Stable across otherwise-identical inputs so the crawler can reject
    /// two configuration entries that would scan the exact same source
    /// twice.
    fn id(&self) -> u64;
    fn type_name(&self) -> &'static str;
    fn enabled(&self) -> bool;
    async fn run(&self, shutdown: ShutdownSignal);
}

/// Computes a stable identity for an input from the parts of its
/// configuration that determine what it scans, so two inputs configured
/// identically collide (and are rejected as duplicates) while inputs
/// differing in queues/buckets, format, or schedule do not. The original
/// source derives its input identity from a hash of the whole resolved
/// beats module config; lacking that framework here, this hashes the
/// same fields by hand.
fn input_identity(type_name: &str, sources: &[String], log_format: &str, poll_frequency: Duration) -> u64 {
    let mut sorted: Vec<&str> = sources.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    type_name.hash(&mut hasher);
    sorted.hash(&mut hasher);
    log_format.hash(&mut hasher);
    poll_frequency.hash(&mut hasher);
    hasher.finish()
}

pub struct SqsInput {
    id: u64,
    enabled: bool,
    once: bool,
    poll_frequency: Duration,
    queues: Vec<Arc<dyn QueueClient>>,
    metadata: InputMetadata,
    keep_message: bool,
    sqs_tx: mpsc::Sender<SqsDescriptor>,
}

#[async_trait::async_trait]
impl Input for SqsInput {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &'static str {
        "sqs"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn run(&self, mut shutdown: ShutdownSignal) {
        loop {
            for queue in &self.queues {
                let descriptor = SqsDescriptor {
                    queue: Arc::clone(queue),
                    metadata: self.metadata.clone(),
                    keep_message: self.keep_message,
                };
                tokio::select! {
                    result = self.sqs_tx.send(descriptor) => {
                        if result.is_err() {
                            return;
                        }
                    }
                    _ = shutdown.triggered() => return,
                }
            }

            if self.once {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_frequency) => {}
                _ = shutdown.triggered() => return,
            }
        }
    }
}

pub struct S3Input {
    id: u64,
    enabled: bool,
    once: bool,
    poll_frequency: Duration,
    sources: Vec<(String, String)>,
    since: Option<chrono::DateTime<chrono::Utc>>,
    to: Option<chrono::DateTime<chrono::Utc>>,
    metadata: InputMetadata,
    s3_list_tx: mpsc::Sender<S3ListDescriptor>,
}

#[async_trait::async_trait]
impl Input for S3Input {
    fn id(&self) -> u64 {
        self.id
    }

    fn type_name(&self) -> &'static str {
        "s3"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn run(&self, mut shutdown: ShutdownSignal) {
        loop {
            for (bucket, prefix) in &self.sources {
                let descriptor = S3ListDescriptor {
                    bucket: bucket.clone(),
                    prefix: prefix.clone(),
                    since: self.since,
                    to: self.to,
                    metadata: self.metadata.clone(),
                };
                tokio::select! {
                    result = self.s3_list_tx.send(descriptor) => {
                        if result.is_err() {
                            return;
                        }
                    }
                    _ = shutdown.triggered() => return,
                }
            }

            if self.once {
                return;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_frequency) => {}
                _ = shutdown.triggered() => return,
            }
        }
    }
}

/// Splits a configured bucket entry into `(bucket, prefix)`: `"bucket"`
/// alone lists the whole bucket; `"bucket/some/prefix"` restricts the
/// listing to that prefix, mirroring how the original source's
/// `S3Bucket` string is interpreted.
fn split_bucket_and_prefix(entry: &str) -> (String, String) {
    match entry.split_once('/') {
        Some((bucket, prefix)) => (bucket.to_string(), prefix.to_string()),
        None => (entry.to_string(), String::new()),
    }
}

/// Only `sqs` and `s3` inputs are currently recognized; this gate exists
/// so adding a new [`InputConfig`] variant without updating the crawler
/// fails loudly instead of silently scanning nothing.
const ALLOWED_INPUT_TYPES: &[&str] = &["sqs", "s3"];

/// Builds one [`Input`] per enabled, non-duplicate entry in `config`,
/// wiring each to the supplied channel senders. Disabled inputs are kept
/// out of the crawler entirely (not merely skipped per-scan).
pub fn build_inputs(
    config: &Config,
    sqs_client: &SqsApiClient,
    sqs_tx: mpsc::Sender<SqsDescriptor>,
    s3_list_tx: mpsc::Sender<S3ListDescriptor>,
    keep_sqs_messages: bool,
) -> Result<Vec<Arc<dyn Input>>, CrawlerError> {
    let mut inputs: Vec<Arc<dyn Input>> = Vec::new();
    let mut seen_ids: HashSet<u64> = HashSet::new();

    for (index, input_config) in config.inputs.iter().enumerate() {
        let input_type = input_config.type_name();
        if !ALLOWED_INPUT_TYPES.contains(&input_type) {
            continue;
        }

        let common = input_config.common();
        if !common.enabled {
            continue;
        }

        let format_options = log_parser::FormatOptions {
            timestamp_field: common.log_format_options.get("timestamp_field").cloned(),
            timestamp_layout: common.log_format_options.get("timestamp_layout").cloned(),
        };
        let parser = log_parser::named_parser(&common.log_format, &format_options).map_err(|source| {
            CrawlerError::ParserConstruction {
                index,
                input_type: input_type.to_string(),
                source,
            }
        })?;

        let key_regex_fields = common
            .key_regex_fields
            .as_deref()
            .map(regex::Regex::new)
            .transpose()
            .map_err(|source| CrawlerError::KeyRegex {
                index,
                input_type: input_type.to_string(),
                source,
            })?;

        let metadata = InputMetadata {
            parser,
            key_regex_fields,
            fields: common.fields.clone(),
            input_type,
        };

        let input: Arc<dyn Input> = match input_config {
            InputConfig::Sqs(sqs_config) => {
                let id = input_identity(
                    input_type,
                    &sqs_config.queues_url,
                    &common.log_format,
                    common.poll_frequency,
                );
                if !seen_ids.insert(id) {
                    return Err(CrawlerError::DuplicateInput {
                        index,
                        input_type: input_type.to_string(),
                    });
                }

                let queues = sqs_config
                    .queues_url
                    .iter()
                    .map(|url| -> Arc<dyn QueueClient> {
                        Arc::new(SqsQueueClient::new(sqs_client.clone(), url.clone()))
                    })
                    .collect();

                Arc::new(SqsInput {
                    id,
                    enabled: common.enabled,
                    once: common.once,
                    poll_frequency: common.poll_frequency,
                    queues,
                    metadata,
                    keep_message: keep_sqs_messages,
                    sqs_tx: sqs_tx.clone(),
                })
            }
            InputConfig::S3(s3_config) => {
                let id = input_identity(
                    input_type,
                    &s3_config.buckets,
                    &common.log_format,
                    common.poll_frequency,
                );
                if !seen_ids.insert(id) {
                    return Err(CrawlerError::DuplicateInput {
                        index,
                        input_type: input_type.to_string(),
                    });
                }

                let sources = s3_config.buckets.iter().map(|entry| split_bucket_and_prefix(entry)).collect();

                Arc::new(S3Input {
                    id,
                    enabled: common.enabled,
                    once: common.once,
                    poll_frequency: common.poll_frequency,
                    sources,
                    since: s3_config.since,
                    to: s3_config.to,
                    metadata,
                    s3_list_tx: s3_list_tx.clone(),
                })
            }
        };

        inputs.push(input);
    }

    Ok(inputs)
}

/// Runs every built input concurrently and exposes start/stop/drain as a
/// single unit, per the original source's cron scheduler being started
/// and stopped as one (`cron.Start()`/`cron.Stop()`).
pub struct Crawler {
    handles: Vec<JoinHandle<()>>,
}

impl Crawler {
    /// Spawns a task per enabled input. Inputs are already deduplicated
    /// by [`build_inputs`]; this constructor trusts that invariant rather
    /// than re-checking it.
    pub fn start(inputs: Vec<Arc<dyn Input>>, shutdown: ShutdownSignal) -> Self {
        let handles = inputs
            .into_iter()
            .filter(|input| input.enabled())
            .map(|input| {
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    tracing::info!(input_type = input.type_name(), id = input.id(), "input started");
                    input.run(shutdown).await;
                    tracing::info!(input_type = input.type_name(), id = input.id(), "input finished");
                })
            })
            .collect();
        Self { handles }
    }

    /// Resolves once every input has returned: for a signaled shutdown
    /// this happens as soon as each input observes the signal; for
    /// once-mode it happens naturally once every input's single scan
    /// cycle completes.
    pub async fn wait_for_completion(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "input task panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_source_order() {
        let a = input_identity("sqs", &["q1".to_string(), "q2".to_string()], "alb", Duration::from_secs(30));
        let b = input_identity("sqs", &["q2".to_string(), "q1".to_string()], "alb", Duration::from_secs(30));
        assert_eq!(a, b);
    }

    #[test]
    fn identity_distinguishes_different_formats() {
        let a = input_identity("sqs", &["q1".to_string()], "alb", Duration::from_secs(30));
        let b = input_identity("sqs", &["q1".to_string()], "json", Duration::from_secs(30));
        assert_ne!(a, b);
    }

    #[test]
    fn bucket_prefix_splits_on_first_slash() {
        assert_eq!(
            split_bucket_and_prefix("my-bucket/logs/2024"),
            ("my-bucket".to_string(), "logs/2024".to_string())
        );
        assert_eq!(split_bucket_and_prefix("my-bucket"), ("my-bucket".to_string(), String::new()));
    }
}
