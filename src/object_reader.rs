//! Fixed-size pool draining `S3Ch`: opens each referenced object for
//! streaming read, runs its assigned parser line-by-line, and publishes
//! every resulting event to the sink. Grounded in the original source's
//! `worker/s3reader.go`; the per-line streaming loop itself is driven
//! directly here (rather than through [`log_parser::Parser::parse`],
//! which wants a synchronous `BufRead`) since the reader is async.

use std::sync::Arc;

use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, Mutex},
};

use crate::{
    active_counter::ActiveCounter,
    channels::{InputMetadata, ObjectWork},
    event::{EventHandle, PublishedEvent},
    metrics,
    object_store::ObjectStore,
    sink::Sink,
};
use log_parser::{LineOutcome, Value};

/// Default worker count (`W_read`).
pub const OBJECT_READER_WORKERS: usize = 5;

pub struct ObjectReaderPool {
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn Sink>,
    s3_objects_active: Arc<ActiveCounter>,
    events_active: Arc<ActiveCounter>,
}

impl ObjectReaderPool {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn Sink>,
        s3_objects_active: Arc<ActiveCounter>,
        events_active: Arc<ActiveCounter>,
    ) -> Self {
        Self {
            store,
            sink,
            s3_objects_active,
            events_active,
        }
    }

    /// Spawns `OBJECT_READER_WORKERS` tasks sharing `s3_rx`.
    pub fn start(&self, s3_rx: mpsc::Receiver<ObjectWork>) -> Vec<tokio::task::JoinHandle<()>> {
        let shared_rx = Arc::new(Mutex::new(s3_rx));

        (0..OBJECT_READER_WORKERS)
            .map(|worker_id| {
                let shared_rx = Arc::clone(&shared_rx);
                let store = Arc::clone(&self.store);
                let sink = Arc::clone(&self.sink);
                let s3_objects_active = Arc::clone(&self.s3_objects_active);
                let events_active = Arc::clone(&self.events_active);
                tokio::spawn(async move {
                    tracing::info!(worker_id, "object reader worker waiting for input");
                    loop {
                        let work = {
                            let mut rx = shared_rx.lock().await;
                            rx.recv().await
                        };
                        let Some(work) = work else {
                            tracing::info!(worker_id, "object reader worker finished: channel closed");
                            return;
                        };
                        handle_object(worker_id, work, &store, &sink, &events_active).await;
                        s3_objects_active.done(1);
                    }
                })
            })
            .collect()
    }
}

async fn handle_object(
    worker_id: usize,
    work: ObjectWork,
    store: &Arc<dyn ObjectStore>,
    sink: &Arc<dyn Sink>,
    events_active: &Arc<ActiveCounter>,
) {
    let ObjectWork {
        object,
        metadata,
        queue_message,
    } = work;

    tracing::debug!(
        worker_id,
        bucket = %object.bucket,
        key = %object.key,
        "reading object"
    );

    let reader = match store.open(&object).await {
        Ok(reader) => reader,
        Err(err) => {
            metrics::read_error();
            tracing::warn!(worker_id, bucket = %object.bucket, key = %object.key, error = %err, "could not open object; treating as processed");
            if let Some(message) = &queue_message {
                message.object_processed();
            }
            return;
        }
    };

    let key_regex_fields = key_regex_captures(&metadata, &object.key);
    let mut lines = BufReader::new(reader).lines();
    let mut emitted = 0u64;

    loop {
        let next = match lines.next_line().await {
            Ok(next) => next,
            Err(err) => {
                metrics::read_error();
                tracing::warn!(worker_id, bucket = %object.bucket, key = %object.key, error = %err, "stream failed mid-object; object partially processed");
                break;
            }
        };
        let Some(line) = next else { break };

        match metadata.parser.parse_line(&line) {
            LineOutcome::Skipped => {}
            LineOutcome::Error(message) => {
                metrics::parser_error();
                tracing::warn!(worker_id, line = %line, error = %message, "could not parse line");
            }
            LineOutcome::Event(mut event) => {
                event.merge_fields(key_regex_fields.iter().cloned());
                event.merge_fields(
                    metadata
                        .fields
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone()))),
                );

                if let Some(message) = &queue_message {
                    message.add_events(1);
                }
                events_active.add(1);
                emitted += 1;

                let handle = queue_message.as_ref().map(|m| EventHandle(Arc::clone(m)));
                sink.publish(PublishedEvent { event, handle }).await;
            }
        }
    }

    tracing::debug!(worker_id, bucket = %object.bucket, key = %object.key, events = emitted, "finished reading object");

    if let Some(message) = &queue_message {
        message.object_processed();
    }
}

/// Applies the input's `key_regex_fields` pattern to an object key and
/// returns its named captures as string fields, to be merged into every
/// event emitted from that object. Absent the pattern, or on no match,
/// this is simply empty.
fn key_regex_captures(metadata: &InputMetadata, key: &str) -> Vec<(String, Value)> {
    let Some(regex) = &metadata.key_regex_fields else {
        return Vec::new();
    };
    let Some(captures) = regex.captures(key) else {
        return Vec::new();
    };
    regex
        .capture_names()
        .flatten()
        .filter_map(|name| {
            captures
                .name(name)
                .map(|m| (name.to_string(), Value::String(m.as_str().to_string())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::InputMetadata;
    use std::collections::BTreeMap;

    #[test]
    fn key_regex_captures_extracts_named_groups() {
        let metadata = InputMetadata {
            parser: log_parser::named_parser("alb", &log_parser::FormatOptions::default()).unwrap(),
            key_regex_fields: Some(regex::Regex::new(r"/(?P<env>[a-z]+)/(?P<service>[a-z0-9-]+)/").unwrap()),
            fields: BTreeMap::new(),
            input_type: "sqs",
        };
        let captures = key_regex_captures(&metadata, "logs/prod/checkout-api/2024/file.log");
        assert_eq!(
            captures,
            vec![
                ("env".to_string(), Value::String("prod".to_string())),
                ("service".to_string(), Value::String("checkout-api".to_string())),
            ]
        );
    }

    #[test]
    fn no_key_regex_yields_no_captures() {
        let metadata = InputMetadata {
            parser: log_parser::named_parser("alb", &log_parser::FormatOptions::default()).unwrap(),
            key_regex_fields: None,
            fields: BTreeMap::new(),
            input_type: "sqs",
        };
        assert!(key_regex_captures(&metadata, "any/key").is_empty());
    }
}
