//! The two (plus one) bounded conduits that carry the happy-path load
//! through the pipeline, grounded in the original source's unbuffered Go
//! channels (`pipeline.Channels`, `pipeline/s3.go`, `pipeline/sqs.go`):
//! `SQSCh` (queue descriptors), `S3Ch` (per-object work), and `S3ListCh`
//! (bucket-listing descriptors, feeding the same object-reader pipeline as
//! `S3Ch` through the bucket-listing pool).
//!
//! Closing a channel in the original source is an explicit `close(ch)`
//! call; here it falls out naturally from `tokio::mpsc` semantics once
//! every clone of its `Sender` half is dropped, so the crawler and
//! supervisor never need to reach for an explicit "close" API.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use regex::Regex;
use tokio::sync::mpsc;

use crate::{object_store::ObjectRef, queue::QueueClient, tracker::QueueMessage};

pub const SQS_CHANNEL_CAPACITY: usize = 100;
pub const S3_CHANNEL_CAPACITY: usize = 100;
pub const S3_LIST_CHANNEL_CAPACITY: usize = 100;

/// Static, per-input metadata carried alongside every unit of work an
/// input produces: which parser to run, the optional key-regex that
/// extracts extra fields from an object key, and static fields to inject
/// unconditionally. Cloned cheaply (the parser and regex are shared via
/// `Arc`/cheap-clone) once per object, not re-resolved from configuration.
#[derive(Clone)]
pub struct InputMetadata {
    pub parser: Arc<dyn log_parser::Parser>,
    pub key_regex_fields: Option<Regex>,
    pub fields: BTreeMap<String, String>,
    pub input_type: &'static str,
}

/// One queue to poll, produced by a queue input once per scan cycle and
/// consumed by the queue-consumer pool.
pub struct SqsDescriptor {
    pub queue: Arc<dyn QueueClient>,
    pub metadata: InputMetadata,
    /// Mirrors the `--keep-sqs-messages` CLI flag: the coordinator still
    /// runs its delete bookkeeping but skips the RPC.
    pub keep_message: bool,
}

/// One bucket prefix to list, produced by a bucket-listing input once per
/// scan cycle and consumed by the bucket-listing pool.
pub struct S3ListDescriptor {
    pub bucket: String,
    pub prefix: String,
    pub since: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub metadata: InputMetadata,
}

/// One object to download, parse, and publish. `queue_message` is `Some`
/// for objects discovered via a queue notification (the coordinator must
/// be told when this object finishes) and `None` for objects discovered
/// via bucket listing (there is no queue message to delete).
pub struct ObjectWork {
    pub object: ObjectRef,
    pub metadata: InputMetadata,
    pub queue_message: Option<Arc<QueueMessage>>,
}

/// Owns the sender/receiver halves of all three pipeline channels. Built
/// once at supervisor startup; senders are cloned out to inputs and
/// worker pools, receivers are handed to worker pools and wrapped for
/// shared draining.
pub struct Channels {
    pub sqs_tx: mpsc::Sender<SqsDescriptor>,
    pub sqs_rx: mpsc::Receiver<SqsDescriptor>,
    pub s3_tx: mpsc::Sender<ObjectWork>,
    pub s3_rx: mpsc::Receiver<ObjectWork>,
    pub s3_list_tx: mpsc::Sender<S3ListDescriptor>,
    pub s3_list_rx: mpsc::Receiver<S3ListDescriptor>,
}

impl Channels {
    pub fn new() -> Self {
        let (sqs_tx, sqs_rx) = mpsc::channel(SQS_CHANNEL_CAPACITY);
        let (s3_tx, s3_rx) = mpsc::channel(S3_CHANNEL_CAPACITY);
        let (s3_list_tx, s3_list_rx) = mpsc::channel(S3_LIST_CHANNEL_CAPACITY);
        Self {
            sqs_tx,
            sqs_rx,
            s3_tx,
            s3_rx,
            s3_list_tx,
            s3_list_rx,
        }
    }
}

impl Default for Channels {
    fn default() -> Self {
        Self::new()
    }
}
