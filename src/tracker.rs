//! The at-least-once delivery coordinator: ties every downstream event
//! back to the queue message that produced it, so the queue delete is
//! deferred until all derived objects have finished and all derived
//! events have been acknowledged.
//!
//! Grounded in the original source's `S3ObjectSQSMessage`/`SQSMessage`
//! pair (`aws/s3sqsmessage.go`, `aws/sqsmessage.go`): there, `AddEvents`
//! and `S3ObjectProcessed` are called from the object-reader worker and
//! the delete is implicit in the SQS visibility timeout; here the
//! counters are explicit and the delete decision is made locally.

use std::{future::Future, sync::Arc, sync::Mutex};

use percent_encoding::percent_decode_str;
use serde::Deserialize;

use crate::{errors::ExtractError, metrics, object_store::ObjectRef, queue::QueueClient};

#[derive(Debug, Deserialize)]
struct ObjectNotificationEnvelope {
    #[serde(rename = "Records", default)]
    records: Vec<ObjectNotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct ObjectNotificationRecord {
    #[serde(rename = "eventSource")]
    event_source: String,
    #[serde(rename = "awsRegion", default)]
    aws_region: String,
    #[serde(rename = "eventName")]
    event_name: String,
    s3: ObjectNotificationS3,
}

#[derive(Debug, Deserialize)]
struct ObjectNotificationS3 {
    bucket: ObjectNotificationBucket,
    object: ObjectNotificationObject,
}

#[derive(Debug, Deserialize)]
struct ObjectNotificationBucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectNotificationObject {
    key: String,
}

/// Outcome of handing one extracted [`ObjectRef`] to the caller-supplied
/// visitor in [`QueueMessage::extract_objects`].
pub enum Dispatch {
    /// The object was accepted downstream (e.g. enqueued to `S3Ch`) and
    /// should count toward `pending_objects`.
    Sent,
    /// The visitor was cancelled (shutdown in progress); extraction stops
    /// and no further records in this message are dispatched.
    Cancelled,
}

#[derive(Default)]
struct Counters {
    pending_objects: i64,
    pending_events: i64,
    delete_issued: bool,
}

impl Counters {
    fn ready_to_delete(&self) -> bool {
        !self.delete_issued && self.pending_objects == 0 && self.pending_events == 0
    }
}

/// Strictly validates and decodes a URL-escaped object key.
///
/// `percent_decode_str` alone is too lenient for this: it passes any `%XX`
/// where `XX` isn't two hex digits through as a literal `%` instead of
/// erroring, and only fails if the final decoded bytes aren't valid UTF-8.
/// A key like `"My+simple+%5key%5D"` has exactly that shape — `%5k` has no
/// valid hex digit in its second position, but decodes via literal
/// passthrough, and `%5D` is a valid escape for `]` — so naive decoding
/// never notices anything is wrong. This checks every `%` is followed by
/// two hex digits before decoding at all.
fn decode_object_key(raw: &str) -> Result<String, String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let is_valid_escape = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !is_valid_escape {
                return Err(format!("invalid percent-escape in object key at byte {i}: {raw:?}"));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    percent_decode_str(raw)
        .decode_utf8()
        .map(|key| key.into_owned())
        .map_err(|err| err.to_string())
}

/// A received queue message plus the reference counts that decide when it
/// is safe to delete it. Each instance is shared (`Arc`) across every
/// object and event it produces.
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,
    receipt_handle: String,
    queue: Arc<dyn QueueClient>,
    keep_message: bool,
    counters: Mutex<Counters>,
}

impl QueueMessage {
    pub fn new(
        message_id: impl Into<String>,
        body: impl Into<String>,
        receipt_handle: impl Into<String>,
        queue: Arc<dyn QueueClient>,
        keep_message: bool,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            receipt_handle: receipt_handle.into(),
            queue,
            keep_message,
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Parses the message body as an object-notification envelope and
    /// hands every `ObjectCreated:Put` record from the object storage
    /// service to `visitor`, URL-unescaping its key first. A malformed
    /// key is logged and skipped, not fatal to the rest of the message.
    ///
    /// After the loop, `pending_objects` is set to the number of records
    /// the visitor accepted; if that count is zero, delete fires
    /// immediately (there is nothing left to wait for). This ordering —
    /// establishing `pending_objects` before any event can be counted
    /// against it — is load-bearing: reversing it lets an early object
    /// with zero events race `pending_events` down to a premature delete.
    pub async fn extract_objects<F, Fut>(
        self: &Arc<Self>,
        mut visitor: F,
    ) -> Result<usize, ExtractError>
    where
        F: FnMut(ObjectRef) -> Fut,
        Fut: Future<Output = Dispatch>,
    {
        let envelope: ObjectNotificationEnvelope = serde_json::from_str(&self.body)?;

        let mut dispatched = 0usize;
        for record in envelope.records {
            if record.event_source != "aws:s3" || record.event_name != "ObjectCreated:Put" {
                continue;
            }

            let key = match decode_object_key(&record.s3.object.key) {
                Ok(key) => key,
                Err(err) => {
                    tracing::warn!(
                        message_id = %self.message_id,
                        raw_key = %record.s3.object.key,
                        error = %err,
                        "skipping record with an unescapable object key"
                    );
                    continue;
                }
            };

            let object_ref = ObjectRef {
                bucket: record.s3.bucket.name,
                key,
                region: Some(record.aws_region).filter(|r| !r.is_empty()),
                prefix: None,
            };

            match visitor(object_ref).await {
                Dispatch::Sent => dispatched += 1,
                Dispatch::Cancelled => break,
            }
        }

        let trigger_delete = {
            let mut counters = self.counters.lock().expect("queue message lock poisoned");
            counters.pending_objects = dispatched as i64;
            counters.ready_to_delete()
        };

        if trigger_delete {
            self.spawn_delete();
        }

        Ok(dispatched)
    }

    /// Called by the object reader once per published event, before
    /// publish, to register that an acknowledgement is now outstanding.
    pub fn add_events(self: &Arc<Self>, n: u64) {
        let mut counters = self.counters.lock().expect("queue message lock poisoned");
        counters.pending_events += n as i64;
    }

    /// Called by the ACK handler once a batch of this message's events
    /// has been acknowledged by the sink. Going negative is a programming
    /// error: it means more acks arrived than publishes were recorded.
    pub fn events_processed(self: &Arc<Self>, n: u64) {
        let trigger_delete = {
            let mut counters = self.counters.lock().expect("queue message lock poisoned");
            counters.pending_events -= n as i64;
            assert!(
                counters.pending_events >= 0,
                "pending_events underflowed for queue message {}: acknowledged more events than were published",
                self.message_id
            );
            counters.ready_to_delete()
        };
        if trigger_delete {
            self.spawn_delete();
        }
    }

    /// Called by the object reader after a single object's stream has
    /// finished, whether it parsed cleanly or failed to open/read. A read
    /// failure still counts as processed (see the pool's module docs) so
    /// a message is never stuck in-flight because one object failed.
    pub fn object_processed(self: &Arc<Self>) {
        let trigger_delete = {
            let mut counters = self.counters.lock().expect("queue message lock poisoned");
            counters.pending_objects -= 1;
            assert!(
                counters.pending_objects >= 0,
                "pending_objects underflowed for queue message {}",
                self.message_id
            );
            counters.ready_to_delete()
        };
        if trigger_delete {
            self.spawn_delete();
        }
    }

    fn spawn_delete(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.fire_delete().await;
        });
    }

    /// Idempotent: only the first caller to observe `!delete_issued` under
    /// the lock actually issues the RPC, so a race between
    /// `object_processed` and `events_processed` both reaching zero can
    /// never double-delete.
    async fn fire_delete(self: Arc<Self>) {
        {
            let mut counters = self.counters.lock().expect("queue message lock poisoned");
            if counters.delete_issued {
                return;
            }
            counters.delete_issued = true;
        }

        if self.keep_message {
            tracing::debug!(
                message_id = %self.message_id,
                "keep-sqs-messages set: skipping delete RPC"
            );
        } else if let Err(err) = self.queue.delete_message(&self.receipt_handle).await {
            tracing::error!(
                message_id = %self.message_id,
                queue = %self.queue.url(),
                error = %err,
                "failed to delete queue message"
            );
        }

        metrics::done(metrics::SQS_MESSAGES, 1);
        metrics::active_sub(metrics::SQS_MESSAGES, 1);
    }

    #[cfg(test)]
    fn snapshot(&self) -> (i64, i64, bool) {
        let counters = self.counters.lock().unwrap();
        (
            counters.pending_objects,
            counters.pending_events,
            counters.delete_issued,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingQueue {
        deletes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueueClient for RecordingQueue {
        async fn receive_messages(&self) -> Result<Vec<crate::queue::RawMessage>, crate::errors::QueueError> {
            Ok(Vec::new())
        }

        async fn delete_message(&self, _receipt_handle: &str) -> Result<(), crate::errors::QueueError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn url(&self) -> &str {
            "test-queue"
        }
    }

    fn message(body: &str, deletes: Arc<AtomicUsize>) -> Arc<QueueMessage> {
        Arc::new(QueueMessage::new(
            "msg-1",
            body,
            "receipt-1",
            Arc::new(RecordingQueue { deletes }),
            false,
        ))
    }

    #[tokio::test]
    async fn empty_records_deletes_immediately() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let msg = message(r#"{"Records":[]}"#, deletes.clone());

        let dispatched = msg.extract_objects(|_| async { Dispatch::Sent }).await.unwrap();
        assert_eq!(dispatched, 0);

        tokio::task::yield_now().await;
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_s3_put_records_are_ignored() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let body = r#"{"Records":[{"eventSource":"aws:s3","awsRegion":"us-east-1","eventName":"ObjectRemoved:Delete","s3":{"bucket":{"name":"b"},"object":{"key":"k"}}}]}"#;
        let msg = message(body, deletes.clone());

        let dispatched = msg.extract_objects(|_| async { Dispatch::Sent }).await.unwrap();
        assert_eq!(dispatched, 0);
        tokio::task::yield_now().await;
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_waits_for_both_objects_and_events() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let body = r#"{"Records":[{"eventSource":"aws:s3","awsRegion":"us-east-1","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"k1"}}},{"eventSource":"aws:s3","awsRegion":"us-east-1","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"k2"}}}]}"#;
        let msg = message(body, deletes.clone());

        let dispatched = msg.extract_objects(|_| async { Dispatch::Sent }).await.unwrap();
        assert_eq!(dispatched, 2);
        assert_eq!(msg.snapshot(), (2, 0, false));

        msg.add_events(3);
        msg.object_processed();
        assert_eq!(msg.snapshot(), (1, 3, false));

        msg.object_processed();
        assert_eq!(msg.snapshot().2, false, "events still pending");

        msg.events_processed(3);
        tokio::task::yield_now().await;
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn delete_is_issued_exactly_once_under_concurrent_triggers() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let body = r#"{"Records":[{"eventSource":"aws:s3","awsRegion":"us-east-1","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"k1"}}}]}"#;
        let msg = message(body, deletes.clone());

        msg.extract_objects(|_| async { Dispatch::Sent }).await.unwrap();
        msg.add_events(1);

        let a = Arc::clone(&msg);
        let b = Arc::clone(&msg);
        let h1 = tokio::spawn(async move { a.object_processed() });
        let h2 = tokio::spawn(async move { b.events_processed(1) });
        let _ = tokio::join!(h1, h2);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keep_message_skips_the_delete_rpc_but_still_counts_done() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let msg = Arc::new(QueueMessage::new(
            "msg-2",
            r#"{"Records":[]}"#,
            "receipt-2",
            Arc::new(RecordingQueue {
                deletes: deletes.clone(),
            }),
            true,
        ));

        msg.extract_objects(|_| async { Dispatch::Sent }).await.unwrap();
        tokio::task::yield_now().await;
        assert_eq!(deletes.load(Ordering::SeqCst), 0);
        assert!(msg.snapshot().2);
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch_early() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let body = r#"{"Records":[{"eventSource":"aws:s3","awsRegion":"us-east-1","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"k1"}}},{"eventSource":"aws:s3","awsRegion":"us-east-1","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"k2"}}}]}"#;
        let msg = message(body, deletes);

        let mut calls = 0;
        let dispatched = msg
            .extract_objects(|_| {
                calls += 1;
                async move {
                    if calls == 1 {
                        Dispatch::Sent
                    } else {
                        Dispatch::Cancelled
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(dispatched, 1);
    }

    #[tokio::test]
    async fn malformed_percent_escape_in_key_is_skipped_and_deletes_immediately() {
        let deletes = Arc::new(AtomicUsize::new(0));
        let body = r#"{"Records":[{"eventSource":"aws:s3","awsRegion":"us-east-1","eventName":"ObjectCreated:Put","s3":{"bucket":{"name":"b"},"object":{"key":"My+simple+%5key%5D"}}}]}"#;
        let msg = message(body, deletes.clone());

        let dispatched = msg.extract_objects(|_| async { Dispatch::Sent }).await.unwrap();
        assert_eq!(dispatched, 0);
        assert_eq!(msg.snapshot().0, 0, "pending_objects must stay 0 for a skipped record");

        tokio::task::yield_now().await;
        assert_eq!(deletes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decode_object_key_rejects_a_truncated_escape() {
        assert!(decode_object_key("My+simple+%5key%5D").is_err());
    }

    #[test]
    fn decode_object_key_accepts_well_formed_escapes() {
        assert_eq!(decode_object_key("a%20b%2Fc").unwrap(), "a b/c");
    }
}
