//! The downstream event sink, referenced only by its two-operation
//! contract (`publish` / `set_ack_handler`) per the crate's scope: the
//! real sink client is an external collaborator. Grounded in the original
//! source's `beat.Client`/`beat.PipelineACKHandler` pair
//! (`beater/s3logsbeat.go`): `b.Publisher.Connect()` yields a client whose
//! `Publish` is fire-and-forget and whose ACKs arrive later, out of band,
//! through a handler installed once at startup.
//!
//! [`StdoutSink`] is the crate's only concrete implementation: a
//! newline-delimited JSON writer that acknowledges each event as soon as
//! it has been written, standing in for a real buffering/retrying sink in
//! tests and small deployments.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::event::{EventHandle, PublishedEvent};

/// Invoked once per ACK batch: `count` events were durably committed, and
/// `handles` carries the originating [`EventHandle`] for each of them that
/// came from the object-reader path (bucket-listing events carry none).
pub type AckHandler = Arc<dyn Fn(usize, Vec<EventHandle>) + Send + Sync>;

#[async_trait::async_trait]
pub trait Sink: Send + Sync {
    /// Hands `event` to the sink. The sink owns its own internal queue and
    /// is expected to ack later via the installed handler; this only
    /// returns once the event has been handed off, so a caller's `.await`
    /// applies the same backpressure as the channel it hands off to —
    /// there is no internal buffer in which an event can be lost.
    async fn publish(&self, event: PublishedEvent);

    /// Installs the handler invoked for every ACK batch. Supervisors call
    /// this exactly once, before starting any worker pool.
    fn set_ack_handler(&self, handler: AckHandler);

    /// Used by the signal-shutdown timeout path to give up on a sink that
    /// is no longer acking, per the original source's `bt.client.Close()`
    /// unlocking any publisher blocked on a full internal queue.
    fn close(&self);
}

#[derive(Serialize)]
struct WireEvent<'a> {
    timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    fields: &'a log_parser::FieldMap,
}

/// Writes each event as one line of JSON to stdout and immediately calls
/// back through the installed [`AckHandler`] with a batch of one. A
/// background task owns the stdout handle and the queue so `publish`
/// itself never blocks the caller.
pub struct StdoutSink {
    tx: mpsc::Sender<PublishedEvent>,
    ack_handler: Arc<Mutex<Option<AckHandler>>>,
}

impl StdoutSink {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1024);
        let ack_handler: Arc<Mutex<Option<AckHandler>>> = Arc::new(Mutex::new(None));
        tokio::spawn(Self::run(rx, Arc::clone(&ack_handler)));
        Self { tx, ack_handler }
    }

    async fn run(mut rx: mpsc::Receiver<PublishedEvent>, ack_handler: Arc<Mutex<Option<AckHandler>>>) {
        use tokio::io::AsyncWriteExt;

        let mut stdout = tokio::io::stdout();
        while let Some(published) = rx.recv().await {
            let wire = WireEvent {
                timestamp: published.event.timestamp,
                fields: &published.event.fields,
            };
            match serde_json::to_vec(&wire) {
                Ok(mut line) => {
                    line.push(b'\n');
                    if let Err(err) = stdout.write_all(&line).await {
                        tracing::error!(error = %err, "stdout sink failed to write event");
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "stdout sink failed to serialize event");
                }
            }

            let handler = ack_handler.lock().expect("ack handler lock poisoned").clone();
            if let Some(handler) = handler {
                let handles = published.handle.into_iter().collect::<Vec<_>>();
                handler(1, handles);
            }
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Sink for StdoutSink {
    async fn publish(&self, event: PublishedEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::warn!("stdout sink background task is gone; event was not published");
        }
    }

    fn set_ack_handler(&self, handler: AckHandler) {
        *self.ack_handler.lock().expect("ack handler lock poisoned") = Some(handler);
    }

    fn close(&self) {
        // Dropping the sender side would require owning `self` by value;
        // since workers hold `Arc<dyn Sink>` we rely on process exit to
        // tear the background task down. Nothing to flush: every event is
        // written and acked synchronously within `run`.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log_parser::{Event, FieldMap, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn publishes_and_acks_through_stdout() {
        let sink = StdoutSink::new();
        let acked = Arc::new(AtomicUsize::new(0));
        let acked_clone = Arc::clone(&acked);
        sink.set_ack_handler(Arc::new(move |count, _handles| {
            acked_clone.fetch_add(count, Ordering::SeqCst);
        }));

        let mut fields = FieldMap::new();
        fields.insert("status".to_string(), Value::Int64(200));
        sink.publish(PublishedEvent {
            event: Event::new(chrono::Utc::now(), fields),
            handle: None,
        })
        .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(acked.load(Ordering::SeqCst), 1);
    }
}
