//! Fixed-size pool draining `SQSCh`: long-polls each assigned queue,
//! extracts per-object work from every message via the delivery
//! coordinator, and forwards it onto `S3Ch`. Grounded in the original
//! source's `worker/sqsconsumer.go`, generalized from a single
//! hard-coded worker count to the same shared-receiver pattern used by
//! [`crate::object_reader`].

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::{
    active_counter::ActiveCounter,
    channels::{ObjectWork, SqsDescriptor},
    metrics,
    queue::SQS_BATCH_MAX,
    shutdown::ShutdownSignal,
    tracker::{Dispatch, QueueMessage},
};

/// Default worker count (`W_sqs`).
pub const QUEUE_CONSUMER_WORKERS: usize = 2;

pub struct QueueConsumerPool {
    shutdown: ShutdownSignal,
    s3_tx: mpsc::Sender<ObjectWork>,
    s3_objects_active: Arc<ActiveCounter>,
}

impl QueueConsumerPool {
    pub fn new(
        shutdown: ShutdownSignal,
        s3_tx: mpsc::Sender<ObjectWork>,
        s3_objects_active: Arc<ActiveCounter>,
    ) -> Self {
        Self {
            shutdown,
            s3_tx,
            s3_objects_active,
        }
    }

    /// Spawns `QUEUE_CONSUMER_WORKERS` tasks sharing `sqs_rx`. Returns
    /// their join handles so the supervisor can wait for the pool to
    /// drain once every producer clone of `sqs_tx` has been dropped.
    pub fn start(&self, sqs_rx: mpsc::Receiver<SqsDescriptor>) -> Vec<tokio::task::JoinHandle<()>> {
        let shared_rx = Arc::new(Mutex::new(sqs_rx));

        (0..QUEUE_CONSUMER_WORKERS)
            .map(|worker_id| {
                let shared_rx = Arc::clone(&shared_rx);
                let shutdown = self.shutdown.clone();
                let s3_tx = self.s3_tx.clone();
                let s3_objects_active = Arc::clone(&self.s3_objects_active);
                tokio::spawn(async move {
                    tracing::info!(worker_id, "queue consumer worker waiting for input");
                    loop {
                        let descriptor = {
                            let mut rx = shared_rx.lock().await;
                            rx.recv().await
                        };
                        let Some(descriptor) = descriptor else {
                            tracing::info!(worker_id, "queue consumer worker finished: channel closed");
                            return;
                        };
                        drain_queue(worker_id, &descriptor, &s3_tx, &s3_objects_active, &shutdown).await;
                    }
                })
            })
            .collect()
    }
}

/// Long-polls one queue repeatedly until either a short batch comes back
/// or shutdown is signaled, matching the original source's per-scan
/// drain loop (a scan cycle may surface far more than `sqs_batch_max`
/// messages if the queue is backed up).
async fn drain_queue(
    worker_id: usize,
    descriptor: &SqsDescriptor,
    s3_tx: &mpsc::Sender<ObjectWork>,
    s3_objects_active: &Arc<ActiveCounter>,
    shutdown: &ShutdownSignal,
) {
    loop {
        if shutdown.is_triggered() {
            return;
        }

        let messages = match descriptor.queue.receive_messages().await {
            Ok(messages) => messages,
            Err(err) => {
                metrics::pull_error();
                tracing::error!(worker_id, queue = descriptor.queue.url(), error = %err, "could not receive queue messages");
                return;
            }
        };

        tracing::debug!(worker_id, queue = descriptor.queue.url(), count = messages.len(), "received queue messages");
        let received = messages.len();

        for raw in messages {
            metrics::active_add(metrics::SQS_MESSAGES, 1);
            metrics::added(metrics::SQS_MESSAGES, 1);

            let message = Arc::new(QueueMessage::new(
                raw.message_id,
                raw.body,
                raw.receipt_handle,
                Arc::clone(&descriptor.queue),
                descriptor.keep_message,
            ));

            let metadata = descriptor.metadata.clone();
            let s3_tx = s3_tx.clone();
            let s3_objects_active = Arc::clone(s3_objects_active);
            let shutdown = shutdown.clone();
            let message_for_extract = Arc::clone(&message);

            let extract_result = message_for_extract
                .extract_objects(move |object_ref| {
                    let metadata = metadata.clone();
                    let s3_tx = s3_tx.clone();
                    let s3_objects_active = Arc::clone(&s3_objects_active);
                    let message = Arc::clone(&message);
                    let mut shutdown = shutdown.clone();
                    async move {
                        let work = ObjectWork {
                            object: object_ref,
                            metadata,
                            queue_message: Some(message),
                        };
                        tokio::select! {
                            result = s3_tx.send(work) => {
                                if result.is_ok() {
                                    s3_objects_active.add(1);
                                    Dispatch::Sent
                                } else {
                                    Dispatch::Cancelled
                                }
                            }
                            _ = shutdown.triggered() => Dispatch::Cancelled,
                        }
                    }
                })
                .await;

            match extract_result {
                Ok(_) => {}
                Err(err) => {
                    tracing::error!(worker_id, message_id = %message_for_extract.message_id, error = %err, "malformed queue message body; leaving for redelivery");
                }
            }
        }

        if received < SQS_BATCH_MAX as usize {
            return;
        }
    }
}
