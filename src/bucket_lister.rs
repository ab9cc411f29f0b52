//! Fixed-size pool draining `S3ListCh`: lists one bucket prefix per
//! received descriptor and forwards every object onto `S3Ch` for the
//! object-reader pool to pick up. Grounded in the original source's
//! `worker/s3lister.go` (`S3ListerWorker`), with one deliberate
//! deviation: the original busy-loops on a single descriptor forever,
//! re-listing the same prefix with no delay once started; here the
//! owning input re-pushes a fresh descriptor once per scan cycle (see
//! `crawler.rs`), so a worker lists once per descriptor and goes back to
//! waiting. Looping internally would race the input's own scheduling and
//! list the same prefix twice as fast as configured.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::{
    active_counter::ActiveCounter,
    channels::{ObjectWork, S3ListDescriptor},
    metrics,
    object_store::ObjectStore,
    shutdown::ShutdownSignal,
};

/// Default worker count.
pub const BUCKET_LISTER_WORKERS: usize = 2;

pub struct BucketListerPool {
    store: Arc<dyn ObjectStore>,
    shutdown: ShutdownSignal,
    s3_tx: mpsc::Sender<ObjectWork>,
    s3_objects_active: Arc<ActiveCounter>,
}

impl BucketListerPool {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        shutdown: ShutdownSignal,
        s3_tx: mpsc::Sender<ObjectWork>,
        s3_objects_active: Arc<ActiveCounter>,
    ) -> Self {
        Self {
            store,
            shutdown,
            s3_tx,
            s3_objects_active,
        }
    }

    pub fn start(&self, s3_list_rx: mpsc::Receiver<S3ListDescriptor>) -> Vec<tokio::task::JoinHandle<()>> {
        let shared_rx = Arc::new(Mutex::new(s3_list_rx));

        (0..BUCKET_LISTER_WORKERS)
            .map(|worker_id| {
                let shared_rx = Arc::clone(&shared_rx);
                let store = Arc::clone(&self.store);
                let shutdown = self.shutdown.clone();
                let s3_tx = self.s3_tx.clone();
                let s3_objects_active = Arc::clone(&self.s3_objects_active);
                tokio::spawn(async move {
                    tracing::info!(worker_id, "bucket lister worker waiting for input");
                    loop {
                        let descriptor = {
                            let mut rx = shared_rx.lock().await;
                            rx.recv().await
                        };
                        let Some(descriptor) = descriptor else {
                            tracing::info!(worker_id, "bucket lister worker finished: channel closed");
                            return;
                        };
                        list_once(worker_id, descriptor, &store, &s3_tx, &s3_objects_active, &shutdown).await;
                    }
                })
            })
            .collect()
    }
}

async fn list_once(
    worker_id: usize,
    descriptor: S3ListDescriptor,
    store: &Arc<dyn ObjectStore>,
    s3_tx: &mpsc::Sender<ObjectWork>,
    s3_objects_active: &Arc<ActiveCounter>,
    shutdown: &ShutdownSignal,
) {
    tracing::debug!(
        worker_id,
        bucket = %descriptor.bucket,
        prefix = %descriptor.prefix,
        "listing bucket prefix"
    );

    let objects = match store
        .list(&descriptor.bucket, &descriptor.prefix, descriptor.since, descriptor.to)
        .await
    {
        Ok(objects) => objects,
        Err(err) => {
            metrics::read_error();
            tracing::error!(
                worker_id,
                bucket = %descriptor.bucket,
                prefix = %descriptor.prefix,
                error = %err,
                "could not list bucket prefix"
            );
            return;
        }
    };

    tracing::debug!(
        worker_id,
        bucket = %descriptor.bucket,
        prefix = %descriptor.prefix,
        count = objects.len(),
        "listed bucket prefix"
    );

    for object in objects {
        if shutdown.is_triggered() {
            return;
        }
        let work = ObjectWork {
            object,
            metadata: descriptor.metadata.clone(),
            queue_message: None,
        };
        let mut shutdown = shutdown.clone();
        tokio::select! {
            result = s3_tx.send(work) => {
                if result.is_ok() {
                    s3_objects_active.add(1);
                } else {
                    return;
                }
            }
            _ = shutdown.triggered() => return,
        }
    }
}
