//! Wires every other module together into a running pipeline and owns
//! its shutdown sequencing. Grounded in the original source's
//! `beater/s3logsbeat.go` (`New`, `Run`, `Stop`): client/cron
//! construction, pipeline connect, and worker startup happen in the same
//! relative order there, and `Stop` drives the same two-path shutdown
//! (signal vs. `--once` completion) this module implements explicitly.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;

use crate::{
    active_counter::ActiveCounter,
    bucket_lister::BucketListerPool,
    channels::Channels,
    config::Config,
    crawler::{build_inputs, Crawler},
    errors::SupervisorError,
    event::EventHandle,
    metrics,
    object_reader::ObjectReaderPool,
    object_store::ObjectStore,
    queue_consumer::QueueConsumerPool,
    registrar::Registrar,
    shutdown::ShutdownHandle,
    sink::Sink,
};

/// A running pipeline: every worker pool and the crawler have already
/// been started by the time this is constructed. [`Supervisor::run`]
/// only owns shutdown sequencing from here on.
pub struct Supervisor {
    shutdown_handle: ShutdownHandle,
    shutdown_timeout: Duration,
    sink: Arc<dyn Sink>,
    crawler: Option<Crawler>,
    sqs_tx: Option<tokio::sync::mpsc::Sender<crate::channels::SqsDescriptor>>,
    s3_tx: Option<tokio::sync::mpsc::Sender<crate::channels::ObjectWork>>,
    s3_list_tx: Option<tokio::sync::mpsc::Sender<crate::channels::S3ListDescriptor>>,
    queue_consumer_handles: Vec<JoinHandle<()>>,
    bucket_lister_handles: Vec<JoinHandle<()>>,
    object_reader_handles: Vec<JoinHandle<()>>,
    events_active: Arc<ActiveCounter>,
    s3_objects_active: Arc<ActiveCounter>,
}

impl Supervisor {
    /// Performs the full startup sequence: builds the pipeline channels,
    /// the coordinator's waitable counters, connects the sink and
    /// installs its ACK handler, builds the crawler's inputs from
    /// configuration, starts every worker pool, then starts the crawler
    /// itself. Inputs are constructed (and thus validated) before any
    /// pool starts, so a bad `key_regex_fields` pattern or duplicate
    /// input aborts before a single object is read.
    pub fn start(
        config: &Config,
        object_store: Arc<dyn ObjectStore>,
        sqs_client: &aws_sdk_sqs::Client,
        sink: Arc<dyn Sink>,
        registrar: Arc<dyn Registrar>,
        keep_sqs_messages: bool,
    ) -> Result<Self, SupervisorError> {
        let channels = Channels::new();
        let Channels {
            sqs_tx,
            sqs_rx,
            s3_tx,
            s3_rx,
            s3_list_tx,
            s3_list_rx,
        } = channels;

        let events_active = ActiveCounter::new(metrics::EVENTS);
        let s3_objects_active = ActiveCounter::new(metrics::S3_OBJECTS);

        let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();

        sink.set_ack_handler(Arc::new({
            let events_active = Arc::clone(&events_active);
            let registrar = Arc::clone(&registrar);
            move |count, handles: Vec<EventHandle>| {
                for handle in &handles {
                    handle.0.events_processed(1);
                }
                registrar.on_finished_events(&handles);
                events_active.done(count as u64);
            }
        }));

        let inputs = build_inputs(
            config,
            sqs_client,
            sqs_tx.clone(),
            s3_list_tx.clone(),
            keep_sqs_messages,
        )?;

        let object_reader_handles = ObjectReaderPool::new(
            Arc::clone(&object_store),
            Arc::clone(&sink),
            Arc::clone(&s3_objects_active),
            Arc::clone(&events_active),
        )
        .start(s3_rx);

        let bucket_lister_handles = BucketListerPool::new(
            object_store,
            shutdown_signal.clone(),
            s3_tx.clone(),
            Arc::clone(&s3_objects_active),
        )
        .start(s3_list_rx);

        let queue_consumer_handles =
            QueueConsumerPool::new(shutdown_signal.clone(), s3_tx.clone(), Arc::clone(&s3_objects_active)).start(sqs_rx);

        let crawler = Crawler::start(inputs, shutdown_signal.clone());

        Ok(Self {
            shutdown_handle,
            shutdown_timeout: config.shutdown_timeout,
            sink,
            crawler: Some(crawler),
            sqs_tx: Some(sqs_tx),
            s3_tx: Some(s3_tx),
            s3_list_tx: Some(s3_list_tx),
            queue_consumer_handles,
            bucket_lister_handles,
            object_reader_handles,
            events_active,
            s3_objects_active,
        })
    }

    /// Drives the pipeline to completion. In `once` mode this returns
    /// once every input has scanned exactly once and every object and
    /// event it produced has drained through the pipeline. Otherwise it
    /// runs until SIGINT/SIGTERM, then drains with a timeout.
    pub async fn run(mut self, once: bool) {
        if once {
            self.run_once().await;
        } else {
            self.run_until_signal().await;
        }
    }

    /// Once-mode drain: wait for the crawler's inputs to finish their
    /// single scan, close `SQSCh` by dropping this supervisor's own
    /// sender clone (every input's clone is already gone, since each
    /// input task returned), wait for the queue-consumer pool to drain,
    /// close `S3Ch`/`S3ListCh`, wait for the bucket-lister and
    /// object-reader pools to drain, then wait for every in-flight event
    /// to be acknowledged. This exact order is load-bearing: closing
    /// `S3Ch` before the queue consumers finish would drop objects they
    /// are still trying to enqueue.
    async fn run_once(&mut self) {
        self.crawler_wait().await;

        self.sqs_tx.take();
        Self::join_all(std::mem::take(&mut self.queue_consumer_handles)).await;

        self.s3_list_tx.take();
        Self::join_all(std::mem::take(&mut self.bucket_lister_handles)).await;

        self.s3_tx.take();
        Self::join_all(std::mem::take(&mut self.object_reader_handles)).await;

        self.events_active.wait_for_zero().await;
        self.sink.close();
    }

    /// Signal-driven shutdown: waits for SIGINT/SIGTERM, triggers the
    /// shared shutdown signal (which stops the crawler and tells every
    /// worker to stop accepting new work after its current item), then
    /// waits up to `shutdown_timeout` for `events_active` and
    /// `s3_objects_active` to both reach zero. On timeout, aborts every
    /// remaining worker task and closes the sink rather than waiting
    /// forever for acknowledgements that may never come.
    async fn run_until_signal(&mut self) {
        wait_for_termination_signal().await;
        tracing::info!("shutdown signal received; draining in-flight work");
        self.shutdown_handle.trigger();

        self.crawler_wait().await;
        self.sqs_tx.take();
        self.s3_list_tx.take();
        self.s3_tx.take();

        // A zero `shutdown_timeout` means "wait as long as it takes", not
        // "time out immediately" — `tokio::time::timeout` would otherwise
        // read a zero duration as already elapsed.
        let drained = if self.shutdown_timeout.is_zero() {
            self.wait_for_all_active_zero().await;
            Ok(())
        } else {
            tokio::time::timeout(self.shutdown_timeout, self.wait_for_all_active_zero()).await
        };

        if drained.is_err() {
            tracing::warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                events_active = self.events_active.get(),
                s3_objects_active = self.s3_objects_active.get(),
                "shutdown timed out with work still in flight; aborting remaining workers"
            );
            for handle in std::mem::take(&mut self.queue_consumer_handles) {
                handle.abort();
            }
            for handle in std::mem::take(&mut self.bucket_lister_handles) {
                handle.abort();
            }
            for handle in std::mem::take(&mut self.object_reader_handles) {
                handle.abort();
            }
        } else {
            Self::join_all(std::mem::take(&mut self.queue_consumer_handles)).await;
            Self::join_all(std::mem::take(&mut self.bucket_lister_handles)).await;
            Self::join_all(std::mem::take(&mut self.object_reader_handles)).await;
        }

        self.sink.close();
    }

    async fn wait_for_all_active_zero(&self) {
        tokio::join!(self.events_active.wait_for_zero(), self.s3_objects_active.wait_for_zero());
    }

    async fn crawler_wait(&mut self) {
        if let Some(crawler) = self.crawler.take() {
            crawler.wait_for_completion().await;
        }
    }

    async fn join_all(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "worker task panicked");
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_termination_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
