//! The on-disk acknowledgement-watermark registrar is an external
//! collaborator (out of scope per the crate's purpose); this module only
//! carries the trait boundary the ACK handler calls through, plus a
//! no-op implementation for tests and for deployments that don't need
//! persisted state.

use std::sync::Arc;

use crate::event::EventHandle;

pub trait Registrar: Send + Sync {
    /// Called once per ACK batch, after the coordinator counters for each
    /// referenced message have been debited.
    fn on_finished_events(&self, handles: &[EventHandle]);
}

pub struct NoopRegistrar;

impl Registrar for NoopRegistrar {
    fn on_finished_events(&self, _handles: &[EventHandle]) {}
}

pub fn noop() -> Arc<dyn Registrar> {
    Arc::new(NoopRegistrar)
}
