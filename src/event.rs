//! Wraps a parsed [`log_parser::Event`] with the private metadata the
//! pipeline attaches at publish time: a handle back to the `QueueMessage`
//! it was derived from (object-reader-path events only; bucket-listing
//! events carry no handle, matching the absence of an owning message).

use std::sync::Arc;

use crate::tracker::QueueMessage;

/// The Rust analogue of the source's raw pointer stashed in
/// `event.Private`: cheap to clone, gives the ACK handler O(1) access to
/// the counter home without re-parsing anything.
#[derive(Clone)]
pub struct EventHandle(pub Arc<QueueMessage>);

pub struct PublishedEvent {
    pub event: log_parser::Event,
    pub handle: Option<EventHandle>,
}
