//! Monitoring counters, mirroring the original source's three families per
//! subsystem (`<subsystem>.active`, `<subsystem>.added`/`.done`,
//! `<subsystem>Error`) via the `metrics` crate's global recorder instead of
//! a beats-specific registry.

use metrics::{counter, gauge};

pub const SQS_MESSAGES: &str = "sqs_messages";
pub const S3_OBJECTS: &str = "s3_objects";
pub const EVENTS: &str = "events";

pub fn active_add(subsystem: &'static str, delta: i64) {
    gauge!(format!("{subsystem}_active")).increment(delta as f64);
}

pub fn active_sub(subsystem: &'static str, delta: i64) {
    gauge!(format!("{subsystem}_active")).decrement(delta as f64);
}

pub fn added(subsystem: &'static str, n: u64) {
    counter!(format!("{subsystem}_added")).increment(n);
}

pub fn done(subsystem: &'static str, n: u64) {
    counter!(format!("{subsystem}_done")).increment(n);
}

pub fn error(subsystem: &'static str) {
    counter!(format!("{subsystem}_error")).increment(1);
}

/// Queue receive/delete failures; named `sqs_pull_error` to match the
/// error taxonomy's vocabulary rather than the generic `sqs_messages_error`
/// the `error` helper above would produce.
pub fn pull_error() {
    counter!("sqs_pull_error").increment(1);
}

/// Object-storage open/read failures; named `s3_read_error` per the error
/// taxonomy.
pub fn read_error() {
    counter!("s3_read_error").increment(1);
}

pub fn parser_error() {
    counter!("parser_error").increment(1);
}
