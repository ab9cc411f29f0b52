use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::value::Value;

/// Fields of an [`Event`], keyed by capture/JSON-object field name.
///
/// A `BTreeMap` is used rather than an insertion-ordered map because field
/// order is explicitly not part of event identity (see the parser engine's
/// testable properties): two events with the same fields in different
/// orders compare equal.
pub type FieldMap = BTreeMap<String, Value>;

/// A single parsed log record: a timestamp plus its typed fields.
///
/// Emitted by a [`crate::Parser`] and otherwise immutable. Downstream
/// pipeline code may still attach fields before publishing (key-regex
/// captures, static per-input fields); that mutation happens through
/// [`Event::merge_fields`], not by reconstructing the event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub fields: FieldMap,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, fields: FieldMap) -> Self {
        Self { timestamp, fields }
    }

    /// Merges additional fields into this event, overwriting any field of
    /// the same name produced by the parser itself.
    pub fn merge_fields(&mut self, extra: impl IntoIterator<Item = (String, Value)>) {
        self.fields.extend(extra);
    }
}
