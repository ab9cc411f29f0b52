use crate::{
    errors::ParserConstructionError,
    event::{Event, FieldMap},
    kind::Kind,
    parser::{is_line_ignored, LineOutcome, Parser},
    value::Value,
};

/// One JSON object per line; all fields but `timestamp_field` are carried
/// through, with numeric normalization (integer-valued JSON numbers become
/// the widest integer type that fits, rather than a float).
#[derive(Debug, Clone)]
pub struct JsonParser {
    timestamp_field: String,
    timestamp_kind: Kind,
}

impl JsonParser {
    /// Fails if `timestamp_kind` cannot decode to a timestamp.
    pub fn new(
        timestamp_field: impl Into<String>,
        timestamp_kind: Kind,
    ) -> Result<Self, ParserConstructionError> {
        if !matches!(timestamp_kind, Kind::TimeIso8601 | Kind::TimeLayout(_)) {
            return Err(ParserConstructionError::TimestampKindNotTime(timestamp_kind));
        }
        Ok(Self {
            timestamp_field: timestamp_field.into(),
            timestamp_kind,
        })
    }
}

fn json_value_to_value(v: &serde_json::Value) -> Value {
    match v {
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else if let Some(u) = n.as_u64() {
                Value::Uint64(u)
            } else {
                Value::Float64(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        // Arrays, objects, and null have no counterpart in the closed
        // scalar `Kind` set; carry them through as their JSON text rather
        // than dropping them.
        other => Value::String(other.to_string()),
    }
}

impl Parser for JsonParser {
    fn parse_line(&self, line: &str) -> LineOutcome {
        if is_line_ignored(line, None) {
            return LineOutcome::Skipped;
        }

        let parsed: serde_json::Map<String, serde_json::Value> =
            match serde_json::from_str(line) {
                Ok(serde_json::Value::Object(map)) => map,
                Ok(_) => {
                    return LineOutcome::Error(
                        "Couldn't parse json line: expected a JSON object".to_string(),
                    )
                }
                Err(err) => {
                    return LineOutcome::Error(format!("Couldn't parse json line. Error: {err}"))
                }
            };

        let Some(raw_timestamp) = parsed.get(&self.timestamp_field) else {
            return LineOutcome::Error(format!(
                "Couldn't find timestamp field {}",
                self.timestamp_field
            ));
        };

        let raw_timestamp_str = match raw_timestamp {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let timestamp = match self.timestamp_kind.decode(&raw_timestamp_str) {
            Ok(Value::Timestamp(ts)) => ts,
            Ok(_) => unreachable!("constructor guarantees timestamp_kind decodes to a timestamp"),
            Err(err) => {
                return LineOutcome::Error(format!(
                    "Couldn't parse field ({}) to type ({}). Error: {err}",
                    self.timestamp_field,
                    self.timestamp_kind.name()
                ))
            }
        };

        let mut fields = FieldMap::new();
        for (name, value) in parsed {
            if name == self.timestamp_field {
                continue;
            }
            fields.insert(name, json_value_to_value(&value));
        }

        LineOutcome::Event(Event::new(timestamp, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parser() -> JsonParser {
        JsonParser::new("ts", Kind::TimeIso8601).unwrap()
    }

    #[test]
    fn rejects_non_time_kind() {
        assert!(JsonParser::new("ts", Kind::String).is_err());
    }

    #[test]
    fn happy_path_normalizes_integers_and_strips_timestamp() {
        let line = r#"{"ts":"2016-08-10T22:08:42Z","status":200,"bytes":366,"ratio":0.5,"path":"/x"}"#;
        let mut events = Vec::new();
        parser()
            .parse(Cursor::new(line.as_bytes()), |e| events.push(e), |_, _| {
                panic!("should not error")
            })
            .unwrap();

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(!event.fields.contains_key("ts"));
        assert_eq!(event.fields.get("status"), Some(&Value::Int64(200)));
        assert_eq!(event.fields.get("bytes"), Some(&Value::Int64(366)));
        assert_eq!(event.fields.get("ratio"), Some(&Value::Float64(0.5)));
        assert_eq!(
            event.fields.get("path"),
            Some(&Value::String("/x".to_string()))
        );
    }

    #[test]
    fn missing_timestamp_field_is_a_line_error() {
        let mut errors = Vec::new();
        parser()
            .parse(
                Cursor::new(br#"{"status":200}"#.as_slice()),
                |_| panic!("should not emit"),
                |_, m| errors.push(m.to_string()),
            )
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("timestamp field"));
    }

    #[test]
    fn malformed_json_is_a_line_error_not_fatal() {
        let mut events = Vec::new();
        let mut errors = Vec::new();
        parser()
            .parse(
                Cursor::new(b"not json\n{\"ts\":\"2016-08-10T22:08:42Z\"}".as_slice()),
                |e| events.push(e),
                |_, m| errors.push(m.to_string()),
            )
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(events.len(), 1);
    }
}
