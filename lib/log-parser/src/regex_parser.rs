use std::collections::HashMap;

use regex::Regex;

use crate::{
    errors::ParserConstructionError,
    event::{Event, FieldMap},
    kind::Kind,
    parser::{is_line_ignored, LineOutcome, Parser},
};

fn is_time_kind(kind: &Kind) -> bool {
    matches!(kind, Kind::TimeIso8601 | Kind::TimeLayout(_))
}

/// A log format described by a named-capture regex, matching the `alb` and
/// `cloudfront-web` built-in formats.
///
/// Exactly one capture group's kind must decode to a timestamp; that
/// group's decoded value becomes the emitted [`Event`]'s timestamp and the
/// group itself is removed from the field map (mirroring how the JSON
/// variant peels its `timestamp_field` out of the remaining fields).
#[derive(Debug, Clone)]
pub struct RegexParser {
    regex: Regex,
    ignore_regex: Option<Regex>,
    kind_map: HashMap<String, Kind>,
    empty_values: HashMap<String, String>,
    time_field: String,
}

impl RegexParser {
    /// Builds a parser from a compiled regex and its field kind map.
    /// Fails if zero or more than one field in `kind_map` decodes to a
    /// timestamp.
    pub fn new(
        regex: Regex,
        kind_map: HashMap<String, Kind>,
    ) -> Result<Self, ParserConstructionError> {
        let mut time_fields = kind_map
            .iter()
            .filter(|(_, kind)| is_time_kind(kind))
            .map(|(name, _)| name.clone());

        let time_field = match (time_fields.next(), time_fields.next()) {
            (Some(name), None) => name,
            (None, _) => return Err(ParserConstructionError::WrongTimeFieldCount(0)),
            (Some(_), Some(_)) => {
                let count = 2 + time_fields.count();
                return Err(ParserConstructionError::WrongTimeFieldCount(count));
            }
        };

        Ok(Self {
            regex,
            ignore_regex: None,
            kind_map,
            empty_values: HashMap::new(),
            time_field,
        })
    }

    #[must_use]
    pub fn with_ignore_regex(mut self, ignore_regex: Regex) -> Self {
        self.ignore_regex = Some(ignore_regex);
        self
    }

    #[must_use]
    pub fn with_empty_values(mut self, empty_values: HashMap<String, String>) -> Self {
        self.empty_values = empty_values;
        self
    }
}

impl Parser for RegexParser {
    fn parse_line(&self, line: &str) -> LineOutcome {
        if is_line_ignored(line, self.ignore_regex.as_ref()) {
            return LineOutcome::Skipped;
        }

        let Some(captures) = self.regex.captures(line) else {
            return LineOutcome::Error("Line does not match expected format".to_string());
        };

        let mut fields = FieldMap::new();
        for name in self.regex.capture_names().flatten() {
            let Some(m) = captures.name(name) else {
                continue;
            };
            let raw = m.as_str();

            if self
                .empty_values
                .get(name)
                .is_some_and(|sentinel| sentinel == raw)
            {
                continue;
            }

            match self.kind_map.get(name) {
                Some(kind) => match kind.decode(raw) {
                    Ok(value) => {
                        fields.insert(name.to_string(), value);
                    }
                    Err(err) => {
                        return LineOutcome::Error(format!(
                            "Couldn't parse field ({name}) to type ({}). Error: {err}",
                            kind.name()
                        ));
                    }
                },
                None => {
                    fields.insert(name.to_string(), crate::value::Value::String(raw.to_string()));
                }
            }
        }

        let timestamp = match fields.remove(&self.time_field) {
            Some(crate::value::Value::Timestamp(ts)) => ts,
            // The time field's own sentinel/empty-value rule can only ever
            // omit it, never decode it to a non-timestamp value, so this
            // branch means the capture was empty-sentinel'd away.
            _ => {
                return LineOutcome::Error(format!(
                    "Couldn't parse field ({}): empty or missing timestamp capture",
                    self.time_field
                ))
            }
        };

        LineOutcome::Event(Event::new(timestamp, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::io::Cursor;

    fn alb_parser() -> RegexParser {
        let re = Regex::new(concat!(
            r"^(?P<rtype>[^ ]*) (?P<time>[^ ]*) (?P<elb>[^ ]*) ",
            r"(?P<client_ip>[^ ]*):(?P<client_port>[0-9]*) ",
            r"(?P<target_ip>[^ ]*):(?P<target_port>[0-9]*) ",
            r"(?P<received_bytes>[-0-9]*) (?P<sent_bytes>[-0-9]*)",
        ))
        .unwrap();
        RegexParser::new(
            re,
            HashMap::from([
                ("time".to_string(), Kind::TimeIso8601),
                ("client_port".to_string(), Kind::Uint16),
                ("received_bytes".to_string(), Kind::Int64),
            ]),
        )
        .unwrap()
    }

    #[test]
    fn rejects_construction_with_no_time_field() {
        let re = Regex::new(r"^(?P<a>.*)$").unwrap();
        let err = RegexParser::new(re, HashMap::new()).unwrap_err();
        assert!(matches!(err, ParserConstructionError::WrongTimeFieldCount(0)));
    }

    #[test]
    fn rejects_construction_with_two_time_fields() {
        let re = Regex::new(r"^(?P<a>.*) (?P<b>.*)$").unwrap();
        let err = RegexParser::new(
            re,
            HashMap::from([
                ("a".to_string(), Kind::TimeIso8601),
                ("b".to_string(), Kind::TimeIso8601),
            ]),
        )
        .unwrap_err();
        assert!(matches!(err, ParserConstructionError::WrongTimeFieldCount(2)));
    }

    #[test]
    fn alb_happy_path() {
        let parser = alb_parser();
        let line = "http 2016-08-10T22:08:42.945958Z app/my-loadbalancer/50dc6c495c0c9188 \
192.168.131.39:2817 10.0.0.1:80 34 366";
        let mut events = Vec::new();
        let mut errors = Vec::new();
        parser
            .parse(Cursor::new(line.as_bytes()), |e| events.push(e), |l, m| {
                errors.push((l.to_string(), m.to_string()))
            })
            .unwrap();

        assert!(errors.is_empty());
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].fields.get("client_port"),
            Some(&Value::Uint16(2817))
        );
        assert_eq!(
            events[0].fields.get("received_bytes"),
            Some(&Value::Int64(34))
        );
        assert_eq!(events[0].timestamp.to_rfc3339(), "2016-08-10T22:08:42.945958+00:00");
        assert!(!events[0].fields.contains_key("time"));
    }

    #[test]
    fn alb_bad_timestamp_produces_no_event_and_one_error() {
        let parser = alb_parser();
        let line = "http not-a-valid-date app/my-loadbalancer/50dc6c495c0c9188 \
192.168.131.39:2817 10.0.0.1:80 34 366";
        let mut events = Vec::new();
        let mut errors = Vec::new();
        parser
            .parse(Cursor::new(line.as_bytes()), |e| events.push(e), |l, m| {
                errors.push((l.to_string(), m.to_string()))
            })
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.starts_with("Couldn't parse field (time)"));
    }

    #[test]
    fn format_mismatch_reports_error_and_continues() {
        let parser = alb_parser();
        let input = "this-does-not-match-anything\nhttp 2016-08-10T22:08:42.945958Z \
app/my-loadbalancer/50dc6c495c0c9188 192.168.131.39:2817 10.0.0.1:80 34 366";
        let mut events = Vec::new();
        let mut errors = Vec::new();
        parser
            .parse(Cursor::new(input.as_bytes()), |e| events.push(e), |l, m| {
                errors.push((l.to_string(), m.to_string()))
            })
            .unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn empty_values_omit_the_field() {
        let re = Regex::new(r"^(?P<time>[^ ]*) (?P<maybe>.*)$").unwrap();
        let parser = RegexParser::new(
            re,
            HashMap::from([("time".to_string(), Kind::TimeIso8601)]),
        )
        .unwrap()
        .with_empty_values(HashMap::from([("maybe".to_string(), "-".to_string())]));

        let mut events = Vec::new();
        parser
            .parse(
                Cursor::new(b"2016-08-10T22:08:42.945958Z -".as_slice()),
                |e| events.push(e),
                |_, _| panic!("should not error"),
            )
            .unwrap();

        assert_eq!(events.len(), 1);
        assert!(!events[0].fields.contains_key("maybe"));
    }

    #[test]
    fn ignored_and_blank_lines_produce_nothing() {
        let parser = alb_parser().with_ignore_regex(Regex::new(r"^#").unwrap());
        let mut events = Vec::new();
        let mut errors = Vec::new();
        parser
            .parse(Cursor::new(b"\n# a comment\n\n".as_slice()), |e| events.push(e), |l, m| {
                errors.push((l.to_string(), m.to_string()))
            })
            .unwrap();
        assert!(events.is_empty());
        assert!(errors.is_empty());
    }
}
