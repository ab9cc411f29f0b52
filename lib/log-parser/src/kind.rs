use std::borrow::Cow;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use percent_encoding::percent_decode_str;

use crate::value::Value;

/// A scalar type a captured string (or JSON number) can be decoded into.
///
/// This is a closed, discriminated union: each variant owns its own decode
/// logic in [`Kind::decode`] rather than dispatching on a kind name at
/// runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    String,
    UrlEncoded,
    TimeIso8601,
    /// `layout` is a `chrono` strftime format string.
    TimeLayout(String),
}

impl Kind {
    /// Alias of [`Kind::Uint8`].
    pub const BYTE: Kind = Kind::Uint8;
    /// Alias of [`Kind::Int32`].
    pub const RUNE: Kind = Kind::Int32;

    /// Human-readable name used in diagnostics, matching the configuration
    /// vocabulary (`"uint8"`, `"timeISO8601"`, ...).
    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Kind::Bool => "bool".into(),
            Kind::Int => "int".into(),
            Kind::Int8 => "int8".into(),
            Kind::Int16 => "int16".into(),
            Kind::Int32 => "int32".into(),
            Kind::Int64 => "int64".into(),
            Kind::Uint => "uint".into(),
            Kind::Uint8 => "uint8".into(),
            Kind::Uint16 => "uint16".into(),
            Kind::Uint32 => "uint32".into(),
            Kind::Uint64 => "uint64".into(),
            Kind::Float32 => "float32".into(),
            Kind::Float64 => "float64".into(),
            Kind::String => "string".into(),
            Kind::UrlEncoded => "urlencoded".into(),
            Kind::TimeIso8601 => "timeISO8601".into(),
            Kind::TimeLayout(layout) => format!("time:{layout}").into(),
        }
    }

    /// Decodes a captured string slice into this kind's native value.
    pub fn decode(&self, raw: &str) -> Result<Value, DecodeError> {
        let wrap = |e: String| DecodeError {
            kind: self.name().into_owned(),
            detail: e,
        };

        match self {
            Kind::Bool => parse_bool(raw).map(Value::Bool).map_err(wrap),
            Kind::Int => raw
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| wrap(e.to_string())),
            Kind::Int8 => raw
                .parse::<i8>()
                .map(Value::Int8)
                .map_err(|e| wrap(e.to_string())),
            Kind::Int16 => raw
                .parse::<i16>()
                .map(Value::Int16)
                .map_err(|e| wrap(e.to_string())),
            Kind::Int32 => raw
                .parse::<i32>()
                .map(Value::Int32)
                .map_err(|e| wrap(e.to_string())),
            Kind::Int64 => raw
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| wrap(e.to_string())),
            Kind::Uint => raw
                .parse::<u64>()
                .map(Value::Uint64)
                .map_err(|e| wrap(e.to_string())),
            Kind::Uint8 => raw
                .parse::<u8>()
                .map(Value::Uint8)
                .map_err(|e| wrap(e.to_string())),
            Kind::Uint16 => raw
                .parse::<u16>()
                .map(Value::Uint16)
                .map_err(|e| wrap(e.to_string())),
            Kind::Uint32 => raw
                .parse::<u32>()
                .map(Value::Uint32)
                .map_err(|e| wrap(e.to_string())),
            Kind::Uint64 => raw
                .parse::<u64>()
                .map(Value::Uint64)
                .map_err(|e| wrap(e.to_string())),
            Kind::Float32 => raw
                .parse::<f32>()
                .map(Value::Float32)
                .map_err(|e| wrap(e.to_string())),
            Kind::Float64 => raw
                .parse::<f64>()
                .map(Value::Float64)
                .map_err(|e| wrap(e.to_string())),
            Kind::String => Ok(Value::String(raw.to_string())),
            Kind::UrlEncoded => Ok(Value::String(decode_url_encoded(raw))),
            Kind::TimeIso8601 => DateTime::parse_from_rfc3339(raw)
                .map(|dt| Value::Timestamp(dt.with_timezone(&Utc)))
                .map_err(|e| wrap(format!("parsing time {raw:?}: {e}"))),
            Kind::TimeLayout(layout) => NaiveDateTime::parse_from_str(raw, layout)
                .map(|naive| Value::Timestamp(Utc.from_utc_datetime(&naive)))
                .map_err(|e| wrap(format!("parsing time {raw:?}: {e}"))),
        }
    }
}

/// `application/x-www-form-urlencoded`-style decoding: percent-escapes and
/// `+` both decode, matching the wire convention CDN logs use for
/// user-agent and URI fields.
fn decode_url_encoded(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        other => other
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| format!("invalid boolean value: {raw:?}")),
    }
}

/// The error produced when a capture cannot be decoded into its configured
/// [`Kind`]. Never surfaces directly to callers of [`crate::Parser::parse`];
/// it is always wrapped into the field-level diagnostic message.
#[derive(Debug, thiserror::Error)]
#[error("{detail}")]
pub struct DecodeError {
    pub kind: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_unsigned_width() {
        assert_eq!(Kind::Uint8.decode("34").unwrap(), Value::Uint8(34));
    }

    #[test]
    fn rejects_overflow_on_narrow_width() {
        assert!(Kind::Uint8.decode("300").is_err());
    }

    #[test]
    fn decodes_rfc3339_timestamp() {
        let v = Kind::TimeIso8601.decode("2016-08-10T22:08:42.945958Z").unwrap();
        match v {
            Value::Timestamp(ts) => assert_eq!(ts.to_rfc3339(), "2016-08-10T22:08:42.945958+00:00"),
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_timestamp() {
        let err = Kind::TimeIso8601.decode("not-a-valid-date").unwrap_err();
        assert!(err.detail.contains("not-a-valid-date"));
    }

    #[test]
    fn decodes_url_encoded_plus_and_percent() {
        let v = Kind::UrlEncoded.decode("Mozilla/4.0%20(compatible;%20MSIE%205.0b1)+x").unwrap();
        assert_eq!(v, Value::String("Mozilla/4.0 (compatible; MSIE 5.0b1) x".to_string()));
    }

    #[test]
    fn byte_and_rune_are_aliases() {
        assert_eq!(Kind::BYTE, Kind::Uint8);
        assert_eq!(Kind::RUNE, Kind::Int32);
    }

    #[test]
    fn parses_common_bool_spellings() {
        for s in ["true", "T", "yes", "Y", "1", "23456", "-8"] {
            assert_eq!(Kind::Bool.decode(s).unwrap(), Value::Bool(true), "{s}");
        }
        for s in ["false", "fAlSE", "n", "N", "0", "000"] {
            assert_eq!(Kind::Bool.decode(s).unwrap(), Value::Bool(false), "{s}");
        }
        assert!(Kind::Bool.decode("yes or no").is_err());
    }
}
