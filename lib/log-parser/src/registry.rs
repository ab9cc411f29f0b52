use std::{collections::HashMap, sync::Arc};

use regex::Regex;

use crate::{
    errors::ParserConstructionError, json_parser::JsonParser, kind::Kind,
    regex_parser::RegexParser, Parser,
};

/// Per-format construction options, as read from an input's
/// `log_format_options` configuration table. Only the `json` format
/// consumes any of these; the built-in regex formats ignore the map.
#[derive(Debug, Clone, Default)]
pub struct FormatOptions {
    pub timestamp_field: Option<String>,
    pub timestamp_layout: Option<String>,
}

/// Builds the parser registered under `log_format` in the crate's built-in
/// registry (`alb`, `cloudfront-web`, `json`). This is the only place new
/// formats are added; pipeline code never constructs a [`RegexParser`] or
/// [`JsonParser`] directly.
pub fn named_parser(
    log_format: &str,
    options: &FormatOptions,
) -> Result<Arc<dyn Parser>, ParserConstructionError> {
    match log_format {
        "alb" => Ok(Arc::new(alb_parser()?)),
        "cloudfront-web" => Ok(Arc::new(cloudfront_web_parser()?)),
        "json" => Ok(Arc::new(json_parser(options)?)),
        other => Err(ParserConstructionError::UnknownFormat(other.to_string())),
    }
}

/// Application Load Balancer access log format: space-separated fields
/// with double-quoted strings, 22 named fields, RFC3339Nano timestamp.
fn alb_parser() -> Result<RegexParser, ParserConstructionError> {
    let regex = Regex::new(concat!(
        r#"^(?P<rtype>[^ ]*) (?P<time>[^ ]*) (?P<elb>[^ ]*) "#,
        r#"(?P<client_ip>[^ ]*):(?P<client_port>[0-9]*) "#,
        r#"(?P<target_ip>[^ -]*)[:-](?P<target_port>[0-9]*) "#,
        r#"(?P<request_processing_time>[-.0-9]*) (?P<target_processing_time>[-.0-9]*) "#,
        r#"(?P<response_processing_time>[-.0-9]*) (?P<elb_status_code>|[-0-9]*) "#,
        r#"(?P<target_status_code>-|[-0-9]*) (?P<received_bytes>[-0-9]*) (?P<sent_bytes>[-0-9]*) "#,
        r#""(?P<request_verb>[^ ]*) (?P<request_url>[^ ]*) (?P<request_proto>- |[^ ]*)" "#,
        r#""(?P<user_agent>[^"]*)" (?P<ssl_cipher>[A-Z0-9-]+) (?P<ssl_protocol>[A-Za-z0-9.-]*) "#,
        r#"(?P<target_group_arn>[^ ]*) "(?P<trace_id>[^"]*)""#,
    ))
    .expect("built-in alb regex is valid");

    let kind_map = HashMap::from([
        ("time".to_string(), Kind::TimeIso8601),
        ("client_port".to_string(), Kind::Uint16),
        ("target_port".to_string(), Kind::Uint16),
        ("request_processing_time".to_string(), Kind::Float64),
        ("target_processing_time".to_string(), Kind::Float64),
        ("response_processing_time".to_string(), Kind::Float64),
        ("received_bytes".to_string(), Kind::Int64),
        ("sent_bytes".to_string(), Kind::Int64),
    ]);

    RegexParser::new(regex, kind_map)
}

/// CloudFront web distribution access logs: tab-separated fields, header
/// comment lines (`#...`) skipped, date-TAB-time timestamp pair.
fn cloudfront_web_parser() -> Result<RegexParser, ParserConstructionError> {
    let regex = Regex::new(concat!(
        r"^(?P<timestamp>[^\t]*\t[^\t]*)\t(?P<x_edge_location>[^\t]*)\t(?P<sc_bytes>[^\t]*)\t",
        r"(?P<c_ip>[^\t]*)\t(?P<cs_method>[^\t]*)\t(?P<cs_host>[^\t]*)\t(?P<cs_uri_stem>[^\t]*)\t",
        r"(?P<sc_status>[^\t]*)\t(?P<cs_referer>[^\t]*)\t(?P<cs_user_agent>[^\t]*)",
    ))
    .expect("built-in cloudfront-web regex is valid");

    let kind_map = HashMap::from([
        (
            "timestamp".to_string(),
            Kind::TimeLayout("%Y-%m-%d\t%H:%M:%S".to_string()),
        ),
        ("x_edge_location".to_string(), Kind::UrlEncoded),
        ("sc_bytes".to_string(), Kind::Uint64),
        ("cs_host".to_string(), Kind::UrlEncoded),
        ("cs_uri_stem".to_string(), Kind::UrlEncoded),
        ("sc_status".to_string(), Kind::Int16),
        ("cs_referer".to_string(), Kind::UrlEncoded),
        ("cs_user_agent".to_string(), Kind::UrlEncoded),
    ]);

    Ok(RegexParser::new(regex, kind_map)?.with_ignore_regex(
        Regex::new(r"^#").expect("built-in ignore regex is valid"),
    ))
}

fn json_parser(options: &FormatOptions) -> Result<JsonParser, ParserConstructionError> {
    let timestamp_field = options
        .timestamp_field
        .clone()
        .unwrap_or_else(|| "timestamp".to_string());
    let kind = match &options.timestamp_layout {
        Some(layout) => Kind::TimeLayout(layout.clone()),
        None => Kind::TimeIso8601,
    };
    JsonParser::new(timestamp_field, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LineOutcome;
    use crate::value::Value;

    #[test]
    fn unknown_format_is_rejected() {
        assert!(named_parser("not-a-format", &FormatOptions::default()).is_err());
    }

    #[test]
    fn alb_named_parser_decodes_a_real_line() {
        let parser = named_parser("alb", &FormatOptions::default()).unwrap();
        let line = r#"http 2016-08-10T22:08:42.945958Z app/my-loadbalancer/50dc6c495c0c9188 192.168.131.39:2817 10.0.0.1:80 0.000 0.001 0.000 200 200 34 366 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.46.0" - - arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067 "Root=1-58337262-36d228ad5d99923122bbe354" - -"#;
        let event = match parser.parse_line(line) {
            LineOutcome::Event(e) => e,
            other => panic!("expected an event, got {other:?}"),
        };
        assert_eq!(event.fields.get("client_port"), Some(&Value::Uint16(2817)));
        assert_eq!(event.fields.get("received_bytes"), Some(&Value::Int64(34)));
        assert_eq!(
            event.timestamp.to_rfc3339(),
            "2016-08-10T22:08:42.945958+00:00"
        );
    }

    #[test]
    fn cloudfront_skips_header_comments() {
        let parser = named_parser("cloudfront-web", &FormatOptions::default()).unwrap();
        let input = "#Version: 1.0\n#Fields: date time x-edge-location sc-bytes c-ip cs-method cs(Host) cs-uri-stem sc-status cs(Referer) cs(User-Agent)\n2014-05-23\t01:13:11\tFRA2\t182\t192.0.2.10\tGET\td111111abcdef8.cloudfront.net\t/view/my/file.html\t200\twww.displaymyfiles.com\tMozilla/4.0%20(compatible)\n2014-05-23\t01:14:11\tFRA2\t200\t192.0.2.11\tGET\td111111abcdef8.cloudfront.net\t/view/my/file2.html\t200\twww.displaymyfiles.com\tMozilla/5.0%20(compatible)";
        let mut events = Vec::new();
        let mut errors = Vec::new();
        for line in input.lines() {
            match parser.parse_line(line) {
                crate::parser::LineOutcome::Event(e) => events.push(e),
                crate::parser::LineOutcome::Error(m) => errors.push(m),
                crate::parser::LineOutcome::Skipped => {}
            }
        }
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].fields.get("sc_bytes"), Some(&Value::Uint64(182)));
        assert_eq!(
            events[0].fields.get("cs_user_agent"),
            Some(&Value::String("Mozilla/4.0 (compatible)".to_string()))
        );
    }

    #[test]
    fn json_named_parser_uses_default_timestamp_field() {
        let parser = named_parser("json", &FormatOptions::default()).unwrap();
        let mut events = Vec::new();
        if let crate::parser::LineOutcome::Event(e) =
            parser.parse_line(r#"{"timestamp":"2016-08-10T22:08:42Z","status":200}"#)
        {
            events.push(e);
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].fields.get("status"), Some(&Value::Int64(200)));
    }
}
