/// Failures that can occur while *building* a [`crate::RegexParser`] or
/// [`crate::JsonParser`], as opposed to failures decoding a particular
/// line (those are reported per-line via the parser's error callback, see
/// [`crate::parser::Parser::parse`]).
#[derive(Debug, thiserror::Error)]
pub enum ParserConstructionError {
    #[error(
        "regex parser must have exactly one capture group whose kind decodes to a timestamp, found {0}"
    )]
    WrongTimeFieldCount(usize),

    #[error("timestamp_kind must decode to a timestamp, got kind {0:?}")]
    TimestampKindNotTime(crate::kind::Kind),

    #[error("unknown log_format {0:?}")]
    UnknownFormat(String),
}
