use std::io::{self, BufRead};

/// The outcome of decoding a single line.
#[derive(Debug)]
pub enum LineOutcome {
    /// The line was skipped (empty, or matched an ignore pattern). Neither
    /// an event nor an error is reported for it.
    Skipped,
    /// The line could not be turned into an event; `message` is the
    /// diagnostic text handed to the caller's error callback.
    Error(String),
    /// The line decoded successfully into an event.
    Event(crate::Event),
}

/// Implemented by each log-record shape (regex-based, JSON) that can turn a
/// byte stream into a sequence of [`crate::Event`]s.
///
/// `parse_line` is the primitive every format implements; [`Parser::parse`]
/// is a line-splitting driver built on top of it so callers that already
/// have a [`BufRead`] (tests, small files) don't need to reimplement the
/// splitting logic. Pipeline code that streams directly from an async
/// reader (object storage) calls `parse_line` itself, one line at a time,
/// instead of going through `parse`.
pub trait Parser: Send + Sync {
    fn parse_line(&self, line: &str) -> LineOutcome;

    /// Streams `reader` line-by-line (newline-terminated; the final
    /// unterminated line, if any, is still processed) invoking `on_event`
    /// for each successfully parsed record and `on_error` for each
    /// malformed one. Returns an error only when the reader itself fails;
    /// per-record errors never propagate through the return value.
    fn parse<R, E, Ev>(&self, reader: R, mut on_event: Ev, mut on_error: E) -> io::Result<()>
    where
        Self: Sized,
        R: BufRead,
        E: FnMut(&str, &str),
        Ev: FnMut(crate::Event),
    {
        for line in reader.lines() {
            let line = line?;
            match self.parse_line(&line) {
                LineOutcome::Skipped => {}
                LineOutcome::Error(message) => on_error(&line, &message),
                LineOutcome::Event(event) => on_event(event),
            }
        }
        Ok(())
    }
}

/// Shared line-admission policy: a line is skipped (no event, no error) if
/// it is empty, or if it matches the parser's ignore pattern. The
/// empty-line check always runs first, regardless of the ignore pattern.
pub(crate) fn is_line_ignored(line: &str, ignore_regex: Option<&regex::Regex>) -> bool {
    if line.is_empty() {
        return true;
    }
    ignore_regex.is_some_and(|re| re.is_match(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_is_always_ignored() {
        assert!(is_line_ignored("", None));
    }

    #[test]
    fn ignore_regex_applies_after_empty_check() {
        let re = regex::Regex::new(r"^#").unwrap();
        assert!(is_line_ignored("# a comment", Some(&re)));
        assert!(!is_line_ignored("not a comment", Some(&re)));
    }
}
