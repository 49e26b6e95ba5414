//! Incremental parser for newline-framed view responses.
//!
//! Consumes the response body as UTF-8 text split on newlines and
//! recognises the view payload layout:
//!
//! ```text
//! {"total_rows":N,"offset":K,"rows":[
//! {row JSON},
//! ...
//! {row JSON}
//! ]}
//! ```
//!
//! Each complete line yields at most one event: the opening line (and,
//! on non-standard servers, a trailing line) yields `Metadata`, row
//! lines yield `Row`, framing lines yield nothing. An unparseable row
//! is terminal: the parser reports it once and ignores everything
//! after. Single pass, constant memory beyond the current line.

use crate::error::{CouchLinkError, Result};
use bytes::BytesMut;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

/// Opening line, possibly with an immediately-empty result:
/// `{"total_rows":2,"offset":0,"rows":[` or `{"rows":[]}`.
fn opening_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\{(.*)"(?:rows|results)":\s*\[(?:\]\}|)$"#).expect("opening regex")
    })
}

/// Metadata placed after the rows by some server layouts:
/// `"update_seq":42}`.
fn trailing_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^(".*)\}$"#).expect("trailing regex"))
}

/// One event produced from a parsed line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ViewEvent {
    /// The envelope around the rows (`total_rows`, `offset`, ...).
    Metadata(JsonValue),
    /// One element of the `rows` (or `results`) array.
    Row(JsonValue),
}

/// Streaming line parser; one instance per streamed request.
#[derive(Debug, Default)]
pub(crate) struct ViewRowParser {
    buffer: BytesMut,
    done: bool,
}

impl ViewRowParser {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a body chunk, returning the events completed by it.
    ///
    /// The first unparseable row line fails the whole stream; the
    /// parser then swallows any further input.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Result<Vec<ViewEvent>> {
        if self.done {
            return Ok(Vec::new());
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = self.buffer.split_to(pos + 1);
            let line = &line[..line.len() - 1];
            if let Some(event) = self.parse_line(line)? {
                events.push(event);
            }
            if self.done {
                break;
            }
        }
        Ok(events)
    }

    /// Flush the final unterminated line, if any.
    pub(crate) fn finish(&mut self) -> Result<Vec<ViewEvent>> {
        if self.done || self.buffer.is_empty() {
            return Ok(Vec::new());
        }
        let line = self.buffer.split();
        Ok(self.parse_line(&line)?.into_iter().collect())
    }

    fn parse_line(&mut self, raw: &[u8]) -> Result<Option<ViewEvent>> {
        let text = String::from_utf8_lossy(raw);
        let line = text.strip_suffix('\r').unwrap_or(text.as_ref());

        if let Some(cap) = opening_regex().captures(line) {
            let prefix = cap[1].trim_end_matches(',');
            if prefix.is_empty() {
                return Ok(None);
            }
            let metadata = self.parse_fragment(&format!("{{{}}}", prefix), line)?;
            return Ok(Some(ViewEvent::Metadata(metadata)));
        }

        if let Some(cap) = trailing_regex().captures(line) {
            let metadata = self.parse_fragment(&format!("{{{}}}", &cap[1]), line)?;
            return Ok(Some(ViewEvent::Metadata(metadata)));
        }

        if line.is_empty() || line == "]}" || line == "]," {
            return Ok(None);
        }

        let row_text = line.strip_suffix(',').unwrap_or(line);
        let row = self.parse_fragment(row_text, line)?;
        Ok(Some(ViewEvent::Row(row)))
    }

    fn parse_fragment(&mut self, fragment: &str, line: &str) -> Result<JsonValue> {
        match serde_json::from_str(fragment) {
            Ok(value) => Ok(value),
            Err(_) => {
                self.done = true;
                Err(CouchLinkError::InternalServerError(format!(
                    "Unparseable view line: {}",
                    line
                )))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_all(payload: &str) -> Result<Vec<ViewEvent>> {
        let mut parser = ViewRowParser::new();
        let mut events = parser.feed(payload.as_bytes())?;
        events.extend(parser.finish()?);
        Ok(events)
    }

    #[test]
    fn test_standard_view_payload() {
        let payload = "{\"total_rows\":2,\"offset\":0,\"rows\":[\r\n\
                       {\"id\":\"a\",\"key\":\"a\",\"value\":1},\r\n\
                       {\"id\":\"b\",\"key\":\"b\",\"value\":2}\r\n\
                       ]}\n";
        let events = feed_all(payload).unwrap();
        assert_eq!(
            events,
            vec![
                ViewEvent::Metadata(json!({"total_rows": 2, "offset": 0})),
                ViewEvent::Row(json!({"id": "a", "key": "a", "value": 1})),
                ViewEvent::Row(json!({"id": "b", "key": "b", "value": 2})),
            ]
        );
    }

    #[test]
    fn test_chunk_boundaries_inside_lines() {
        let payload = "{\"total_rows\":1,\"offset\":0,\"rows\":[\n{\"id\":\"a\"}\n]}\n";
        let mut parser = ViewRowParser::new();
        let mut events = Vec::new();
        for chunk in payload.as_bytes().chunks(7) {
            events.extend(parser.feed(chunk).unwrap());
        }
        events.extend(parser.finish().unwrap());
        assert_eq!(
            events,
            vec![
                ViewEvent::Metadata(json!({"total_rows": 1, "offset": 0})),
                ViewEvent::Row(json!({"id": "a"})),
            ]
        );
    }

    #[test]
    fn test_empty_result_on_one_line() {
        let events = feed_all("{\"total_rows\":0,\"offset\":0,\"rows\":[]}\n").unwrap();
        assert_eq!(
            events,
            vec![ViewEvent::Metadata(json!({"total_rows": 0, "offset": 0}))]
        );
    }

    #[test]
    fn test_bare_opening_line_yields_no_metadata() {
        let events = feed_all("{\"rows\":[\n{\"id\":\"a\"}\n]}\n").unwrap();
        assert_eq!(events, vec![ViewEvent::Row(json!({"id": "a"}))]);
    }

    #[test]
    fn test_results_alias() {
        let events = feed_all("{\"total_rows\":1,\"results\":[\n{\"id\":\"a\"}\n]}\n").unwrap();
        assert_eq!(
            events,
            vec![
                ViewEvent::Metadata(json!({"total_rows": 1})),
                ViewEvent::Row(json!({"id": "a"})),
            ]
        );
    }

    #[test]
    fn test_trailing_metadata_line() {
        let events = feed_all("{\"rows\":[\n{\"id\":\"a\"}\n],\n\"update_seq\":42}\n").unwrap();
        assert_eq!(
            events,
            vec![
                ViewEvent::Row(json!({"id": "a"})),
                ViewEvent::Metadata(json!({"update_seq": 42})),
            ]
        );
    }

    #[test]
    fn test_unparseable_row_is_terminal() {
        let mut parser = ViewRowParser::new();
        parser.feed(b"{\"rows\":[\n").unwrap();
        let err = parser.feed(b"{oops not json},\n").unwrap_err();
        assert!(matches!(err, CouchLinkError::InternalServerError(_)));
        assert!(err.to_string().contains("{oops not json}"));
        // Everything after the poison line is swallowed.
        assert!(parser.feed(b"{\"id\":\"b\"}\n").unwrap().is_empty());
        assert!(parser.finish().unwrap().is_empty());
    }
}
