//! Incremental HTTP response parsing.
//!
//! The transport hands over the response as two ordered streams: header lines
//! (the status line first, then one delivery per header, then the blank
//! separator) and body chunks of arbitrary size. [`ResponseParser`] consumes
//! both without buffering the raw response and turns them into a
//! [`RawResponse`] once the transfer is over.
//!
//! ```text
//! on_header_line("HTTP/1.1 200 OK")                  -> status 200, "OK"
//! on_header_line("Content-Type: application/json")   -> content type
//! on_header_line("")                                 -> ignored
//! on_body_chunk(b"{\"voltage\"") / on_body_chunk(..) -> appended
//! finish(transfer_result)                            -> RawResponse | AppError
//! ```
//!
//! Every delivery returns an accept flag. `false` means the transport must
//! abort the transfer; the first fatal error is kept and wins over whatever
//! generic error the transport reports for the abort.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AppError;
use crate::models::RawResponse;

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^HTTP/([0-9])\.([0-9])\s+([0-9]+)\s+([^\r\n]+)")
        .expect("status line pattern is valid")
});

/// Upper bound on the body capacity reserved up front from `Content-Length`.
///
/// The header is only a hint and is never checked against the bytes received.
const MAX_PREALLOCATION: usize = 1 << 20;

/// Response state built up by successive header and body deliveries.
///
/// One parser is created per scrape and consumed by [`finish`](Self::finish).
#[derive(Debug, Default)]
pub struct ResponseParser {
    status_code: Option<u16>,
    status_text: String,
    content_length: usize,
    content_type: String,
    body: Vec<u8>,
    error: Option<AppError>,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one header line, the status line first.
    ///
    /// Blank lines are accepted without touching any state. Returns `false`
    /// once a fatal error has been recorded.
    pub fn on_header_line(&mut self, line: &[u8]) -> bool {
        if self.error.is_some() {
            return false;
        }

        let text = String::from_utf8_lossy(line);
        let line = text.trim();
        if line.is_empty() {
            return true;
        }

        let result = if self.status_code.is_none() {
            self.parse_status_line(line)
        } else {
            parse_header_line(line).and_then(|(key, value)| self.handle_header(key, value))
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.error = Some(e);
                false
            }
        }
    }

    /// Deliver the next chunk of the body.
    pub fn on_body_chunk(&mut self, chunk: &[u8]) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.body.capacity() < self.content_length {
            let wanted = self.content_length.min(MAX_PREALLOCATION);
            self.body.reserve_exact(wanted.saturating_sub(self.body.len()));
        }
        self.body.extend_from_slice(chunk);
        true
    }

    /// The first fatal error recorded during streaming, if any.
    pub fn error(&self) -> Option<&AppError> {
        self.error.as_ref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Value of the `Content-Length` header, 0 when absent.
    pub fn content_length_hint(&self) -> usize {
        self.content_length
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Close the parse once the transport has finished.
    ///
    /// `transferred` is the transport's own outcome. A parse error recorded
    /// while streaming is more specific than any transport error and is
    /// returned in its place.
    pub fn finish(self, transferred: Result<(), AppError>) -> Result<RawResponse, AppError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        transferred?;

        let status_code = match self.status_code {
            Some(code) if code != 0 && !self.status_text.is_empty() => code,
            _ => {
                return Err(AppError::InvalidInput(
                    "Missing status or status code".into(),
                ));
            }
        };
        if self.content_type.is_empty() {
            return Err(AppError::InvalidInput("Missing content type".into()));
        }

        Ok(RawResponse {
            status_code,
            status_text: self.status_text,
            content_type: self.content_type,
            body: self.body,
        })
    }

    fn parse_status_line(&mut self, line: &str) -> Result<(), AppError> {
        let captures = STATUS_LINE
            .captures(line)
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid status line: {line}")))?;

        let code = captures[3].parse::<u16>().map_err(|_| {
            AppError::InvalidInput(format!("Status code in status line not a number: {line}"))
        })?;

        self.status_code = Some(code);
        self.status_text = captures[4].trim().to_string();
        Ok(())
    }

    fn handle_header(&mut self, key: &str, value: &str) -> Result<(), AppError> {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_ascii_lowercase();
        } else if key.eq_ignore_ascii_case("content-length") {
            self.content_length = value.parse::<usize>().map_err(|_| {
                AppError::InvalidInput(format!("Unable to parse content length value: {value}"))
            })?;
        }
        Ok(())
    }
}

/// Split `key: value` at the first colon, trimming both sides.
fn parse_header_line(line: &str) -> Result<(&str, &str), AppError> {
    line.split_once(':')
        .map(|(key, value)| (key.trim(), value.trim()))
        .ok_or_else(|| AppError::InvalidInput(format!("Failed to parse header line: {line}")))
}
