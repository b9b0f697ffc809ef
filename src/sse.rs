//! Server-Sent Events (SSE) stream decoding.
//!
//! This module turns an arbitrarily chunked response body into an ordered
//! sequence of [`Frame`]s. Chunk boundaries carry no meaning: an event, a
//! `\r\n` pair, or a multi-byte character may be split across any number
//! of chunks and still decode to the same frames.
//!
//! SSE format:
//! ```text
//! data: "function "
//!
//! data: "main() {}"
//!
//! data: [DONE]
//! ```

use std::char::REPLACEMENT_CHARACTER;

use serde_json::Value;
use tracing::{debug, warn};

use crate::model::Frame;

/// Payload value that ends the stream.
pub const DONE_MARKER: &str = "[DONE]";

/// Blank line separating two events.
const EVENT_SEPARATOR: &str = "\n\n";

/// Incremental UTF-8 decoder.
///
/// Holds an incomplete trailing sequence across calls so a character split
/// between two chunks is emitted once, whole. Invalid bytes decode to
/// U+FFFD, matching a browser `TextDecoder` in non-fatal mode.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `chunk` (plus any held bytes) as is complete.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut input: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    out.push_str(valid);
                    input = &[];
                    break;
                }
                Err(e) => {
                    let (valid, rest) = input.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));

                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            input = &rest[len..];
                        }
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let consumed = self.pending.len() - input.len();
        self.pending.drain(..consumed);
        out
    }

    /// Flush at end of input. A dangling partial character becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        REPLACEMENT_CHARACTER.to_string()
    }
}

/// Stateful event decoder and frame splitter.
///
/// Feed it chunks with [`push`](Self::push) and call
/// [`finish`](Self::finish) once the transport reports end of input.
/// After a [`Frame::Terminator`] has been produced, further input is
/// ignored.
///
/// # Example
/// ```
/// use jsunpack::model::Frame;
/// use jsunpack::sse::FrameDecoder;
///
/// let mut decoder = FrameDecoder::new();
/// assert!(decoder.push(b"data: \"he").is_empty());
///
/// let frames = decoder.push(b"llo\"\n\ndata: [DONE]\n\n");
/// assert_eq!(frames, vec![Frame::Payload("hello".into()), Frame::Terminator]);
/// assert!(decoder.is_finished());
/// ```
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8Decoder,
    carry: String,
    /// Prefix of `carry` already searched for a separator.
    scanned: usize,
    finished: bool,
    dropped: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one raw chunk, returning every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }

        let text = self.utf8.decode(chunk);
        self.append(&text);
        self.drain_events()
    }

    /// Finalize at end of input.
    ///
    /// Flushes the byte decoder and splits once more; an unterminated
    /// trailing event is discarded.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }

        let tail = self.utf8.finish();
        self.append(&tail);
        let frames = self.drain_events();

        if !self.carry.trim().is_empty() {
            debug!(len = self.carry.len(), "discarding unterminated trailing event");
        }
        self.carry.clear();
        self.scanned = 0;
        self.finished = true;
        frames
    }

    /// Whether the terminator was seen or input was finalized.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Events skipped because their payload did not parse.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn append(&mut self, text: &str) {
        // "\r\n" split across chunks: the '\r' is still the last char of the carry.
        if text.starts_with('\n') && self.carry.ends_with('\r') {
            self.carry.pop();
            self.scanned = self.scanned.min(self.carry.len());
        }

        if text.contains("\r\n") {
            self.carry.push_str(&text.replace("\r\n", "\n"));
        } else {
            self.carry.push_str(text);
        }
    }

    /// Byte offset of the next separator, searching only unscanned text.
    fn next_separator(&mut self) -> Option<usize> {
        // a separator may start on the last byte already scanned
        let from = self.scanned.saturating_sub(1);
        let found = self.carry.as_bytes()[from..]
            .windows(EVENT_SEPARATOR.len())
            .position(|w| w == EVENT_SEPARATOR.as_bytes())
            .map(|p| from + p);

        if found.is_none() {
            self.scanned = self.carry.len();
        }
        found
    }

    fn drain_events(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();

        while let Some(pos) = self.next_separator() {
            let rest = self.carry.split_off(pos + EVENT_SEPARATOR.len());
            let mut segment = std::mem::replace(&mut self.carry, rest);
            segment.truncate(pos);
            self.scanned = 0;

            match self.parse_event(&segment) {
                Some(Frame::Terminator) => {
                    frames.push(Frame::Terminator);
                    self.finished = true;
                    self.carry.clear();
                    self.scanned = 0;
                    break;
                }
                Some(frame) => frames.push(frame),
                None => {}
            }
        }

        frames
    }

    fn parse_event(&mut self, segment: &str) -> Option<Frame> {
        if segment.trim().is_empty() {
            return None;
        }

        // Comments and keep-alives have no data line.
        let data = segment.lines().find_map(parse_sse_line)?;

        if is_done_marker(data) {
            return Some(Frame::Terminator);
        }

        match decode_payload(data) {
            Ok(content) => Some(Frame::Payload(content)),
            Err(e) => {
                self.dropped += 1;
                warn!(error = %e, data, "dropping malformed event");
                None
            }
        }
    }
}

/// Parse an SSE line to extract the data portion.
///
/// SSE lines are in the format: `data: <content>`. The payload is the
/// rest of the line, minus a trailing `\r`.
///
/// # Example
/// ```
/// use jsunpack::sse::parse_sse_line;
///
/// let line = "data: \"value\"";
/// assert_eq!(parse_sse_line(line), Some("\"value\""));
///
/// let line = ": keep-alive";
/// assert_eq!(parse_sse_line(line), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
        .map(|s| s.strip_suffix('\r').unwrap_or(s))
}

/// Check if an SSE data line indicates the stream is done.
///
/// # Example
/// ```
/// use jsunpack::sse::is_done_marker;
///
/// assert!(is_done_marker("[DONE]"));
/// assert!(!is_done_marker("\"[DONE]\""));
/// ```
pub fn is_done_marker(data: &str) -> bool {
    data == DONE_MARKER
}

/// Decode a JSON payload into the text it contributes.
///
/// Strings yield their unescaped content; any other JSON value yields its
/// compact JSON text.
pub fn decode_payload(data: &str) -> Result<String, serde_json::Error> {
    match serde_json::from_str::<Value>(data)? {
        Value::String(content) => Ok(content),
        other => Ok(other.to_string()),
    }
}
