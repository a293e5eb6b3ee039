//! Incremental framing for streamed response bodies.
//!
//! A decoder is fed raw byte chunks exactly as they come off the socket and
//! hands back every frame that became complete, keeping the unterminated tail
//! as its carry for the next call.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("unterminated frame exceeds {limit} bytes ({buffered} buffered)")]
    CarryOverflow { limit: usize, buffered: usize },
}

pub trait FrameDecoder: Send {
    /// Append `bytes` to the carry and drain every complete frame.
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, FrameError>;

    /// Bytes received but not yet part of a complete frame.
    fn carry(&self) -> &[u8];

    /// Whether the protocol's end-of-stream sentinel arrived. `None` for
    /// framings that have no sentinel.
    fn end_marker_seen(&self) -> Option<bool> {
        None
    }
}

fn check_carry(carry: &[u8], limit: Option<usize>) -> Result<(), FrameError> {
    match limit {
        Some(limit) if carry.len() > limit => Err(FrameError::CarryOverflow {
            limit,
            buffered: carry.len(),
        }),
        _ => Ok(()),
    }
}

/// Newline-delimited JSON: one frame per non-empty line.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    carry: Vec<u8>,
    max_carry: Option<usize>,
}

impl NdjsonDecoder {
    pub fn new(max_carry: Option<usize>) -> Self {
        Self {
            carry: Vec::new(),
            max_carry,
        }
    }
}

impl FrameDecoder for NdjsonDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.carry.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut consumed = 0;
        while let Some(nl) = find_byte(&self.carry[consumed..], b'\n') {
            let line = &self.carry[consumed..consumed + nl];
            if !line.is_empty() {
                frames.push(line.to_vec());
            }
            consumed += nl + 1;
        }
        self.carry.drain(..consumed);

        check_carry(&self.carry, self.max_carry)?;
        Ok(frames)
    }

    fn carry(&self) -> &[u8] {
        &self.carry
    }
}

const DATA_FIELD: &[u8] = b"data:";
const EVENT_END: &[u8] = b"\n\n";
const DONE_MARKER: &[u8] = b"[DONE]";

/// Server-Sent Events: one frame per `data: ...\n\n` block.
///
/// Frames start at `data:` and exclude the blank-line terminator. Anything
/// before `data:` in a block (`event:`, `id:`, comments) is discarded. The
/// `[DONE]` sentinel is swallowed and only recorded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    carry: Vec<u8>,
    max_carry: Option<usize>,
    saw_done: bool,
}

impl SseDecoder {
    pub fn new(max_carry: Option<usize>) -> Self {
        Self {
            carry: Vec::new(),
            max_carry,
            saw_done: false,
        }
    }

    /// Whether the explicit end-of-stream frame has been seen.
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    fn is_done_frame(frame: &[u8]) -> bool {
        let body = &frame[DATA_FIELD.len()..];
        let body = body.strip_prefix(b" ").unwrap_or(body);
        body == DONE_MARKER
    }
}

impl FrameDecoder for SseDecoder {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.carry.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut consumed = 0;
        loop {
            let rest = &self.carry[consumed..];
            let Some(start) = find_slice(rest, DATA_FIELD) else {
                break;
            };
            let Some(len) = find_slice(&rest[start..], EVENT_END) else {
                break;
            };

            let frame = &rest[start..start + len];
            if Self::is_done_frame(frame) {
                tracing::trace!("sse stream signalled [DONE]");
                self.saw_done = true;
            } else {
                frames.push(frame.to_vec());
            }
            consumed += start + len + EVENT_END.len();
        }
        self.carry.drain(..consumed);

        check_carry(&self.carry, self.max_carry)?;
        Ok(frames)
    }

    fn carry(&self) -> &[u8] {
        &self.carry
    }

    fn end_marker_seen(&self) -> Option<bool> {
        Some(self.saw_done())
    }
}

pub(crate) fn find_byte(haystack: &[u8], needle: u8) -> Option<usize> {
    haystack.iter().position(|&b| b == needle)
}

pub(crate) fn find_slice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
