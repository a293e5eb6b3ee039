//! Pull the text delta out of one decoded frame.

use crate::json;
use std::ops::Range;

/// Turns one frame into the text it carries, if any.
///
/// Frames without a recognisable content field yield `None`; that is never an
/// error for the stream.
pub trait ContentExtractor: Send + Sync + std::fmt::Debug {
    fn extract(&self, frame: &[u8]) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Heuristic,
    Strict,
}

impl ExtractorKind {
    pub fn build(self) -> std::sync::Arc<dyn ContentExtractor> {
        match self {
            ExtractorKind::Heuristic => std::sync::Arc::new(HeuristicExtractor),
            ExtractorKind::Strict => std::sync::Arc::new(StrictExtractor),
        }
    }
}

/// Scans for the first `"content"` key without parsing the document.
///
/// This accepts any response shape that carries a `"content": "..."` pair,
/// at the price of mis-scanning pathological input such as a value ending in
/// an escaped backslash (`"a\\"`).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl HeuristicExtractor {
    /// Byte range of the string value following the first `"content"` key.
    pub fn content_range(frame: &[u8]) -> Option<Range<usize>> {
        const KEY: &[u8] = b"\"content\"";

        let key = super::frame::find_slice(frame, KEY)?;
        let after_key = key + KEY.len();
        let colon = after_key + super::frame::find_byte(&frame[after_key..], b':')?;

        let mut open = colon + 1;
        while frame.get(open) == Some(&b' ') {
            open += 1;
        }
        if frame.get(open) != Some(&b'"') {
            return None;
        }

        let start = open + 1;
        let mut p = start;
        while p < frame.len() {
            if frame[p] == b'"' && frame[p - 1] != b'\\' {
                return Some(start..p);
            }
            p += 1;
        }
        None
    }
}

impl ContentExtractor for HeuristicExtractor {
    fn extract(&self, frame: &[u8]) -> Option<String> {
        let range = Self::content_range(frame)?;
        Some(json::unescape_range(frame, range.start, range.end))
    }
}

/// Parses the frame as JSON and reads the content from the known response
/// shapes of both backend families.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictExtractor;

impl ContentExtractor for StrictExtractor {
    fn extract(&self, frame: &[u8]) -> Option<String> {
        let body = frame.strip_prefix(b"data:").unwrap_or(frame);
        let value: serde_json::Value = serde_json::from_slice(body).ok()?;

        let choice = value.pointer("/choices/0");
        let content = value
            .pointer("/message/content")
            .or_else(|| choice.and_then(|c| c.pointer("/delta/content")))
            .or_else(|| choice.and_then(|c| c.pointer("/message/content")))
            .or_else(|| value.get("content"))?;

        content.as_str().map(str::to_owned)
    }
}
