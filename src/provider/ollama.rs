//! Ollama-style `/api/chat` wire format.

use super::ChatRequest;
use crate::history::Message;
use serde::Serialize;

pub fn endpoint(base_url: &str) -> String {
    format!("{}/api/chat", base_url.trim_end_matches('/'))
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatBody<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
    pub options: Options,
}

#[derive(Debug, Clone, Serialize)]
pub struct Options {
    pub temperature: f64,
}

/// The whole conversation is sent on every turn; the server keeps no state.
pub fn body<'a>(req: &'a ChatRequest, history: &'a [Message]) -> ChatBody<'a> {
    ChatBody {
        model: &req.model,
        messages: history,
        stream: req.streaming,
        options: Options {
            temperature: req.temperature,
        },
    }
}
