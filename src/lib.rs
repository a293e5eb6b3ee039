//! Streaming chat-completion client for Ollama-style and OpenAI-compatible
//! backends.
//!
//! A [`Session`] owns the conversation and the single in-flight request. Each
//! request runs on its own Tokio task ([`provider::ChatStreamer`]), which
//! frames the response body, extracts the text deltas and reports back over a
//! channel. The session turns those events into [`ChatObserver`] callbacks on
//! the caller's side.

pub mod history;
pub mod json;
pub mod provider;
pub mod session;

pub use history::{ConversationHistory, Message, Role};
pub use provider::{Backend, ChatRequest, ChatSettings, NetworkSettings, Outcome, RequestId};
pub use session::{ChatObserver, Session};
