pub mod extract;
pub mod frame;
pub mod ollama;
pub mod openai;
pub mod stream;
mod types;

pub use extract::{ContentExtractor, ExtractorKind, HeuristicExtractor, StrictExtractor};
pub use frame::{FrameDecoder, FrameError, NdjsonDecoder, SseDecoder};
pub use stream::{ChatStreamer, Outcome, StreamError, StreamEvent, StreamState, CANCELLED_MARKER};
pub use types::{
    Backend, ChatRequest, ChatSettings, NetworkSettings, RequestId, DEFAULT_MAX_CARRY_BYTES,
};
