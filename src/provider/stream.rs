//! Drives one chat request from connection to a terminal outcome.
//!
//! The worker never touches shared state: every delta and the final text are
//! sent as [`StreamEvent`]s over a channel, in order, and the receiving side
//! decides what to do with them.

use super::extract::ContentExtractor;
use super::frame::{FrameDecoder, FrameError, NdjsonDecoder, SseDecoder};
use super::{ollama, openai, Backend, ChatRequest, NetworkSettings, RequestId};
use crate::history::Message;
use futures_core::Stream;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;

pub const CANCELLED_MARKER: &str = "\n[Cancelled]\n";

const MAX_DETAIL_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk {
        id: RequestId,
        text: String,
    },
    /// Always the last event of a request.
    Finished {
        id: RequestId,
        text: String,
        outcome: Outcome,
    },
}

impl StreamEvent {
    pub fn id(&self) -> RequestId {
        match self {
            StreamEvent::Chunk { id, .. } | StreamEvent::Finished { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    Failed(StreamError),
}

impl Outcome {
    fn state(&self) -> StreamState {
        match self {
            Outcome::Completed => StreamState::Completed,
            Outcome::Cancelled => StreamState::Cancelled,
            Outcome::Failed(_) => StreamState::Failed,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("HTTP client init: {0}")]
    ClientInit(String),

    #[error("request: {0}")]
    Request(String),

    #[error("streaming: {message}{}", http_suffix(.status))]
    Transfer { message: String, status: Option<u16> },

    #[error("HTTP {code}{}", detail_suffix(.detail))]
    Status { code: u16, detail: String },

    #[error("streaming: {0}")]
    Frame(#[from] FrameError),
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

/// Runs chat requests. Cheap to clone; one clone per worker task.
#[derive(Debug, Clone)]
pub struct ChatStreamer {
    extractor: Arc<dyn ContentExtractor>,
}

impl ChatStreamer {
    pub fn new(extractor: Arc<dyn ContentExtractor>) -> Self {
        Self { extractor }
    }

    /// Run `req` to completion and send its events to `events`.
    ///
    /// `history` is the conversation to send to stateful backends, already
    /// including the user's prompt. Exactly one `Finished` event is sent, after
    /// every `Chunk` of this request.
    pub async fn run(
        &self,
        req: ChatRequest,
        history: Vec<Message>,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Outcome {
        let mut run = Run {
            req: &req,
            extractor: self.extractor.as_ref(),
            events: &events,
            state: StreamState::Idle,
            accum: String::new(),
        };
        let outcome = run.drive(&history).await;
        run.finish(outcome)
    }
}

/// Per-request accumulator and state machine.
struct Run<'a> {
    req: &'a ChatRequest,
    extractor: &'a dyn ContentExtractor,
    events: &'a mpsc::UnboundedSender<StreamEvent>,
    state: StreamState,
    accum: String,
}

impl Run<'_> {
    async fn drive(&mut self, history: &[Message]) -> Outcome {
        if self.req.is_cancelled() {
            return Outcome::Cancelled;
        }

        let http = match build_client(&self.req.network) {
            Ok(c) => c,
            Err(e) => return Outcome::Failed(StreamError::ClientInit(error_chain(&e))),
        };
        let request = match self.request_builder(&http, history) {
            Ok(r) => r,
            Err(e) => return Outcome::Failed(StreamError::Request(format!("{e:#}"))),
        };

        self.transition(StreamState::Connecting);
        let resp = tokio::select! {
            biased;
            _ = self.req.cancel.cancelled() => return Outcome::Cancelled,
            r = request.send() => r,
        };
        let resp = match resp {
            Ok(r) => r,
            Err(e) => return Outcome::Failed(StreamError::Request(error_chain(&e))),
        };

        let status = resp.status();
        tracing::debug!(id = %self.req.id, %status, "response headers received");
        self.transition(StreamState::Streaming);

        let leftover = if self.req.streaming {
            let mut decoder: Box<dyn FrameDecoder> = match self.req.backend {
                Backend::LocalChat => Box::new(NdjsonDecoder::new(self.req.network.max_carry_bytes)),
                Backend::OpenAiCompatible => Box::new(SseDecoder::new(self.req.network.max_carry_bytes)),
            };
            let body = std::pin::pin!(resp.bytes_stream());
            if let Err(outcome) = self.consume(body, decoder.as_mut(), status.as_u16()).await {
                return outcome;
            }
            if decoder.end_marker_seen() == Some(false) {
                tracing::debug!(id = %self.req.id, "event stream ended without [DONE]");
            }
            String::from_utf8_lossy(decoder.carry()).into_owned()
        } else {
            let body = tokio::select! {
                biased;
                _ = self.req.cancel.cancelled() => return Outcome::Cancelled,
                b = resp.bytes() => b,
            };
            let body = match body {
                Ok(b) => b,
                Err(e) => {
                    return Outcome::Failed(StreamError::Transfer {
                        message: error_chain(&e),
                        status: Some(status.as_u16()),
                    })
                }
            };
            match self.extractor.extract(&body) {
                Some(delta) => {
                    self.emit(delta);
                    String::new()
                }
                None => String::from_utf8_lossy(&body).into_owned(),
            }
        };

        if status.is_success() {
            Outcome::Completed
        } else {
            Outcome::Failed(StreamError::Status {
                code: status.as_u16(),
                detail: truncate(leftover.trim(), MAX_DETAIL_CHARS),
            })
        }
    }

    /// Feed every body chunk through `decoder` until the transfer ends.
    async fn consume<S, B>(
        &mut self,
        mut body: S,
        decoder: &mut dyn FrameDecoder,
        status: u16,
    ) -> Result<(), Outcome>
    where
        S: Stream<Item = reqwest::Result<B>> + Unpin,
        B: AsRef<[u8]>,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.req.cancel.cancelled() => return Err(Outcome::Cancelled),
                n = body.next() => n,
            };
            let bytes = match next {
                None => return Ok(()),
                Some(Ok(b)) => b,
                Some(Err(e)) => {
                    return Err(Outcome::Failed(StreamError::Transfer {
                        message: error_chain(&e),
                        status: Some(status),
                    }))
                }
            };
            if self.req.is_cancelled() {
                return Err(Outcome::Cancelled);
            }

            let frames = decoder
                .feed(bytes.as_ref())
                .map_err(|e| Outcome::Failed(StreamError::Frame(e)))?;
            for frame in frames {
                if self.req.is_cancelled() {
                    return Err(Outcome::Cancelled);
                }
                tracing::trace!(id = %self.req.id, len = frame.len(), "frame");
                if let Some(delta) = self.extractor.extract(&frame) {
                    self.emit(delta);
                }
            }
        }
    }

    fn request_builder(
        &self,
        http: &reqwest::Client,
        history: &[Message],
    ) -> anyhow::Result<reqwest::RequestBuilder> {
        let req = self.req;
        let builder = match req.backend {
            Backend::LocalChat => {
                let url = ollama::endpoint(&req.base_url);
                tracing::debug!(id = %req.id, %url, model = %req.model, turns = history.len(), "posting chat");
                http.post(url).json(&ollama::body(req, history))
            }
            Backend::OpenAiCompatible => {
                let url = openai::endpoint(&req.base_url);
                tracing::debug!(id = %req.id, %url, model = %req.model, "posting chat completion");
                http.post(url)
                    .headers(openai::headers(req)?)
                    .json(&openai::body(req))
            }
        };
        Ok(builder)
    }

    fn emit(&mut self, delta: String) {
        if delta.is_empty() {
            return;
        }
        self.accum.push_str(&delta);
        let event = StreamEvent::Chunk {
            id: self.req.id,
            text: delta,
        };
        if self.events.send(event).is_err() {
            // Nobody is listening any more; stop at the next check.
            tracing::debug!(id = %self.req.id, "event receiver dropped, cancelling");
            self.req.cancel.cancel();
        }
    }

    fn transition(&mut self, next: StreamState) {
        tracing::debug!(id = %self.req.id, from = ?self.state, to = ?next, "stream state");
        self.state = next;
    }

    /// The single exit path: append the marker or diagnostic, then report.
    fn finish(mut self, outcome: Outcome) -> Outcome {
        match &outcome {
            Outcome::Completed => {}
            Outcome::Cancelled => self.accum.push_str(CANCELLED_MARKER),
            Outcome::Failed(e) => {
                tracing::warn!(id = %self.req.id, error = %e, "chat request failed");
                self.accum.push_str(&format!("\n[Error] {e}\n"));
            }
        }
        self.transition(outcome.state());

        let _ = self.events.send(StreamEvent::Finished {
            id: self.req.id,
            text: std::mem::take(&mut self.accum),
            outcome: outcome.clone(),
        });
        outcome
    }
}

fn build_client(net: &NetworkSettings) -> reqwest::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
    if net.timeout_secs > 0 {
        builder = builder.timeout(Duration::from_secs(net.timeout_secs));
    }
    if let Some(proxy) = net.proxy.as_deref().filter(|p| !p.is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    builder.build()
}

/// `reqwest` hides the useful part of an error in its source chain.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut out = e.to_string();
    let mut src = e.source();
    while let Some(s) = src {
        let msg = s.to_string();
        if !out.contains(&msg) {
            out.push_str(": ");
            out.push_str(&msg);
        }
        src = s.source();
    }
    out
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
