#![allow(dead_code)]

use ai_chat::provider::HeuristicExtractor;
use ai_chat::{ChatObserver, ChatSettings, RequestId, Session};
use std::sync::Arc;
use std::time::Duration;

/// Observer that records every callback for later assertions.
#[derive(Debug, Default)]
pub struct Recorder {
    pub chunks: Vec<String>,
    pub completed: Vec<String>,
    pub busy: Vec<bool>,
}

impl ChatObserver for Recorder {
    fn on_chunk(&mut self, _id: RequestId, text: &str) {
        self.chunks.push(text.to_string());
    }

    fn on_complete(&mut self, _id: RequestId, text: &str) {
        self.completed.push(text.to_string());
    }

    fn on_busy_changed(&mut self, busy: bool) {
        self.busy.push(busy);
    }
}

pub fn session(settings: ChatSettings) -> Session<Recorder> {
    Session::new(settings, Arc::new(HeuristicExtractor), Recorder::default())
}

/// `wait_idle` with a deadline so a hung request fails the test instead of
/// blocking it.
pub async fn finish(session: &mut Session<Recorder>) {
    tokio::time::timeout(Duration::from_secs(10), session.wait_idle())
        .await
        .expect("request did not finish in time");
}

pub fn ndjson(deltas: &[&str]) -> String {
    let mut body = String::new();
    for d in deltas {
        body.push_str(&serde_json::json!({"message": {"role": "assistant", "content": d}, "done": false}).to_string());
        body.push('\n');
    }
    body.push_str(r#"{"message":{"role":"assistant","content":""},"done":true}"#);
    body.push('\n');
    body
}

pub fn sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for d in deltas {
        let frame = serde_json::json!({"choices": [{"index": 0, "delta": {"content": d}}]});
        body.push_str(&format!("data: {frame}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
