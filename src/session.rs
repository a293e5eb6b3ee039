//! The control-side half of a chat: history, the single in-flight request,
//! and delivery of worker events to the UI.

use crate::history::{ConversationHistory, Role};
use crate::provider::{
    Backend, ChatRequest, ChatSettings, ChatStreamer, ContentExtractor, Outcome, RequestId,
    StreamError, StreamEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Receives the visible effects of a chat. Always called on the thread that
/// owns the [`Session`], never from a worker.
pub trait ChatObserver {
    fn on_chunk(&mut self, id: RequestId, text: &str);
    fn on_complete(&mut self, id: RequestId, text: &str);
    fn on_busy_changed(&mut self, busy: bool);
}

#[derive(Debug)]
struct ActiveRequest {
    id: RequestId,
    cancel: CancellationToken,
    task: Option<JoinHandle<Outcome>>,
}

enum Next {
    Event(Option<StreamEvent>),
    Joined(Result<Outcome, JoinError>),
}

pub struct Session<O> {
    settings: ChatSettings,
    history: ConversationHistory,
    streamer: ChatStreamer,
    observer: O,
    current: Option<ActiveRequest>,
    next_id: u64,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: mpsc::UnboundedReceiver<StreamEvent>,
}

impl<O> std::fmt::Debug for Session<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("settings", &self.settings)
            .field("history", &self.history.len())
            .field("current", &self.current.as_ref().map(|a| a.id))
            .finish_non_exhaustive()
    }
}

impl<O: ChatObserver> Session<O> {
    pub fn new(settings: ChatSettings, extractor: Arc<dyn ContentExtractor>, observer: O) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            history: ConversationHistory::new(settings.system_prompt.clone()),
            settings,
            streamer: ChatStreamer::new(extractor),
            observer,
            current: None,
            next_id: 1,
            events_tx,
            events_rx,
        }
    }

    /// Start a request for `prompt` on a new Tokio task.
    ///
    /// Returns `None` without side effects while another request is in
    /// flight. Must be called from within a Tokio runtime.
    pub fn submit(&mut self, prompt: impl Into<String>) -> Option<RequestId> {
        if let Some(active) = &self.current {
            tracing::debug!(busy_with = %active.id, "submit ignored while a request is in flight");
            return None;
        }

        let id = RequestId(self.next_id);
        self.next_id += 1;

        let prompt = prompt.into();
        let req = ChatRequest::from_settings(id, prompt.clone(), &self.settings);
        self.history.append(Role::User, prompt);
        let history = match req.backend {
            Backend::LocalChat => self.history.messages().to_vec(),
            Backend::OpenAiCompatible => Vec::new(),
        };

        tracing::info!(%id, backend = %req.backend, model = %req.model, streaming = req.streaming, "submitting chat request");
        let cancel = req.cancel.clone();
        self.observer.on_busy_changed(true);

        let streamer = self.streamer.clone();
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move { streamer.run(req, history, tx).await });

        self.current = Some(ActiveRequest {
            id,
            cancel,
            task: Some(task),
        });
        Some(id)
    }

    /// Ask the in-flight request to stop. Idempotent; a no-op when idle.
    pub fn cancel(&self) {
        if let Some(active) = &self.current {
            if !active.cancel.is_cancelled() {
                tracing::info!(id = %active.id, "cancelling chat request");
            }
            active.cancel.cancel();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    pub fn current_request(&self) -> Option<RequestId> {
        self.current.as_ref().map(|a| a.id)
    }

    /// Clear the conversation, keeping the configured system prompt.
    pub fn reset_history(&mut self) {
        self.history
            .set_system_prompt(self.settings.system_prompt.clone());
        self.history.reset();
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    /// Changes apply to the next submitted request.
    pub fn settings_mut(&mut self) -> &mut ChatSettings {
        &mut self.settings
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Wait for the next event of the in-flight request.
    ///
    /// Returns `None` when no request is active and nothing is queued. If the
    /// worker dies without reporting, a `Finished` event is synthesised so the
    /// session never stays busy.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if let Ok(ev) = self.events_rx.try_recv() {
            return Some(ev);
        }
        let active = self.current.as_mut()?;
        let Some(task) = active.task.as_mut() else {
            return self.events_rx.recv().await;
        };

        let next = tokio::select! {
            biased;
            ev = self.events_rx.recv() => Next::Event(ev),
            joined = task => Next::Joined(joined),
        };

        match next {
            Next::Event(ev) => ev,
            Next::Joined(joined) => {
                active.task = None;
                if let Ok(ev) = self.events_rx.try_recv() {
                    return Some(ev);
                }
                let err = match joined {
                    Ok(_) => "worker exited without a final event".to_string(),
                    Err(e) => format!("worker failed: {e}"),
                };
                tracing::error!(id = %active.id, "{err}");
                let err = StreamError::Request(err);
                Some(StreamEvent::Finished {
                    id: active.id,
                    text: format!("\n[Error] {err}\n"),
                    outcome: Outcome::Failed(err),
                })
            }
        }
    }

    /// Apply one worker event: forward chunks, or run the terminal action.
    pub fn dispatch(&mut self, event: StreamEvent) {
        let Some(active) = &self.current else {
            tracing::debug!(id = %event.id(), "dropping event with no active request");
            return;
        };
        if event.id() != active.id {
            tracing::debug!(id = %event.id(), current = %active.id, "dropping stale event");
            return;
        }

        match event {
            StreamEvent::Chunk { id, text } => {
                // Deltas already queued when cancel was requested are not shown.
                if active.cancel.is_cancelled() {
                    return;
                }
                self.observer.on_chunk(id, &text);
            }
            StreamEvent::Finished { id, text, outcome } => {
                tracing::info!(%id, ?outcome, chars = text.chars().count(), "chat request finished");
                if !text.is_empty() {
                    self.history.append(Role::Assistant, text.clone());
                }
                self.observer.on_complete(id, &text);
                self.current = None;
                self.observer.on_busy_changed(false);
            }
        }
    }

    /// Deliver events until no request is in flight.
    pub async fn wait_idle(&mut self) {
        while self.is_busy() {
            match self.next_event().await {
                Some(ev) => self.dispatch(ev),
                None => break,
            }
        }
    }
}

impl<O> Drop for Session<O> {
    fn drop(&mut self) {
        if let Some(active) = &self.current {
            active.cancel.cancel();
        }
    }
}
