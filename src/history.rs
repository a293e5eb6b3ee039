use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Ordered conversation turns sent to stateful backends.
///
/// Holds at most one system entry, always first. It is inserted from the
/// configured system prompt on construction and on every [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    system_prompt: Option<String>,
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new(system_prompt: Option<String>) -> Self {
        let mut h = Self {
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
            messages: Vec::new(),
        };
        h.reset();
        h
    }

    /// Clear every turn and reinsert the system entry, if one is configured.
    pub fn reset(&mut self) {
        self.messages.clear();
        if let Some(sys) = &self.system_prompt {
            self.messages.push(Message::new(Role::System, sys.clone()));
        }
    }

    /// Replace the configured system prompt. Takes effect on the next reset.
    pub fn set_system_prompt(&mut self, system_prompt: Option<String>) {
        self.system_prompt = system_prompt.filter(|s| !s.trim().is_empty());
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        if role == Role::System && self.has_system_entry() {
            tracing::warn!("ignoring second system entry in conversation history");
            return;
        }
        self.messages.push(Message::new(role, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The history as a JSON array of `{"role", "content"}` objects.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.messages)
    }

    fn has_system_entry(&self) -> bool {
        self.messages.iter().any(|m| m.role == Role::System)
    }
}
