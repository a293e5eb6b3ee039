use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Wire protocol family of a chat backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Ollama-style `/api/chat`, newline-delimited JSON.
    #[default]
    #[serde(alias = "ollama")]
    LocalChat,
    /// `/v1/chat/completions`, Server-Sent Events.
    #[serde(rename = "openai-compatible", alias = "openai")]
    OpenAiCompatible,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::LocalChat => "ollama",
            Backend::OpenAiCompatible => "openai",
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" | "local-chat" | "local" => Ok(Backend::LocalChat),
            "openai" | "openai-compatible" => Ok(Backend::OpenAiCompatible),
            other => anyhow::bail!("unknown backend: {other} (expected \"ollama\" or \"openai\")"),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-session request identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSettings {
    /// Whole-transfer timeout in seconds; 0 means unlimited.
    pub timeout_secs: u64,
    pub proxy: Option<String>,
    /// Upper bound for bytes buffered while waiting for a frame terminator.
    pub max_carry_bytes: Option<usize>,
}

/// Everything a session needs to turn a prompt into a [`ChatRequest`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub backend: Backend,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub streaming: bool,
    pub system_prompt: Option<String>,
    pub network: NetworkSettings,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            backend: Backend::LocalChat,
            base_url: "http://127.0.0.1:11434".to_string(),
            model: "llama3:8b".to_string(),
            api_key: None,
            temperature: 0.2,
            streaming: true,
            system_prompt: None,
            network: NetworkSettings {
                timeout_secs: 120,
                proxy: None,
                max_carry_bytes: Some(DEFAULT_MAX_CARRY_BYTES),
            },
        }
    }
}

pub const DEFAULT_MAX_CARRY_BYTES: usize = 8 * 1024 * 1024;

/// One submitted chat turn. Only the cancel token changes after creation.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub id: RequestId,
    pub prompt: String,
    pub backend: Backend,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub streaming: bool,
    pub system_prompt: Option<String>,
    pub network: NetworkSettings,
    pub cancel: CancellationToken,
}

impl ChatRequest {
    pub fn from_settings(id: RequestId, prompt: impl Into<String>, settings: &ChatSettings) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            backend: settings.backend,
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
            temperature: settings.temperature.clamp(0.0, 1.0),
            streaming: settings.streaming,
            system_prompt: settings.system_prompt.clone().filter(|s| !s.trim().is_empty()),
            network: settings.network.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_both_spellings() {
        assert_eq!("ollama".parse::<Backend>().unwrap(), Backend::LocalChat);
        assert_eq!("Local-Chat".parse::<Backend>().unwrap(), Backend::LocalChat);
        assert_eq!("openai".parse::<Backend>().unwrap(), Backend::OpenAiCompatible);
        assert!("gemini".parse::<Backend>().is_err());
    }

    #[test]
    fn request_clamps_temperature_and_drops_empty_key() {
        let settings = ChatSettings {
            temperature: 3.5,
            api_key: Some(String::new()),
            system_prompt: Some("  ".into()),
            ..ChatSettings::default()
        };
        let req = ChatRequest::from_settings(RequestId(1), "hi", &settings);
        assert_eq!(req.temperature, 1.0);
        assert!(req.api_key.is_none());
        assert!(req.system_prompt.is_none());
        assert!(!req.is_cancelled());
    }
}
