//! OpenAI-compatible `/v1/chat/completions` wire format.

use super::ChatRequest;
use crate::history::{Message, Role};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;

pub fn endpoint(base_url: &str) -> String {
    format!("{}/v1/chat/completions", base_url.trim_end_matches('/'))
}

pub fn headers(req: &ChatRequest) -> anyhow::Result<HeaderMap> {
    let mut h = HeaderMap::new();
    if let Some(key) = &req.api_key {
        let v = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| anyhow::anyhow!("invalid API key header: {e}"))?;
        h.insert(AUTHORIZATION, v);
    }
    Ok(h)
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatBody<'a> {
    pub model: &'a str,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub stream: bool,
}

/// Only the system prompt and the current turn are sent, never the history.
pub fn body(req: &ChatRequest) -> ChatBody<'_> {
    let mut messages = Vec::with_capacity(2);
    if let Some(sys) = &req.system_prompt {
        messages.push(Message::new(Role::System, sys.clone()));
    }
    messages.push(Message::new(Role::User, req.prompt.clone()));

    ChatBody {
        model: &req.model,
        messages,
        temperature: req.temperature,
        stream: req.streaming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Backend, ChatSettings, RequestId};

    fn request(api_key: Option<&str>, system: Option<&str>) -> ChatRequest {
        let settings = ChatSettings {
            backend: Backend::OpenAiCompatible,
            model: "gpt-4o-mini".into(),
            api_key: api_key.map(str::to_owned),
            system_prompt: system.map(str::to_owned),
            temperature: 0.7,
            streaming: false,
            ..ChatSettings::default()
        };
        ChatRequest::from_settings(RequestId(3), "hello", &settings)
    }

    #[test]
    fn endpoint_joins_path() {
        assert_eq!(endpoint("https://api.example.com/"), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn authorization_only_with_key() {
        assert!(headers(&request(None, None)).unwrap().get(AUTHORIZATION).is_none());
        let h = headers(&request(Some("sk-test"), None)).unwrap();
        assert_eq!(h.get(AUTHORIZATION).unwrap(), "Bearer sk-test");
    }

    #[test]
    fn invalid_key_is_an_error() {
        assert!(headers(&request(Some("bad\nkey"), None)).is_err());
    }

    #[test]
    fn body_with_system_prompt() {
        let req = request(None, Some("be terse"));
        let value = serde_json::to_value(body(&req)).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "be terse"},
                    {"role": "user", "content": "hello"}
                ],
                "temperature": 0.7,
                "stream": false
            })
        );
    }

    #[test]
    fn body_without_system_prompt() {
        let req = request(None, None);
        let value = serde_json::to_value(body(&req)).unwrap();
        assert_eq!(value["messages"], serde_json::json!([{"role": "user", "content": "hello"}]));
    }
}
