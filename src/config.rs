use ai_chat::provider::{ExtractorKind, DEFAULT_MAX_CARRY_BYTES};
use ai_chat::{Backend, ChatSettings, NetworkSettings};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A named system prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptPreset {
    pub name: String,
    pub content: String,
}

/// A named set of connection settings.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendPreset {
    pub name: String,
    #[serde(default)]
    pub backend: Backend,
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub backend: Backend,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub temperature: f64,
    pub streaming: bool,

    /// Whole-request timeout in seconds (0 = no limit).
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    /// Cap on buffered bytes of one unterminated frame (0 = no limit).
    pub max_carry_bytes: usize,
    pub extractor: ExtractorKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_backend: Option<String>,

    pub prompt_presets: Vec<PromptPreset>,
    pub backends: Vec<BackendPreset>,
}

fn default_temperature() -> f64 {
    0.2
}

fn redacted(key: &Option<String>) -> Option<&'static str> {
    key.as_ref().map(|_| "<redacted>")
}

impl std::fmt::Debug for BackendPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendPreset")
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", &redacted(&self.api_key))
            .finish()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redacted(&self.api_key))
            .field("temperature", &self.temperature)
            .field("streaming", &self.streaming)
            .field("timeout_secs", &self.timeout_secs)
            .field("proxy", &self.proxy)
            .field("max_carry_bytes", &self.max_carry_bytes)
            .field("extractor", &self.extractor)
            .field("system_prompt", &self.system_prompt)
            .field("active_preset", &self.active_preset)
            .field("active_backend", &self.active_backend)
            .field("prompt_presets", &self.prompt_presets.len())
            .field("backends", &self.backends)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let chat = ChatSettings::default();
        Self {
            backend: chat.backend,
            base_url: chat.base_url,
            model: chat.model,
            api_key: None,
            temperature: chat.temperature,
            streaming: chat.streaming,
            timeout_secs: chat.network.timeout_secs,
            proxy: None,
            max_carry_bytes: DEFAULT_MAX_CARRY_BYTES,
            extractor: ExtractorKind::default(),
            system_prompt: None,
            active_preset: None,
            active_backend: None,
            prompt_presets: default_presets(),
            backends: Vec::new(),
        }
    }
}

fn default_presets() -> Vec<PromptPreset> {
    [
        (
            "General assistant",
            "You are a helpful and concise AI assistant. Answer clearly and directly.",
        ),
        (
            "Expert coder",
            "You are a programming expert. Provide clean, well-commented and efficient code. \
             Briefly explain your technical choices.",
        ),
        (
            "Reviewer",
            "You are a code reviewer. Analyse the code you are given and suggest improvements \
             to readability, performance and security.",
        ),
    ]
    .into_iter()
    .map(|(name, content)| PromptPreset {
        name: name.to_string(),
        content: content.to_string(),
    })
    .collect()
}

impl Config {
    /// Load config if the file exists, otherwise return Ok(None).
    pub fn load_optional(path: impl AsRef<Path>) -> anyhow::Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e))
                    .with_context(|| format!("failed to read config: {}", path.display()))
            }
        };

        let s = String::from_utf8(bytes).context("config is not valid UTF-8")?;
        let cfg: Config = toml::from_str(&s)
            .with_context(|| format!("failed to parse TOML: {}", path.display()))?;
        Ok(Some(cfg))
    }

    /// Write the config through a temp file and rename it into place.
    pub fn save_atomic(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory: {}", dir.display()))?;

        let tmp = tmp_path(path);
        let text = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(&tmp, text)
            .with_context(|| format!("failed to write temp config: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move config into place: {}", path.display()))?;
        Ok(())
    }

    /// Apply `AI_CHAT_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("AI_CHAT_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("AI_CHAT_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(model) = std::env::var("AI_CHAT_MODEL") {
            self.model = model;
        }
    }

    /// Settings for the chat session, with the active presets resolved.
    pub fn settings(&self) -> ChatSettings {
        let system_prompt = self
            .active_preset
            .as_deref()
            .and_then(|name| self.preset_content(name))
            .map(str::to_owned)
            .or_else(|| self.system_prompt.clone())
            .filter(|s| !s.trim().is_empty());

        ChatSettings {
            backend: self.backend,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone().filter(|k| !k.is_empty()),
            temperature: self.temperature.clamp(0.0, 1.0),
            streaming: self.streaming,
            system_prompt,
            network: NetworkSettings {
                timeout_secs: self.timeout_secs,
                proxy: self.proxy.clone().filter(|p| !p.is_empty()),
                max_carry_bytes: (self.max_carry_bytes > 0).then_some(self.max_carry_bytes),
            },
        }
    }

    // --- prompt presets ---

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.prompt_presets.iter().map(|p| p.name.as_str())
    }

    pub fn preset_content(&self, name: &str) -> Option<&str> {
        self.prompt_presets
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.content.as_str())
    }

    /// Add a preset or replace the content of an existing one.
    pub fn set_preset(&mut self, name: &str, content: &str) {
        match self.prompt_presets.iter_mut().find(|p| p.name == name) {
            Some(p) => p.content = content.to_string(),
            None => self.prompt_presets.push(PromptPreset {
                name: name.to_string(),
                content: content.to_string(),
            }),
        }
    }

    pub fn delete_preset(&mut self, name: &str) -> bool {
        let before = self.prompt_presets.len();
        self.prompt_presets.retain(|p| p.name != name);
        if self.active_preset.as_deref() == Some(name) {
            self.active_preset = None;
        }
        self.prompt_presets.len() != before
    }

    /// Fails if `old` is missing or `new` is already taken.
    pub fn rename_preset(&mut self, old: &str, new: &str) -> bool {
        if old != new && self.preset_content(new).is_some() {
            return false;
        }
        let Some(p) = self.prompt_presets.iter_mut().find(|p| p.name == old) else {
            return false;
        };
        p.name = new.to_string();
        if self.active_preset.as_deref() == Some(old) {
            self.active_preset = Some(new.to_string());
        }
        true
    }

    /// Make `name` the active system prompt.
    pub fn apply_preset(&mut self, name: &str) -> anyhow::Result<()> {
        let content = self
            .preset_content(name)
            .with_context(|| format!("no such prompt preset: {name}"))?
            .to_string();
        self.system_prompt = Some(content);
        self.active_preset = Some(name.to_string());
        Ok(())
    }

    // --- backend presets ---

    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|b| b.name.as_str())
    }

    pub fn backend(&self, name: &str) -> Option<&BackendPreset> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// Store the current connection settings under `name`.
    pub fn save_backend(&mut self, name: &str) {
        let preset = BackendPreset {
            name: name.to_string(),
            backend: self.backend,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            api_key: self.api_key.clone(),
        };
        self.put_backend(preset);
    }

    /// Insert or replace a backend preset by name and mark it active.
    pub fn put_backend(&mut self, preset: BackendPreset) {
        self.active_backend = Some(preset.name.clone());
        match self.backends.iter_mut().find(|b| b.name == preset.name) {
            Some(b) => *b = preset,
            None => self.backends.push(preset),
        }
    }

    pub fn delete_backend(&mut self, name: &str) -> bool {
        let before = self.backends.len();
        self.backends.retain(|b| b.name != name);
        if self.active_backend.as_deref() == Some(name) {
            self.active_backend = None;
        }
        self.backends.len() != before
    }

    pub fn rename_backend(&mut self, old: &str, new: &str) -> bool {
        if old != new && self.backend(new).is_some() {
            return false;
        }
        let Some(b) = self.backends.iter_mut().find(|b| b.name == old) else {
            return false;
        };
        b.name = new.to_string();
        if self.active_backend.as_deref() == Some(old) {
            self.active_backend = Some(new.to_string());
        }
        true
    }

    /// Copy a backend preset into the current connection settings.
    pub fn apply_backend(&mut self, name: &str) -> anyhow::Result<()> {
        let b = self
            .backend(name)
            .with_context(|| format!("no such backend preset: {name}"))?
            .clone();
        self.backend = b.backend;
        self.base_url = b.base_url;
        self.model = b.model;
        self.temperature = b.temperature;
        self.api_key = b.api_key;
        self.active_backend = Some(b.name);
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut p = path.to_path_buf();
    let file = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "config.toml".to_string());
    p.set_file_name(format!("{file}.tmp"));
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_local_ollama() {
        let cfg = Config::default();
        let s = cfg.settings();
        assert_eq!(s.backend, Backend::LocalChat);
        assert_eq!(s.base_url, "http://127.0.0.1:11434");
        assert_eq!(s.model, "llama3:8b");
        assert!(s.streaming);
        assert_eq!(s.network.timeout_secs, 120);
        assert_eq!(s.network.max_carry_bytes, Some(DEFAULT_MAX_CARRY_BYTES));
        assert_eq!(cfg.preset_names().count(), 3);
    }

    #[test]
    fn parses_partial_toml() {
        let cfg: Config = toml::from_str(
            r#"
            backend = "openai"
            base_url = "https://api.example.com"
            model = "gpt-4o-mini"
            api_key = "sk-1"
            timeout_secs = 0
            max_carry_bytes = 0
            extractor = "strict"

            [[backends]]
            name = "home"
            backend = "ollama"
            base_url = "http://nas:11434"
            model = "qwen2.5"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.backend, Backend::OpenAiCompatible);
        assert_eq!(cfg.extractor, ExtractorKind::Strict);
        assert!(cfg.streaming);
        let s = cfg.settings();
        assert_eq!(s.api_key.as_deref(), Some("sk-1"));
        assert_eq!(s.network.max_carry_bytes, None);
        assert_eq!(cfg.backend("home").unwrap().temperature, 0.2);
    }

    #[test]
    fn active_preset_wins_over_plain_system_prompt() {
        let mut cfg = Config {
            system_prompt: Some("plain".into()),
            ..Config::default()
        };
        assert_eq!(cfg.settings().system_prompt.as_deref(), Some("plain"));
        cfg.apply_preset("Reviewer").unwrap();
        assert!(cfg.settings().system_prompt.unwrap().starts_with("You are a code reviewer"));
        assert!(cfg.apply_preset("missing").is_err());
    }

    #[test]
    fn preset_management() {
        let mut cfg = Config::default();
        cfg.set_preset("Pirate", "Talk like a pirate.");
        assert_eq!(cfg.preset_content("Pirate"), Some("Talk like a pirate."));
        cfg.set_preset("Pirate", "Arr.");
        assert_eq!(cfg.preset_content("Pirate"), Some("Arr."));

        cfg.apply_preset("Pirate").unwrap();
        assert!(!cfg.rename_preset("Pirate", "Reviewer"));
        assert!(cfg.rename_preset("Pirate", "Corsair"));
        assert_eq!(cfg.active_preset.as_deref(), Some("Corsair"));

        assert!(cfg.delete_preset("Corsair"));
        assert!(!cfg.delete_preset("Corsair"));
        assert!(cfg.active_preset.is_none());
    }

    #[test]
    fn backend_presets_round_trip_current_settings() {
        let mut cfg = Config::default();
        cfg.save_backend("local");

        cfg.backend = Backend::OpenAiCompatible;
        cfg.base_url = "https://api.example.com".into();
        cfg.model = "gpt".into();
        cfg.api_key = Some("k".into());
        cfg.save_backend("cloud");
        assert_eq!(cfg.backend_names().collect::<Vec<_>>(), vec!["local", "cloud"]);

        cfg.apply_backend("local").unwrap();
        assert_eq!(cfg.backend, Backend::LocalChat);
        assert_eq!(cfg.model, "llama3:8b");
        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.active_backend.as_deref(), Some("local"));

        assert!(cfg.rename_backend("cloud", "remote"));
        assert!(!cfg.rename_backend("nope", "x"));
        assert!(cfg.delete_backend("remote"));
        assert!(cfg.apply_backend("remote").is_err());
    }

    #[test]
    fn save_and_reload() {
        let dir = std::env::temp_dir().join(format!("ai-chat-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let mut cfg = Config::default();
        cfg.set_preset("Mine", "custom");
        cfg.save_backend("local");
        cfg.save_atomic(&path).unwrap();

        let loaded = Config::load_optional(&path).unwrap().unwrap();
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn debug_output_hides_api_keys() {
        let mut cfg = Config {
            api_key: Some("sk-secret-1".into()),
            ..Config::default()
        };
        cfg.save_backend("cloud");
        cfg.api_key = Some("sk-secret-2".into());

        let out = format!("{cfg:?}");
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("<redacted>"));
        assert!(out.contains("cloud"));
    }

    #[test]
    fn missing_file_is_none() {
        let path = std::env::temp_dir().join("ai-chat-definitely-missing.toml");
        assert!(Config::load_optional(path).unwrap().is_none());
    }
}
