use clap::{Parser, Subcommand};

/// Streaming chat client for Ollama and OpenAI-compatible servers
#[derive(Debug, Parser)]
#[command(name = "ai-chat")]
#[command(version)]
#[command(about = "Streaming chat client for Ollama and OpenAI-compatible servers", long_about = None)]
pub struct Args {
    /// Backend kind: "ollama" or "openai"
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Server base URL, e.g. http://127.0.0.1:11434
    #[arg(long = "base-url")]
    pub base_url: Option<String>,

    /// Model name
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,

    /// Sampling temperature, clamped to 0.0..=1.0
    #[arg(short = 't', long = "temperature")]
    pub temperature: Option<f64>,

    /// Ask the server for a single buffered response
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    /// Whole-request timeout in seconds (0 = none)
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Proxy URL for all requests
    #[arg(long = "proxy")]
    pub proxy: Option<String>,

    /// System prompt text
    #[arg(short = 's', long = "system", conflicts_with = "preset")]
    pub system: Option<String>,

    /// Use a saved prompt preset as the system prompt
    #[arg(short = 'p', long = "preset")]
    pub preset: Option<String>,

    /// Use a saved backend preset
    #[arg(long = "profile")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Prompt text (positional) (used when no subcommand is given)
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat; /reset clears history, /preset <name> switches prompt, /quit exits
    Repl,

    /// List or edit prompt presets
    Presets {
        #[command(subcommand)]
        action: Option<PresetAction>,
    },

    /// List or edit backend presets
    Backends {
        #[command(subcommand)]
        action: Option<BackendAction>,
    },

    /// Save the effective connection settings as a backend preset
    SaveBackend {
        /// Preset name
        name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum PresetAction {
    /// List presets (default)
    List,
    /// Add a preset or replace its text
    Set { name: String, content: String },
    /// Remove a preset
    Delete { name: String },
    /// Rename a preset
    Rename { old: String, new: String },
    /// Make a preset the default system prompt
    Use { name: String },
}

#[derive(Debug, Subcommand)]
pub enum BackendAction {
    /// List presets (default)
    List,
    /// Remove a preset
    Delete { name: String },
    /// Rename a preset
    Rename { old: String, new: String },
    /// Make a preset the default connection
    Use { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_flags() {
        let args = Args::try_parse_from([
            "ai-chat", "-b", "openai", "--no-stream", "--timeout", "5", "hello", "there",
        ])
        .unwrap();
        assert_eq!(args.backend.as_deref(), Some("openai"));
        assert!(args.no_stream);
        assert_eq!(args.timeout, Some(5));
        assert_eq!(args.prompt, vec!["hello", "there"]);
        assert!(args.cmd.is_none());
    }

    #[test]
    fn system_and_preset_conflict() {
        assert!(Args::try_parse_from(["ai-chat", "-s", "x", "-p", "y", "hi"]).is_err());
    }

    #[test]
    fn preset_and_backend_actions() {
        let args = Args::try_parse_from(["ai-chat", "presets"]).unwrap();
        assert!(matches!(args.cmd, Some(Command::Presets { action: None })));

        let args = Args::try_parse_from(["ai-chat", "presets", "set", "Pirate", "Arr."]).unwrap();
        assert!(matches!(
            args.cmd,
            Some(Command::Presets { action: Some(PresetAction::Set { ref name, ref content }) })
                if name == "Pirate" && content == "Arr."
        ));

        let args = Args::try_parse_from(["ai-chat", "backends", "rename", "a", "b"]).unwrap();
        assert!(matches!(
            args.cmd,
            Some(Command::Backends { action: Some(BackendAction::Rename { ref old, ref new }) })
                if old == "a" && new == "b"
        ));
    }

    #[test]
    fn save_backend_subcommand() {
        let args = Args::try_parse_from(["ai-chat", "--model", "m", "save-backend", "home"]).unwrap();
        assert!(matches!(args.cmd, Some(Command::SaveBackend { ref name }) if name == "home"));
    }
}
