use crate::cli::{self, BackendAction, PresetAction};
use crate::{config::Config, paths};
use ai_chat::provider::{Outcome, StreamEvent};
use ai_chat::{Backend, ChatObserver, RequestId, Session};
use anyhow::Context;
use std::io::Write;
use tokio::io::AsyncBufReadExt;

/// Prints deltas as they arrive, then whatever the final text adds on top
/// (the whole answer when streaming is off, or a trailing marker).
#[derive(Debug, Default)]
pub struct StdoutObserver {
    shown: String,
}

impl StdoutObserver {
    fn tail<'a>(&self, final_text: &'a str) -> &'a str {
        final_text.strip_prefix(self.shown.as_str()).unwrap_or(final_text)
    }
}

impl ChatObserver for StdoutObserver {
    fn on_chunk(&mut self, _id: RequestId, text: &str) {
        self.shown.push_str(text);
        print!("{text}");
        std::io::stdout().flush().ok();
    }

    fn on_complete(&mut self, _id: RequestId, text: &str) {
        println!("{}", self.tail(text));
        std::io::stdout().flush().ok();
    }

    fn on_busy_changed(&mut self, busy: bool) {
        if busy {
            self.shown.clear();
        }
    }
}

/// Fold command-line flags into the loaded config. Flags win over the file
/// and the environment.
pub fn apply_overrides(cfg: &mut Config, args: &cli::Args) -> anyhow::Result<()> {
    if let Some(profile) = &args.profile {
        cfg.apply_backend(profile)?;
    }
    if let Some(b) = &args.backend {
        cfg.backend = b.parse::<Backend>()?;
    }
    if let Some(url) = &args.base_url {
        cfg.base_url = url.clone();
    }
    if let Some(model) = &args.model {
        cfg.model = model.clone();
    }
    if let Some(t) = args.temperature {
        cfg.temperature = t;
    }
    if args.no_stream {
        cfg.streaming = false;
    }
    if let Some(secs) = args.timeout {
        cfg.timeout_secs = secs;
    }
    if let Some(proxy) = &args.proxy {
        cfg.proxy = Some(proxy.clone());
    }
    if let Some(preset) = &args.preset {
        cfg.apply_preset(preset)?;
    } else if let Some(system) = &args.system {
        cfg.system_prompt = Some(system.clone());
        cfg.active_preset = None;
    }
    Ok(())
}

fn new_session(cfg: &Config) -> Session<StdoutObserver> {
    Session::new(cfg.settings(), cfg.extractor.build(), StdoutObserver::default())
}

/// Deliver events until the request finishes, cancelling on Ctrl-C.
/// Returns the request's outcome.
async fn drive(session: &mut Session<StdoutObserver>) -> Option<Outcome> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut outcome = None;

    while session.is_busy() {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                session.cancel();
            }
            ev = session.next_event() => {
                let Some(ev) = ev else { break };
                if let StreamEvent::Finished { outcome: o, .. } = &ev {
                    outcome = Some(o.clone());
                }
                session.dispatch(ev);
            }
        }
    }
    outcome
}

pub async fn cmd_once(cfg: &Config, prompt: String) -> anyhow::Result<()> {
    let mut session = new_session(cfg);
    session
        .submit(prompt)
        .context("session refused the request")?;

    match drive(&mut session).await {
        Some(Outcome::Failed(e)) => Err(anyhow::Error::new(e).context("chat request failed")),
        _ => Ok(()),
    }
}

pub async fn cmd_repl(cfg: &Config) -> anyhow::Result<()> {
    let mut session = new_session(cfg);
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();

    println!(
        "{} / {} at {}. /reset, /preset <name>, /history, /quit",
        session.settings().backend,
        session.settings().model,
        session.settings().base_url
    );

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("/quit" | "/exit", _) => break,
            ("/reset", _) => {
                session.reset_history();
                println!("(history cleared)");
            }
            ("/history", _) => {
                let json = session
                    .history()
                    .to_json()
                    .context("failed to serialize history")?;
                println!("{json}");
            }
            ("/preset", name) => match cfg.preset_content(name) {
                Some(content) => {
                    session.settings_mut().system_prompt = Some(content.to_string());
                    session.reset_history();
                    println!("(preset {name:?} active, history cleared)");
                }
                None => {
                    let names: Vec<_> = cfg.preset_names().collect();
                    println!("unknown preset {name:?}; available: {}", names.join(", "));
                }
            },
            _ => {
                if session.submit(line).is_some() {
                    if let Some(Outcome::Failed(e)) = drive(&mut session).await {
                        tracing::warn!(error = %e, "chat request failed");
                    }
                }
            }
        }
    }
    Ok(())
}

fn list_presets(cfg: &Config) {
    for name in cfg.preset_names() {
        let mark = if cfg.active_preset.as_deref() == Some(name) { "*" } else { " " };
        println!("{mark} {name}");
    }
}

fn list_backends(cfg: &Config) {
    if cfg.backends.is_empty() {
        println!("no backend presets; create one with `ai-chat save-backend <name>`");
        return;
    }
    for b in &cfg.backends {
        let mark = if cfg.active_backend.as_deref() == Some(b.name.as_str()) { "*" } else { " " };
        println!("{mark} {}\t{}\t{}\t{}", b.name, b.backend, b.model, b.base_url);
    }
}

/// Apply one preset edit to `cfg`, returning what to report.
pub fn edit_presets(cfg: &mut Config, action: &PresetAction) -> anyhow::Result<String> {
    match action {
        PresetAction::List => Ok(String::new()),
        PresetAction::Set { name, content } => {
            cfg.set_preset(name, content);
            Ok(format!("Saved prompt preset {name:?}"))
        }
        PresetAction::Delete { name } => {
            anyhow::ensure!(cfg.delete_preset(name), "no such prompt preset: {name}");
            Ok(format!("Deleted prompt preset {name:?}"))
        }
        PresetAction::Rename { old, new } => {
            anyhow::ensure!(
                cfg.rename_preset(old, new),
                "cannot rename prompt preset {old:?} to {new:?}: missing or name taken"
            );
            Ok(format!("Renamed prompt preset {old:?} to {new:?}"))
        }
        PresetAction::Use { name } => {
            cfg.apply_preset(name)?;
            Ok(format!("Prompt preset {name:?} is now the default"))
        }
    }
}

/// Apply one backend preset edit to `cfg`, returning what to report.
pub fn edit_backends(cfg: &mut Config, action: &BackendAction) -> anyhow::Result<String> {
    match action {
        BackendAction::List => Ok(String::new()),
        BackendAction::Delete { name } => {
            if !cfg.delete_backend(name) {
                let names: Vec<_> = cfg.backend_names().collect();
                anyhow::bail!("no such backend preset: {name} (have: {})", names.join(", "));
            }
            Ok(format!("Deleted backend preset {name:?}"))
        }
        BackendAction::Rename { old, new } => {
            anyhow::ensure!(
                cfg.rename_backend(old, new),
                "cannot rename backend preset {old:?} to {new:?}: missing or name taken"
            );
            Ok(format!("Renamed backend preset {old:?} to {new:?}"))
        }
        BackendAction::Use { name } => {
            cfg.apply_backend(name)?;
            Ok(format!("Backend preset {name:?} is now the default"))
        }
    }
}

/// Load the config file as stored (no env or flag overrides), edit it and
/// write it back.
fn edit_config_file(edit: impl FnOnce(&mut Config) -> anyhow::Result<String>) -> anyhow::Result<()> {
    let path = paths::config_path()?;
    let mut on_disk = Config::load_optional(&path)?.unwrap_or_default();
    let msg = edit(&mut on_disk)?;
    on_disk.save_atomic(&path)?;
    println!("{msg} ({})", path.display());
    Ok(())
}

pub fn cmd_presets(effective: &Config, action: Option<PresetAction>) -> anyhow::Result<()> {
    match action {
        None | Some(PresetAction::List) => {
            list_presets(effective);
            Ok(())
        }
        Some(action) => edit_config_file(|cfg| edit_presets(cfg, &action)),
    }
}

pub fn cmd_backends(effective: &Config, action: Option<BackendAction>) -> anyhow::Result<()> {
    match action {
        None | Some(BackendAction::List) => {
            list_backends(effective);
            Ok(())
        }
        Some(action) => edit_config_file(|cfg| edit_backends(cfg, &action)),
    }
}

/// Store `effective`'s connection settings under `name` in the config file,
/// leaving the file's other fields untouched.
pub fn cmd_save_backend(effective: &Config, name: &str) -> anyhow::Result<()> {
    let path = paths::config_path()?;
    let mut on_disk = Config::load_optional(&path)?.unwrap_or_default();

    let mut staged = effective.clone();
    staged.save_backend(name);
    let preset = staged
        .backend(name)
        .cloned()
        .context("backend preset missing after save")?;
    on_disk.put_backend(preset);
    on_disk.save_atomic(&path)?;

    println!("Saved backend preset {name:?} to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn overrides_beat_config() {
        let mut cfg = Config::default();
        let args = cli::Args::parse_from([
            "ai-chat", "--backend", "openai", "--model", "gpt", "--no-stream", "--preset",
            "Reviewer", "hi",
        ]);
        apply_overrides(&mut cfg, &args).unwrap();
        assert_eq!(cfg.backend, Backend::OpenAiCompatible);
        assert_eq!(cfg.model, "gpt");
        assert!(!cfg.streaming);
        assert_eq!(cfg.active_preset.as_deref(), Some("Reviewer"));
    }

    #[test]
    fn unknown_backend_or_profile_fails() {
        let mut cfg = Config::default();
        let args = cli::Args::parse_from(["ai-chat", "--backend", "gopher", "hi"]);
        assert!(apply_overrides(&mut cfg, &args).is_err());

        let args = cli::Args::parse_from(["ai-chat", "--profile", "nowhere", "hi"]);
        assert!(apply_overrides(&mut cfg, &args).is_err());
    }

    #[test]
    fn preset_edits_persist_in_the_config() {
        let mut cfg = Config::default();
        let set = PresetAction::Set {
            name: "Pirate".into(),
            content: "Talk like a pirate.".into(),
        };
        edit_presets(&mut cfg, &set).unwrap();
        edit_presets(&mut cfg, &PresetAction::Use { name: "Pirate".into() }).unwrap();
        assert_eq!(cfg.settings().system_prompt.as_deref(), Some("Talk like a pirate."));

        let rename = PresetAction::Rename {
            old: "Pirate".into(),
            new: "Corsair".into(),
        };
        edit_presets(&mut cfg, &rename).unwrap();
        assert_eq!(cfg.active_preset.as_deref(), Some("Corsair"));

        edit_presets(&mut cfg, &PresetAction::Delete { name: "Corsair".into() }).unwrap();
        assert!(edit_presets(&mut cfg, &PresetAction::Delete { name: "Corsair".into() }).is_err());
        assert!(edit_presets(&mut cfg, &rename).is_err());
    }

    #[test]
    fn backend_edits_switch_the_connection() {
        let mut cfg = Config::default();
        cfg.save_backend("local");
        cfg.backend = Backend::OpenAiCompatible;
        cfg.model = "gpt".into();
        cfg.save_backend("cloud");

        edit_backends(&mut cfg, &BackendAction::Use { name: "local".into() }).unwrap();
        assert_eq!(cfg.backend, Backend::LocalChat);
        assert_eq!(cfg.model, "llama3:8b");

        let rename = BackendAction::Rename {
            old: "cloud".into(),
            new: "local".into(),
        };
        assert!(edit_backends(&mut cfg, &rename).is_err());
        let rename = BackendAction::Rename {
            old: "cloud".into(),
            new: "remote".into(),
        };
        edit_backends(&mut cfg, &rename).unwrap();

        edit_backends(&mut cfg, &BackendAction::Delete { name: "remote".into() }).unwrap();
        assert_eq!(cfg.backend_names().collect::<Vec<_>>(), vec!["local"]);
        assert!(edit_backends(&mut cfg, &BackendAction::Use { name: "remote".into() }).is_err());
    }

    #[test]
    fn observer_prints_only_what_was_not_streamed() {
        let mut obs = StdoutObserver::default();
        obs.on_busy_changed(true);
        obs.on_chunk(RequestId(1), "Hel");
        obs.on_chunk(RequestId(1), "lo");
        assert_eq!(obs.tail("Hello\n[Cancelled]\n"), "\n[Cancelled]\n");

        obs.on_busy_changed(true);
        assert_eq!(obs.tail("whole answer"), "whole answer");
    }
}
