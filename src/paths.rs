use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home))
}

fn ensure_dir(path: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path.to_path_buf())
}

fn resolve_config_dir(
    chat_home: Option<PathBuf>,
    xdg_config: Option<PathBuf>,
    home: impl FnOnce() -> anyhow::Result<PathBuf>,
) -> anyhow::Result<PathBuf> {
    if let Some(base) = chat_home {
        return Ok(base.join("config"));
    }
    if let Some(xdg) = xdg_config.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(xdg.join("ai-chat"));
    }
    Ok(home()?.join(".config").join("ai-chat"))
}

/// `$AI_CHAT_HOME/config`, else `$XDG_CONFIG_HOME/ai-chat`, else
/// `~/.config/ai-chat`. Created if missing.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let dir = resolve_config_dir(
        env::var_os("AI_CHAT_HOME").map(PathBuf::from),
        env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        home_dir,
    )?;
    ensure_dir(&dir)
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}
