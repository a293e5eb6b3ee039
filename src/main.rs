mod app;
mod cli;
mod config;
mod paths;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never interleave with the streamed answer.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_path = paths::config_path()?;
    let mut cfg = config::Config::load_optional(&config_path)?.unwrap_or_default();
    cfg.apply_env();
    app::apply_overrides(&mut cfg, &args)?;
    tracing::debug!(?config_path, ?cfg, "resolved config");

    match args.cmd {
        Some(cli::Command::Repl) => return app::cmd_repl(&cfg).await,
        Some(cli::Command::Presets { action }) => return app::cmd_presets(&cfg, action),
        Some(cli::Command::Backends { action }) => return app::cmd_backends(&cfg, action),
        Some(cli::Command::SaveBackend { name }) => return app::cmd_save_backend(&cfg, &name),
        None => {}
    }

    let prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("No prompt provided. Try: ai-chat \"Hello\" or `ai-chat repl`");
    }

    app::cmd_once(&cfg, prompt).await
}
