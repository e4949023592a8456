//! Plugin process launched by the controller host.
//!
//! The host starts this binary with
//! `-port <port> -pluginUUID <uuid> -registerEvent <event> -info <json>` and
//! discards its stdout, so diagnostics go to stderr or, when configured, to a
//! daily rolling log file.

use anyhow::Context as _;
use lmstudio_deck::{Collaborators, LaunchArgs, PluginConfig, PluginSession};
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = LaunchArgs::parse_from(std::env::args().skip(1))
        .context("invalid launch arguments")?;

    let config_path = PluginConfig::default_config_path();
    let config_exists = config_path.exists();
    let (config, config_error) = match PluginConfig::load_or_default(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (PluginConfig::default(), Some(e)),
    };

    let _log_guard = init_tracing(&config);
    install_panic_hook();

    if let Some(e) = config_error {
        tracing::warn!(path = %config_path.display(), "ignoring unreadable config: {e}");
    } else if !config_exists {
        match config.save_to_file(&config_path) {
            Ok(()) => tracing::info!(path = %config_path.display(), "wrote default config"),
            Err(e) => {
                tracing::warn!(path = %config_path.display(), "cannot write default config: {e}");
            }
        }
    }
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = args.port,
        plugin_uuid = %args.plugin_uuid,
        "lmstudio-deck starting"
    );

    let session = PluginSession::start(
        args.connect_params(),
        &config,
        Collaborators::production(&config),
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
    session.shutdown().await;
    Ok(())
}

/// Log to stderr, or to `<directory>/lmstudio-deck.log.<date>` when a log
/// directory is configured. The returned guard flushes the file on drop.
fn init_tracing(config: &PluginConfig) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter));

    match &config.logging.directory {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("cannot create log directory {}: {e}", dir.display());
            }
            let appender = tracing_appender::rolling::daily(dir, "lmstudio-deck.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_writer(writer)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
            None
        }
    }
}

/// Route panics from detached button tasks into the log before the default hook.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "task panicked");
        default_hook(info);
    }));
}
