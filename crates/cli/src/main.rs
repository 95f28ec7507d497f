mod config_commands;
mod session_commands;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    stashbot_config::{StashbotConfig, find_config_file, load_config},
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "stashbot", about = "Stashbot: per-conversation bot session storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to use instead of the discovered one.
    #[arg(long, global = true, env = "STASHBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit stored sessions.
    Session {
        #[command(subcommand)]
        action: session_commands::SessionAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Explicit `--config` path, else the first discovered file, else defaults.
///
/// Unlike [`stashbot_config::discover_and_load`], a file that fails to parse
/// is an error here.
fn resolve_config(explicit: Option<&Path>) -> anyhow::Result<(StashbotConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(),
    };
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            Ok((load_config(&path)?, Some(path)))
        },
        None => {
            debug!("no config file found, using defaults");
            Ok((StashbotConfig::default(), None))
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "stashbot starting");

    let (config, path) = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Session { action } => session_commands::handle_session(action, &config).await,
        Commands::Config { action } => {
            config_commands::handle_config(action, &config, path.as_deref())
        },
    }
}
