//! scriptlink - launch a scriptable runtime and debug it from the terminal

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::run::RunArgs;
use scriptlink_config::{discover_config_path, load_config, Config, ConfigError, ConfigSource};
use scriptlink_logging::{debug, init, init_with_file, LogConfig, WorkerGuard};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "scriptlink", version, about = "Remote debugger for scriptable runtimes")]
struct Cli {
    /// Config file (default: $SCRIPTLINK_CONFIG, then ./scriptlink.toml)
    #[arg(long, global = true, env = "SCRIPTLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch a runtime under the debugger
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load(&cli)?;
    let _guard = init_logging(&config, cli.debug)?;

    match cli.command {
        Commands::Run(args) => commands::run::run(&config, args).await,
    }
}

/// Load the config; a missing default file means built-in defaults
fn load(cli: &Cli) -> Result<Config> {
    let (path, source) = discover_config_path(cli.config.as_deref());
    match load_config(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) if source == ConfigSource::Default => Ok(Config::default()),
        Err(e) => Err(e).context(format!("Failed to load config from {}", path.display())),
    }
}

/// Logs go to stderr or the configured file; stdout carries events
fn init_logging(config: &Config, debug_enabled: bool) -> Result<Option<WorkerGuard>> {
    let log_config = LogConfig::new()
        .debug(debug_enabled)
        .default_level(config.logging.level.clone())
        .show_target(config.logging.show_target);

    let guard = match &config.logging.file {
        Some(path) => Some(
            init_with_file(log_config, path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?,
        ),
        None => {
            init(log_config);
            None
        }
    };
    debug!("Logging initialized");
    Ok(guard)
}
