//! btplay CLI - mount torrents and play what is inside
//!
//! Provides command-line access to the torrent library, index search,
//! metadata download and interactive mount sessions.

mod commands;
mod terminal;

use std::path::PathBuf;

use btplay_core::config::BtplayConfig;
use btplay_core::tracing_setup::{CliLogLevel, init_tracing};
use clap::Parser;

#[derive(Parser)]
#[command(name = "btplay")]
#[command(about = "Mount a torrent, browse it and play a file")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (the log file always gets everything)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn)]
    log_level: CliLogLevel,

    /// Directory for the per-run debug log
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Torrents directory (overrides BTPLAY_TORRENTS_DIR)
    #[arg(long)]
    torrents_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    let mut config = BtplayConfig::from_env();
    if let Some(dir) = cli.torrents_dir {
        config.library.torrents_dir = dir;
    }

    commands::handle_command(cli.command, config).await
}
