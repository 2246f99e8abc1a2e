use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod cache_cmd;
mod config;
mod dashboard;
mod quest_cmd;
mod sources;
mod state;
mod toolkit_cmd;

use cache_cmd::CacheCommand;
use quest_cmd::QuestCommand;
use toolkit_cmd::ToolkitCommand;

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("DEVDASH_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(
    name = "devdash",
    version,
    long_version = LONG_VERSION,
    about = "Developer dashboard: gamified quests, dev toolkit and cached GitHub/LeetCode stats"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Gamified to-do list
    Quest {
        #[command(subcommand)]
        command: QuestCommand,
    },

    /// Level, XP, streak and board summary
    Stats,

    /// Unlocked and locked achievements
    Achievements,

    /// Saved links and snippets
    Toolkit {
        #[command(subcommand)]
        command: ToolkitCommand,
    },

    /// Inspect or clear cached source data
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// GitHub, LeetCode and contest summary, served from cache when fresh
    Dashboard {
        #[arg(long)]
        github: Option<String>,

        #[arg(long)]
        leetcode: Option<String>,

        /// Ignore fresh cache entries and fetch again
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },

    /// Manage ~/.devdash/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config if none exists
    Init,
    /// Print the effective config
    Show,
}

/// Logs go to stderr so command output stays pipeable.
/// Filter comes from `DEVDASH_LOG`, then `RUST_LOG`, default `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("DEVDASH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Quest { command } => quest_cmd::run(command)?,
        Command::Stats => quest_cmd::stats()?,
        Command::Achievements => quest_cmd::achievements()?,
        Command::Toolkit { command } => toolkit_cmd::run(command)?,
        Command::Cache { command } => cache_cmd::run(command)?,
        Command::Dashboard {
            github,
            leetcode,
            refresh,
        } => dashboard::run(github, leetcode, refresh).await?,
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },
    }

    Ok(())
}
