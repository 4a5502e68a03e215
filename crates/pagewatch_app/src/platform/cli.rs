use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use pagewatch_core::ResourceId;
use watch_logging::LogDestination;

/// Watches web pages and reports meaningful changes to a Telegram chat.
#[derive(Parser, Debug)]
#[command(name = "pagewatch", author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the state file and the log file.
    #[arg(long, env = "PAGEWATCH_DATA_DIR", default_value = ".", global = true)]
    pub data_dir: PathBuf,

    /// Where log output goes.
    #[arg(long = "log", value_enum, default_value_t = LogTarget::Terminal, global = true)]
    pub log_target: LogTarget,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Overrides the stored Telegram bot token.
    #[arg(long, env = "PAGEWATCH_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Overrides the stored Telegram chat id.
    #[arg(long, env = "PAGEWATCH_CHAT_ID")]
    pub chat_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

impl From<LogTarget> for LogDestination {
    fn from(target: LogTarget) -> Self {
        match target {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File,
            LogTarget::Both => LogDestination::Both,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check every due resource once and print the cycle report.
    Run {
        /// Abort the cycle after this many seconds.
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
    /// Keep running cycles on a fixed tick until interrupted.
    Daemon {
        #[arg(long, default_value_t = 60)]
        tick_secs: u64,
    },
    /// Check one resource now, regardless of its interval.
    Check { id: ResourceId },
    /// Start monitoring a new page.
    Add(AddArgs),
    /// Change the user-owned fields of a resource.
    Edit(EditArgs),
    /// Stop monitoring a resource and forget it.
    Remove { id: ResourceId },
    /// Show all monitored resources.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Store the Telegram bot token and chat id in the state file.
    Settings {
        #[arg(long)]
        bot_token: String,
        #[arg(long)]
        chat_id: String,
    },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub url: String,
    #[arg(long, default_value = "")]
    pub label: String,
    /// Minutes between checks.
    #[arg(long, default_value_t = 60)]
    pub interval: u32,
    /// `.class`, `#id` or a tag name; empty watches the whole page.
    #[arg(long, default_value = "")]
    pub locator: String,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    pub id: ResourceId,
    #[arg(long)]
    pub url: Option<String>,
    #[arg(long)]
    pub label: Option<String>,
    #[arg(long)]
    pub interval: Option<u32>,
    #[arg(long)]
    pub locator: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn verbosity_maps_to_levels() {
        let cli = Cli::parse_from(["pagewatch", "-vv", "list"]);
        assert_eq!(cli.level(), LevelFilter::Trace);
        let cli = Cli::parse_from(["pagewatch", "list"]);
        assert_eq!(cli.level(), LevelFilter::Info);
    }

    #[test]
    fn add_defaults() {
        let cli = Cli::parse_from(["pagewatch", "add", "--url", "https://example.com"]);
        match cli.command {
            Command::Add(args) => {
                assert_eq!(args.interval, 60);
                assert!(args.locator.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
