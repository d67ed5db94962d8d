use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "wxwatch", about = "Session-resilient chat watcher")]
pub struct Cli {
    /// Path to config file (default: ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Log in (resuming a saved session when possible) and print incoming events
    Run {
        /// Always log in interactively and never touch the saved session
        #[arg(long)]
        no_persist: bool,
    },
    /// Forget the saved session
    Logout,
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Run { no_persist: false })
    }
}
