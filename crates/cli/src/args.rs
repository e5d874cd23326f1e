//! CLI argument definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// skyrelay: relay the latest Bluesky post of an account into a Discord channel
#[derive(Parser, Debug)]
#[command(name = "skyrelay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll the feed and relay new posts until interrupted
    Run(RunArgs),

    /// Fetch and relay the latest post now, even if it was already sent
    Getpost(GetpostArgs),

    /// Interactive setup of the destination channel and account
    Setup(SetupArgs),

    /// Configuration management
    Config(ConfigArgs),

    /// Validate configuration and show status
    Doctor(DoctorArgs),

    /// Print a fresh credential encryption key
    Keygen,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Print posts to stdout instead of delivering them
    #[arg(long)]
    pub dry_run: bool,

    /// Run a single poll cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Append posts to a JSONL outbox file instead of delivering them
    #[arg(long, conflicts_with = "dry_run")]
    pub outbox: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct GetpostArgs {
    /// Post for everyone in the channel (requires admin rights)
    #[arg(long)]
    pub public: bool,

    /// Discord user ID of the requester; omitted means the local operator
    #[arg(long)]
    pub user: Option<String>,

    /// Print the post to stdout instead of delivering it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Ask for login credentials instead of a public handle
    #[arg(long, value_enum)]
    pub mode: Option<SetupMode>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupMode {
    Handle,
    Credentials,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Write an example configuration file
    Init {
        /// Output path
        #[arg(long, default_value = "./skyrelay.toml")]
        path: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as TOML
    Show,
}

#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
