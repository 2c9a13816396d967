//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// tradecore - exchange-agnostic crypto trading kernel.
#[derive(Parser, Debug)]
#[command(name = "tradecore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Override log level (debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the trading engine (foreground). Starts in `Stopped` and waits
    /// for an explicit `Start` command unless `--autostart` is given.
    Run(RunArgs),

    /// Parse and validate the configuration file, then exit.
    CheckConfig,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Force paper mode regardless of `mode` in the config file.
    #[arg(long)]
    pub force_paper: bool,

    /// Transition straight to `Running` after bootstrap instead of waiting
    /// for a `Start` command over the command channel.
    #[arg(long)]
    pub autostart: bool,
}
