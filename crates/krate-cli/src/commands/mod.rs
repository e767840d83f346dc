//! CLI argument definitions and dispatch.

pub mod attach;
pub mod list;

use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser};
use krate_common::config::KrateConfig;
use krate_common::constants::DEFAULT_CONFIG_FILE;

/// krate: run commands inside a logged-in identity's zone.
#[derive(Parser, Debug)]
#[command(name = "krate", version, about, long_about = None)]
#[command(group(ArgGroup::new("action").required(true).args(["attach", "list"])))]
pub struct Cli {
    /// Join the zone of IDENTITY and run COMMAND there (a shell by default).
    #[arg(short, long, value_name = "IDENTITY")]
    pub attach: Option<String>,

    /// List identities with open sessions.
    #[arg(short, long)]
    pub list: bool,

    /// Path to the configuration file.
    #[arg(long, env = "KRATE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Command to run after `--`, with its arguments.
    #[arg(last = true, value_name = "COMMAND", requires = "attach")]
    pub command: Vec<String>,
}

/// Dispatches the parsed command line.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the selected
/// action fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = KrateConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.attach {
        Some(identity) => attach::execute(&config, &identity, &cli.command),
        None => list::execute(&config),
    }
}
