//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "viridian", about = "viridian consensus node", version)]
pub struct Args {
    /// Home directory holding config, keys and databases.
    #[arg(long, default_value = "./viridian-home")]
    pub home: PathBuf,

    /// Path to the configuration file; defaults to `<home>/config.toml`.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the logging filter, e.g. `debug,viridian_chain=trace`.
    #[arg(long)]
    pub log_filter: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the node.
    Start {
        /// Path to the genesis file; defaults to `<home>/genesis.json`.
        #[arg(long)]
        genesis: Option<PathBuf>,
    },
    /// Write a default configuration into the home directory.
    Init,
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| self.home.join("config.toml"))
    }

    pub fn genesis_path(&self, flag: &Option<PathBuf>) -> PathBuf {
        flag.clone().unwrap_or_else(|| self.home.join("genesis.json"))
    }
}
