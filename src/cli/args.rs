//! CLI argument structures

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Expand supervisor configuration into ready-to-run process entries
#[derive(Parser)]
#[command(name = "procfleet")]
#[command(about = "procfleet - Expand supervisor configuration into process entries", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the materialized entry store
    Expand {
        /// Configuration file (.toml, .yaml, .yml or .json)
        config: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Fail when two entries resolve to the same name
        #[arg(long)]
        reject_collisions: bool,
    },

    /// Print each group and its member programs
    Groups {
        /// Configuration file (.toml, .yaml, .yml or .json)
        config: PathBuf,
    },

    /// Materialize and report problems without printing entries
    Check {
        /// Configuration file (.toml, .yaml, .yml or .json)
        config: PathBuf,

        /// Fail when two entries resolve to the same name
        #[arg(long)]
        reject_collisions: bool,
    },

    /// Load the configuration and reload it whenever the file changes
    Watch {
        /// Configuration file (.toml, .yaml, .yml or .json)
        config: PathBuf,

        /// Fail a reload when two entries resolve to the same name
        #[arg(long)]
        reject_collisions: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}
