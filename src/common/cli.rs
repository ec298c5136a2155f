//! CLI argument parsing for the packet tools
//!
//! # Design Principles (KISS)
//! - Use clap's derive macro for declarative argument definition
//! - Common arguments shared via composition, not inheritance
//! - One subcommand per tool action

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Common arguments shared across all subcommands that read configuration
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Path to configuration file (defaults are used when absent)
    #[arg(short = 'f', long = "config")]
    pub config_file: Option<String>,
}

/// Output format for event dumps
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One line per event
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Top-level arguments for `dynapse_dump`
#[derive(Parser, Debug)]
#[command(name = "dynapse_dump")]
#[command(about = "Generate, inspect and validate Dynap-se configuration event packet streams")]
#[command(version)]
pub struct DumpCli {
    #[command(subcommand)]
    pub command: DumpCommand,
}

#[derive(Subcommand, Debug)]
pub enum DumpCommand {
    /// Run the emulator and write a packet stream file
    Generate {
        #[command(flatten)]
        common: CommonArgs,

        /// Output path (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of packets to generate (overrides the config file)
        #[arg(short = 'n', long)]
        packets: Option<u32>,

        /// RNG seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print the events of a packet stream file
    Dump {
        /// Path to the stream file
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Skip invalidated events
        #[arg(long)]
        valid_only: bool,

        /// Iterate each packet from the last event to the first
        #[arg(long)]
        reverse: bool,

        /// Only print the first event (forward order) of each packet with this chip ID
        #[arg(long)]
        chip: Option<u8>,
    },

    /// Check footer and checksum of a packet stream file
    Validate {
        /// Path to the stream file
        file: PathBuf,
    },
}
