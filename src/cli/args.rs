//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    check::CheckArgs, completions::CompletionsArgs, config::ConfigCommands,
    inventory::InventoryCommands, parse::ParseArgs, upload::UploadArgs,
};

#[derive(Parser)]
#[command(name = "ogp")]
#[command(author, version, about = "OGP survey uploader")]
#[command(long_about = "Computes placement offsets and grades from OGP metrology surveys and uploads each survey file to the inspection database exactly once.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug, Default)]
pub struct GlobalOpts {
    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file, applied over the global one
    #[arg(long, global = true, env = "OGP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process and upload new survey files
    Upload(UploadArgs),

    /// Compute offsets and grade of one survey without uploading
    Check(CheckArgs),

    /// Parse one survey into a metadata YAML and a feature CSV
    Parse(ParseArgs),

    /// Inspect or clear the record of uploaded files
    #[command(subcommand)]
    Inventory(InventoryCommands),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON format (for programming)
    Json,
}
