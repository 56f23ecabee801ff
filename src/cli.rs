//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Bring files online and copy them between grid storage endpoints.
#[derive(Parser, Debug)]
#[command(name = "gridstage")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print machine-readable JSON results on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Read defaults from this file instead of the XDG config path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Request files to be brought online
    #[command(name = "bringonline")]
    BringOnline(BringOnlineArgs),

    /// Copy a file
    Copy(CopyArgs),

    /// Print library and engine versions
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct BringOnlineArgs {
    /// Pin lifetime in seconds (1-604800)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=604_800))]
    pub pin_lifetime: Option<u64>,

    /// Request timeout in seconds (1-86400)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub timeout: Option<u64>,

    /// Keep polling, with doubling delays, until every URL settles
    #[arg(long)]
    pub poll: bool,

    /// URLs to stage
    #[arg(required = true, value_name = "URL")]
    pub urls: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CopyArgs {
    /// Overwrite the destination file
    #[arg(short = 'f', long)]
    pub overwrite: bool,

    /// Create the destination parent directory
    #[arg(short = 'p', long)]
    pub create_parent: bool,

    /// Enable checksum validation
    #[arg(short = 'K', long = "checksum")]
    pub checksum: bool,

    /// Checksum algorithm used to validate the copy
    #[arg(long = "checksum-algo", value_name = "ALGORITHM")]
    pub checksum_algo: Option<String>,

    /// Expected checksum of the source
    #[arg(long = "checksum-value", value_name = "VALUE", requires = "checksum")]
    pub checksum_value: Option<String>,

    /// Number of parallel streams (1-64)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=64))]
    pub nbstreams: Option<u32>,

    /// Copy timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Source URL
    pub source: String,

    /// Destination URL
    pub destination: String,
}
