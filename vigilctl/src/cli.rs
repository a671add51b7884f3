use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vigil_model::DEFAULT_MAX_DEPTH;

#[derive(Debug, Parser)]
#[command(
    name = "vigilctl",
    version,
    about = "Submit and track web security scans against a Vigil scan service"
)]
pub struct Cli {
    /// Scan service URL (overrides config and VIGIL_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Config file (TOML or JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Check that the scan service is reachable and healthy
    Health,
    /// Show the service name, version and endpoints
    Info,
    /// Start a scan and follow it until it finishes
    Scan {
        /// Target URL (http:// or https://)
        url: String,
        /// Maximum crawl depth (1-5)
        #[arg(long, short, default_value_t = i64::from(DEFAULT_MAX_DEPTH))]
        depth: i64,
        /// Confirm you have permission to test this application
        #[arg(long)]
        i_have_permission: bool,
    },
    /// Follow an existing scan until it finishes
    Watch {
        /// Scan id
        id: String,
    },
    /// List scans known to the service
    List,
    /// Show progress or the report of one scan
    Show {
        /// Scan id
        id: String,
    },
    /// Delete a scan record (succeeds if it is already gone)
    Delete {
        /// Scan id
        id: String,
    },
    /// Print the resolved client configuration
    Config,
}
