use crate::poller::POLL_INTERVAL_SECS;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "codethreat",
    version,
    about = "CodeThreat command-line client",
    long_about = "Packages a code base, uploads it to CodeThreat for SAST and SCA analysis, and follows the scan until it finishes."
)]
pub struct Cli {
    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a directory and wait for the scan result
    Scan(ScanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ScanArgs {
    /// Path to the target codebase
    #[arg(short, long)]
    pub target: PathBuf,

    /// Project name in CodeThreat
    #[arg(short, long)]
    pub project: String,

    /// Branch to record with the scan
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Policy to evaluate the results against
    #[arg(long = "policy-id")]
    pub policy_id: Option<String>,

    /// Seconds between status checks
    #[arg(long, default_value_t = POLL_INTERVAL_SECS, hide = true)]
    pub poll_interval: u64,
}
