// Library interface for the CodeThreat scan client
// This allows tests and other crates to use the scan pipeline

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod poller;
pub mod render;
pub mod upload;

pub use cli::Cli;
pub use config::{ConfigResolver, ScanRequest};
pub use error::ScanError;
pub use pipeline::{run_scan, ScanOutcome};
