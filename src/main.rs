use clap::Parser;
use codethreat_cli::archive::ZipArchiver;
use codethreat_cli::cli::{Cli, Command, ScanArgs};
use codethreat_cli::config::{ConfigResolver, ScanRequest};
use codethreat_cli::error::ScanError;
use codethreat_cli::logging::init_logging;
use codethreat_cli::pipeline::{run_scan, ScanOutcome};
use codethreat_cli::poller::PollOptions;
use codethreat_cli::render::{format_progress, Reporter};
use codethreat_cli::upload::{HttpScanApi, ProgressSnapshot};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Scan(args) => scan(args).await,
    }
}

async fn scan(args: ScanArgs) -> ExitCode {
    let mut reporter = Reporter::stdout();

    match execute(&args, &mut reporter).await {
        Ok(outcome) => {
            info!(?outcome, "Scan command finished");
            ExitCode::from(outcome.exit_code())
        }
        Err(e) => {
            debug!(error = %e, "Scan failed");
            if let Err(write_err) = reporter.error(&e) {
                eprintln!("Error: {} ({})", e, write_err);
            }
            ExitCode::from(e.exit_code())
        }
    }
}

async fn execute(
    args: &ScanArgs,
    reporter: &mut Reporter<std::io::Stdout>,
) -> Result<ScanOutcome, ScanError> {
    let config = ConfigResolver::from_default_location();
    let request = ScanRequest::from_config(
        &config,
        args.target.clone(),
        args.project.clone(),
        args.branch.clone(),
        args.policy_id.clone(),
    )?;

    let api = HttpScanApi::new(&request.base_url, &request.token, &request.organization)?
        .with_progress_observer(Arc::new(|snapshot: ProgressSnapshot| {
            eprintln!("{}", format_progress(&snapshot))
        }));

    let options = PollOptions {
        interval: Duration::from_secs(args.poll_interval),
    };

    run_scan(&request, &api, &ZipArchiver::default(), reporter, options).await
}
