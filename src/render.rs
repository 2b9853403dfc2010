//! Console output for the scan workflow.
//!
//! All user-facing lines go through `Reporter`, which writes to any
//! `io::Write` so tests can capture the output.

use crate::archive::ArchiveManifest;
use crate::error::{ScanError, TransportFailure, UploadDiagnostics};
use crate::poller::TickUpdate;
use crate::upload::plan::{bytes_to_mb, format_bytes, UploadPlan, UploadTier, WARNING_MAX_MB};
use crate::upload::progress::ProgressSnapshot;
use crate::upload::types::SeverityCounts;
use colored::Colorize;
use std::io::{self, Write};

pub struct Reporter<W: Write> {
    out: W,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn info(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{}", message)
    }

    pub fn success(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{} {}", "✔".green(), message)
    }

    pub fn warning(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{} {}", "!".yellow().bold(), message.yellow())
    }

    pub fn manifest(&mut self, manifest: &ArchiveManifest, archive_bytes: u64) -> io::Result<()> {
        writeln!(
            self.out,
            "{} {} files archived ({} compressed)",
            "✔".green(),
            manifest.included_files,
            format_bytes(archive_bytes)
        )?;

        if manifest.excluded_files > 0 || manifest.excluded_dirs > 0 {
            writeln!(
                self.out,
                "  Excluded {} files ({}) and {} directories",
                manifest.excluded_files,
                format_bytes(manifest.excluded_bytes),
                manifest.excluded_dirs
            )?;
            for path in &manifest.excluded_samples {
                writeln!(self.out, "    - {}", path.dimmed())?;
            }
            let hidden = manifest.hidden_excluded_files();
            if hidden > 0 {
                writeln!(self.out, "    ... and {} more", hidden)?;
            }
        }

        if manifest.skipped_files > 0 {
            self.warning(&format!(
                "{} files could not be read and were skipped",
                manifest.skipped_files
            ))?;
        }
        Ok(())
    }

    pub fn plan(&mut self, plan: &UploadPlan, archive_bytes: u64) -> io::Result<()> {
        writeln!(
            self.out,
            "  Upload size tier: {} ({:.1} MB, timeout {} min)",
            plan.tier.as_str().bold(),
            bytes_to_mb(archive_bytes),
            plan.read_timeout.as_secs() / 60
        )?;

        match plan.tier {
            UploadTier::Large => self.warning(
                "Large archive: the upload may take several minutes, progress will be shown",
            ),
            UploadTier::Warning => self.warning(&format!(
                "Very large archive, close to the {} MB limit. Consider excluding generated or vendored files",
                WARNING_MAX_MB
            )),
            _ => Ok(()),
        }
    }

    /// Render one poll tick: new logs, start notice and new findings
    pub fn tick(&mut self, update: &TickUpdate) -> io::Result<()> {
        for entry in &update.new_logs {
            let tag = format!("[{}]", entry.log_type);
            let tag = match entry.log_type.to_lowercase().as_str() {
                "error" => tag.red().bold(),
                "warning" | "warn" => tag.yellow(),
                _ => tag.cyan(),
            };
            writeln!(self.out, "{} {}", tag, entry.message)?;
        }

        if update.scan_started {
            writeln!(self.out, "{}", "Scan officially started".green().bold())?;
        }

        self.severity_delta("SAST", &update.sast_delta)?;
        self.severity_delta("SCA", &update.sca_delta)
    }

    fn severity_delta(&mut self, kind: &str, delta: &SeverityCounts) -> io::Result<()> {
        let parts = delta.non_zero();
        if parts.is_empty() {
            return Ok(());
        }
        let rendered: Vec<String> = parts
            .iter()
            .map(|(severity, count)| format!("{}: {}", colorize_severity(severity), count))
            .collect();
        writeln!(self.out, "New {} issues: {}", kind, rendered.join(", "))
    }

    pub fn completed(&mut self, scan_id: &str, report_url: &str) -> io::Result<()> {
        writeln!(self.out, "{} Scan {} completed", "✔".green().bold(), scan_id)?;
        writeln!(self.out, "  Report: {}", report_url)
    }

    pub fn failed(&mut self, scan_id: &str, state: &str) -> io::Result<()> {
        writeln!(
            self.out,
            "{} Scan {} ended with state '{}'",
            "✖".red().bold(),
            scan_id,
            state
        )
    }

    /// Final error message plus any remediation hints
    pub fn error(&mut self, err: &ScanError) -> io::Result<()> {
        writeln!(self.out, "{} {}", "Error:".red().bold(), err)?;

        match err {
            ScanError::ArchiveTooLarge { .. } => {
                self.hint("Exclude build output, dependencies and media from the target directory")?;
                self.hint("Scan a sub-directory or split the code base into several projects")?;
            }
            ScanError::Transport {
                failure,
                diagnostics,
                ..
            } => {
                if let Some(diagnostics) = diagnostics {
                    self.upload_diagnostics(diagnostics)?;
                }
                self.transport_hints(*failure, diagnostics.is_some())?;
            }
            ScanError::Config(_) => {
                self.hint("Set CODETHREAT_TOKEN, CODETHREAT_ORG and CODETHREAT_URL, or authenticate first")?;
            }
            _ => {}
        }
        Ok(())
    }

    fn upload_diagnostics(&mut self, diagnostics: &UploadDiagnostics) -> io::Result<()> {
        writeln!(
            self.out,
            "  Archive size: {} (tier {})",
            format_bytes(diagnostics.archive_bytes),
            diagnostics.tier
        )?;
        writeln!(
            self.out,
            "  Timeout budget: {}s connect, {}s transfer; failed after {:.0}s",
            diagnostics.connection_timeout_secs,
            diagnostics.read_timeout_secs,
            diagnostics.elapsed_secs
        )
    }

    fn transport_hints(&mut self, failure: TransportFailure, uploading: bool) -> io::Result<()> {
        match failure {
            TransportFailure::Timeout => {
                if uploading {
                    self.hint("Reduce the project size by excluding generated or vendored files")?;
                }
                self.hint("Check your network speed and proxy settings, then retry")
            }
            TransportFailure::Dns => {
                self.hint("Check CODETHREAT_URL and your DNS or proxy configuration")
            }
            TransportFailure::ConnectionReset => {
                if uploading {
                    self.hint("The connection dropped during upload; a smaller archive is less likely to be interrupted")?;
                }
                self.hint("Check proxy or firewall limits on request size and duration")
            }
            TransportFailure::Connect => {
                self.hint("Check that the server is reachable and that HTTPS_PROXY is set correctly")
            }
            TransportFailure::Other => self.hint("Retry the scan; run with --verbose for details"),
        }
    }

    fn hint(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "  {} {}", "hint:".yellow(), message)
    }
}

fn colorize_severity(severity: &str) -> colored::ColoredString {
    match severity {
        "critical" => severity.red().bold(),
        "high" => severity.red(),
        "medium" => severity.yellow(),
        _ => severity.blue(),
    }
}

/// One-line progress summary for chunked uploads
pub fn format_progress(snapshot: &ProgressSnapshot) -> String {
    let eta = snapshot
        .eta
        .map(|eta| format!("{}s remaining", eta.as_secs()))
        .unwrap_or_else(|| "estimating".to_string());
    format!(
        "Uploading: {:.1}% ({} / {}) at {}/s, {}",
        snapshot.percent(),
        format_bytes(snapshot.transferred),
        format_bytes(snapshot.total),
        format_bytes(snapshot.bytes_per_sec as u64),
        eta
    )
}
