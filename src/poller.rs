//! Scan status polling.
//!
//! `PollSession` keeps what has already been shown for one scan: the log
//! entries seen so far and the last severity snapshots. Each tick renders
//! only new log lines and positive severity deltas.

use crate::error::ScanError;
use crate::render::Reporter;
use crate::upload::client::ScanApi;
use crate::upload::types::{ScanLogEntry, ScanStatus, SeverityCounts};
use std::collections::HashSet;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// Fixed delay between status fetches
pub const POLL_INTERVAL_SECS: u64 = 10;

/// Log message fragment announcing that the scan has started
pub const SCAN_STARTING_MARKER: &str = "scan is starting";

/// Remote job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Unknown,
    Running,
    End,
    Failed,
    Error,
}

impl JobState {
    /// Parse the server's state string; unrecognized states keep polling
    pub fn parse(state: &str) -> Self {
        match state.trim().to_lowercase().as_str() {
            "" => JobState::Unknown,
            "end" => JobState::End,
            "failed" => JobState::Failed,
            "error" => JobState::Error,
            _ => JobState::Running,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::End | JobState::Failed | JobState::Error)
    }
}

/// Identity of a log entry; the server issues no ids
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogKey {
    pub log_type: String,
    pub message: String,
    pub create_date: String,
}

impl From<&ScanLogEntry> for LogKey {
    fn from(entry: &ScanLogEntry) -> Self {
        Self {
            log_type: entry.log_type.clone(),
            message: entry.message.clone(),
            create_date: entry.create_date.clone(),
        }
    }
}

/// What changed in one tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickUpdate {
    pub state: JobState,
    pub raw_state: String,
    pub new_logs: Vec<ScanLogEntry>,
    /// True the first time the start marker shows up
    pub scan_started: bool,
    pub sast_delta: SeverityCounts,
    pub sca_delta: SeverityCounts,
}

/// Client-side state for one poll loop
#[derive(Debug, Default)]
pub struct PollSession {
    seen: HashSet<LogKey>,
    previous_sast: SeverityCounts,
    previous_sca: SeverityCounts,
    start_announced: bool,
}

impl PollSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one status response into the session
    pub fn observe(&mut self, status: &ScanStatus) -> TickUpdate {
        let mut new_logs = Vec::new();
        let mut scan_started = false;

        for entry in &status.logs {
            if !self.seen.insert(LogKey::from(entry)) {
                continue;
            }
            if !self.start_announced && is_start_marker(entry) {
                self.start_announced = true;
                scan_started = true;
            }
            new_logs.push(entry.clone());
        }

        let sast_delta = status.sast_severities.delta_since(&self.previous_sast);
        let sca_delta = status.sca_severities.delta_since(&self.previous_sca);

        if status.sast_severities.decreased_from(&self.previous_sast)
            || status.sca_severities.decreased_from(&self.previous_sca)
        {
            debug!(
                sast = ?status.sast_severities,
                sca = ?status.sca_severities,
                "Severity counts decreased; treating as recount"
            );
        }

        // Full replacement keeps a later decrease from producing a negative delta
        self.previous_sast = status.sast_severities;
        self.previous_sca = status.sca_severities;

        TickUpdate {
            state: JobState::parse(&status.state),
            raw_state: status.state.clone(),
            new_logs,
            scan_started,
            sast_delta,
            sca_delta,
        }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }
}

/// Informational entry announcing the scan start
fn is_start_marker(entry: &ScanLogEntry) -> bool {
    entry.log_type.eq_ignore_ascii_case("info")
        && entry.message.to_lowercase().contains(SCAN_STARTING_MARKER)
}

/// Poll loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(POLL_INTERVAL_SECS),
        }
    }
}

/// Terminal result of a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed { state: String },
}

/// Poll until the scan reaches a terminal state.
///
/// A failed status fetch ends the loop immediately.
pub async fn poll_scan<A, W>(
    api: &A,
    scan_id: &str,
    reporter: &mut Reporter<W>,
    options: PollOptions,
) -> Result<JobOutcome, ScanError>
where
    A: ScanApi,
    W: Write,
{
    let mut session = PollSession::new();
    let mut ticks: u64 = 0;

    loop {
        let status = api.scan_status(scan_id).await?;
        ticks += 1;

        let update = session.observe(&status);
        debug!(
            scan_id,
            tick = ticks,
            state = %update.raw_state,
            new_logs = update.new_logs.len(),
            "Status tick"
        );
        reporter.tick(&update)?;

        match update.state {
            JobState::End => {
                info!(scan_id, ticks, "Scan finished");
                return Ok(JobOutcome::Completed);
            }
            JobState::Failed | JobState::Error => {
                info!(scan_id, ticks, state = %update.raw_state, "Scan failed");
                return Ok(JobOutcome::Failed {
                    state: update.raw_state,
                });
            }
            JobState::Unknown | JobState::Running => {
                tokio::time::sleep(options.interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(log_type: &str, message: &str, date: &str) -> ScanLogEntry {
        ScanLogEntry {
            log_type: log_type.to_string(),
            message: message.to_string(),
            create_date: date.to_string(),
        }
    }

    fn status(state: &str, logs: Vec<ScanLogEntry>, sast: SeverityCounts) -> ScanStatus {
        ScanStatus {
            state: state.to_string(),
            logs,
            sast_severities: sast,
            sca_severities: SeverityCounts::default(),
        }
    }

    #[test]
    fn test_job_state_parse() {
        assert_eq!(JobState::parse("end"), JobState::End);
        assert_eq!(JobState::parse("END"), JobState::End);
        assert_eq!(JobState::parse("Failed"), JobState::Failed);
        assert_eq!(JobState::parse(" error "), JobState::Error);
        assert_eq!(JobState::parse("running"), JobState::Running);
        assert_eq!(JobState::parse("queued"), JobState::Running);
        assert_eq!(JobState::parse(""), JobState::Unknown);

        assert!(JobState::End.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Unknown.is_terminal());
    }

    #[test]
    fn test_same_log_rendered_once_across_ticks() {
        let mut session = PollSession::new();
        let entry = log("info", "Cloning sources", "2024-05-01T10:00:00Z");

        let first = session.observe(&status("running", vec![entry.clone()], SeverityCounts::default()));
        assert_eq!(first.new_logs, vec![entry.clone()]);

        let second = session.observe(&status("running", vec![entry.clone()], SeverityCounts::default()));
        assert!(second.new_logs.is_empty());
        assert_eq!(session.seen_count(), 1);
    }

    #[test]
    fn test_log_identity_uses_full_triple() {
        let mut session = PollSession::new();
        let logs = vec![
            log("info", "Analyzing", "1"),
            log("info", "Analyzing", "2"),
            log("warning", "Analyzing", "1"),
        ];

        let update = session.observe(&status("running", logs, SeverityCounts::default()));
        assert_eq!(update.new_logs.len(), 3);
    }

    #[test]
    fn test_start_marker_announced_once() {
        let mut session = PollSession::new();

        let first = session.observe(&status(
            "running",
            vec![log("info", "Scan is starting...", "1")],
            SeverityCounts::default(),
        ));
        assert!(first.scan_started);

        let second = session.observe(&status(
            "running",
            vec![
                log("info", "Scan is starting...", "1"),
                log("info", "Scan is starting again", "2"),
            ],
            SeverityCounts::default(),
        ));
        assert!(!second.scan_started);
        assert_eq!(second.new_logs.len(), 1);
    }

    #[test]
    fn test_start_marker_requires_info_entry() {
        let mut session = PollSession::new();

        let warning = session.observe(&status(
            "running",
            vec![log("warning", "Scan is starting late", "1")],
            SeverityCounts::default(),
        ));
        assert!(!warning.scan_started);
        assert_eq!(warning.new_logs.len(), 1);

        let info = session.observe(&status(
            "running",
            vec![log("INFO", "Scan is starting", "2")],
            SeverityCounts::default(),
        ));
        assert!(info.scan_started);
    }

    #[test]
    fn test_severity_delta_between_ticks() {
        let mut session = PollSession::new();
        session.observe(&status("running", vec![], SeverityCounts::new(2, 1, 0, 0)));

        let update = session.observe(&status("running", vec![], SeverityCounts::new(5, 1, 0, 0)));
        assert_eq!(update.sast_delta, SeverityCounts::new(3, 0, 0, 0));
        assert_eq!(update.sast_delta.non_zero(), vec![("critical", 3)]);
        assert!(update.sca_delta.is_empty());
    }

    #[test]
    fn test_first_tick_reports_everything() {
        let mut session = PollSession::new();
        let update = session.observe(&status("running", vec![], SeverityCounts::new(1, 2, 3, 4)));
        assert_eq!(update.sast_delta, SeverityCounts::new(1, 2, 3, 4));
    }

    #[test]
    fn test_decrease_is_absorbed() {
        let mut session = PollSession::new();
        session.observe(&status("running", vec![], SeverityCounts::new(5, 0, 0, 0)));

        let drop = session.observe(&status("running", vec![], SeverityCounts::new(3, 0, 0, 0)));
        assert!(drop.sast_delta.is_empty());

        // Baseline is now 3, so going back to 5 reports 2 new
        let rise = session.observe(&status("running", vec![], SeverityCounts::new(5, 0, 0, 0)));
        assert_eq!(rise.sast_delta, SeverityCounts::new(2, 0, 0, 0));
    }

    #[test]
    fn test_default_poll_interval() {
        assert_eq!(PollOptions::default().interval, Duration::from_secs(10));
    }
}
