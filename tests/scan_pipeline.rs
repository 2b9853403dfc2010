/// End-to-end tests for the scan workflow against an in-memory API
///
/// The archive step runs for real on a temporary directory; only the
/// remote calls are faked.
use codethreat_cli::archive::{ArchiveManifest, Archiver, PackagedArchive, ZipArchiver};
use codethreat_cli::config::ScanRequest;
use codethreat_cli::error::{Rejection, ScanError};
use codethreat_cli::pipeline::{run_scan, ScanOutcome};
use codethreat_cli::poller::PollOptions;
use codethreat_cli::render::Reporter;
use codethreat_cli::upload::{ScanApi, ScanLogEntry, ScanStatus, SeverityCounts, UploadRequest};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone)]
struct RecordedUpload {
    project: String,
    branch: Option<String>,
    policy_id: Option<String>,
    archive_path: PathBuf,
    archive_bytes: u64,
    archive_existed: bool,
}

struct FakeApi {
    project_exists: bool,
    upload_result: Mutex<Option<Result<String, ScanError>>>,
    statuses: Mutex<VecDeque<Result<ScanStatus, ScanError>>>,
    created: Mutex<Vec<String>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    status_calls: Mutex<usize>,
}

impl FakeApi {
    fn new(project_exists: bool, statuses: Vec<Result<ScanStatus, ScanError>>) -> Self {
        Self {
            project_exists,
            upload_result: Mutex::new(Some(Ok("abc".to_string()))),
            statuses: Mutex::new(statuses.into()),
            created: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            status_calls: Mutex::new(0),
        }
    }

    fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

impl ScanApi for FakeApi {
    async fn project_exists(&self, _project: &str) -> Result<bool, ScanError> {
        Ok(self.project_exists)
    }

    async fn create_project(&self, project: &str) -> Result<(), ScanError> {
        self.created.lock().unwrap().push(project.to_string());
        Ok(())
    }

    async fn upload_scan(&self, upload: UploadRequest<'_>) -> Result<String, ScanError> {
        self.uploads.lock().unwrap().push(RecordedUpload {
            project: upload.project.to_string(),
            branch: upload.branch.map(str::to_string),
            policy_id: upload.policy_id.map(str::to_string),
            archive_path: upload.archive_path.to_path_buf(),
            archive_bytes: upload.archive_bytes,
            archive_existed: upload.archive_path.exists(),
        });
        self.upload_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok("abc".to_string()))
    }

    async fn scan_status(&self, scan_id: &str) -> Result<ScanStatus, ScanError> {
        assert_eq!(scan_id, "abc");
        *self.status_calls.lock().unwrap() += 1;
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .expect("poller asked for more statuses than scripted")
    }
}

fn status(
    state: &str,
    logs: Vec<ScanLogEntry>,
    sast: SeverityCounts,
) -> Result<ScanStatus, ScanError> {
    Ok(ScanStatus {
        state: state.to_string(),
        logs,
        sast_severities: sast,
        sca_severities: SeverityCounts::default(),
    })
}

fn log(message: &str, date: &str) -> ScanLogEntry {
    ScanLogEntry {
        log_type: "info".to_string(),
        message: message.to_string(),
        create_date: date.to_string(),
    }
}

fn target_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
    fs::write(dir.path().join("README.md"), "# demo\n").unwrap();
    fs::create_dir_all(dir.path().join("node_modules/left-pad")).unwrap();
    fs::write(dir.path().join("node_modules/left-pad/index.js"), "module.exports = 1;\n").unwrap();
    dir
}

fn request(target: &Path) -> ScanRequest {
    ScanRequest {
        target_dir: target.to_path_buf(),
        project: "demo".to_string(),
        base_url: "https://cloud.example.com".to_string(),
        token: "tok".to_string(),
        organization: "acme".to_string(),
        branch: Some("main".to_string()),
        policy_id: None,
    }
}

fn fast() -> PollOptions {
    PollOptions {
        interval: Duration::ZERO,
    }
}

fn output(reporter: Reporter<Vec<u8>>) -> String {
    String::from_utf8(reporter.into_inner()).unwrap()
}

#[tokio::test]
async fn test_existing_project_completes() {
    let target = target_dir();
    let api = FakeApi::new(
        true,
        vec![
            status("running", vec![log("Scan is starting", "1")], SeverityCounts::default()),
            status("end", vec![log("Scan is starting", "1")], SeverityCounts::new(1, 0, 0, 0)),
        ],
    );
    let mut reporter = Reporter::new(Vec::new());

    let outcome = run_scan(
        &request(target.path()),
        &api,
        &ZipArchiver::default(),
        &mut reporter,
        fast(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.exit_code(), 0);
    let ScanOutcome::Completed { scan_id, report_url } = outcome else {
        panic!("expected a completed scan");
    };
    assert_eq!(scan_id, "abc");
    assert_eq!(
        report_url,
        "https://cloud.example.com/projects/project-details/demo?tenant=acme"
    );

    assert!(api.created.lock().unwrap().is_empty());
    let uploads = api.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].project, "demo");
    assert_eq!(uploads[0].branch.as_deref(), Some("main"));
    assert_eq!(uploads[0].policy_id, None);
    assert!(uploads[0].archive_existed);
    assert!(uploads[0].archive_bytes > 0);
    assert!(!uploads[0].archive_path.exists());

    let out = output(reporter);
    assert!(out.contains(&report_url));
    assert_eq!(out.matches("Scan is starting").count(), 1);
    assert!(out.contains("Scan officially started"));
    assert!(out.contains("New SAST issues"));
    assert!(out.contains("and 1 directories"));
}

#[tokio::test]
async fn test_missing_project_is_created_and_failure_exits_two() {
    let target = target_dir();
    let api = FakeApi::new(
        false,
        vec![
            status("running", vec![], SeverityCounts::default()),
            status("failed", vec![], SeverityCounts::default()),
        ],
    );
    let mut reporter = Reporter::new(Vec::new());

    let outcome = run_scan(
        &request(target.path()),
        &api,
        &ZipArchiver::default(),
        &mut reporter,
        fast(),
    )
    .await
    .unwrap();

    assert_eq!(
        outcome,
        ScanOutcome::Failed {
            scan_id: "abc".to_string(),
            state: "failed".to_string()
        }
    );
    assert_eq!(outcome.exit_code(), 2);
    assert_eq!(*api.created.lock().unwrap(), vec!["demo".to_string()]);
    assert_eq!(api.upload_count(), 1);
    assert_eq!(*api.status_calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_error_state_is_a_failure() {
    let target = target_dir();
    let api = FakeApi::new(true, vec![status("error", vec![], SeverityCounts::default())]);
    let mut reporter = Reporter::new(Vec::new());

    let outcome = run_scan(
        &request(target.path()),
        &api,
        &ZipArchiver::default(),
        &mut reporter,
        fast(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.exit_code(), 2);
    assert!(output(reporter).contains("'error'"));
}

/// Archiver that produces a sparse file of a fixed size
struct OversizedArchiver {
    size_bytes: u64,
}

impl Archiver for OversizedArchiver {
    fn package(&self, _target: &Path, project: &str) -> Result<PackagedArchive, ScanError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(format!("{}.zip", project));
        let file = fs::File::create(&path)?;
        file.set_len(self.size_bytes)?;
        PackagedArchive::new(dir, path, ArchiveManifest::default())
    }
}

#[tokio::test]
async fn test_oversized_archive_is_never_uploaded() {
    let target = target_dir();
    let api = FakeApi::new(true, vec![]);
    let archiver = OversizedArchiver {
        size_bytes: 3000 * 1024 * 1024,
    };
    let mut reporter = Reporter::new(Vec::new());

    let err = run_scan(&request(target.path()), &api, &archiver, &mut reporter, fast())
        .await
        .unwrap_err();

    match &err {
        ScanError::ArchiveTooLarge { size_mb, limit_mb } => {
            assert_eq!(*limit_mb, 2048);
            assert!((*size_mb - 3000.0).abs() < 0.01);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.exit_code(), 1);
    assert_eq!(api.upload_count(), 0);
}

#[tokio::test]
async fn test_missing_target_stops_before_remote_calls() {
    let api = FakeApi::new(false, vec![]);
    let mut reporter = Reporter::new(Vec::new());

    let err = run_scan(
        &request(Path::new("/definitely/not/here")),
        &api,
        &ZipArchiver::default(),
        &mut reporter,
        fast(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScanError::TargetNotFound(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(api.created.lock().unwrap().is_empty());
    assert_eq!(api.upload_count(), 0);
}

#[tokio::test]
async fn test_status_fetch_failure_aborts_polling() {
    let target = target_dir();
    let api = FakeApi::new(
        true,
        vec![
            status("running", vec![], SeverityCounts::default()),
            Err(ScanError::StatusFetch {
                status: 500,
                body: "boom".to_string(),
            }),
        ],
    );
    let mut reporter = Reporter::new(Vec::new());

    let err = run_scan(
        &request(target.path()),
        &api,
        &ZipArchiver::default(),
        &mut reporter,
        fast(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ScanError::StatusFetch { status: 500, .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(*api.status_calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_upload_rejection_exits_two() {
    let target = target_dir();
    let api = FakeApi::new(true, vec![]);
    *api.upload_result.lock().unwrap() = Some(Err(ScanError::UploadRejected {
        status: 200,
        body: r#"{"error":true}"#.to_string(),
        rejection: Rejection::Body,
    }));
    let mut reporter = Reporter::new(Vec::new());

    let err = run_scan(
        &request(target.path()),
        &api,
        &ZipArchiver::default(),
        &mut reporter,
        fast(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert_eq!(*api.status_calls.lock().unwrap(), 0);
    let uploads = api.uploads.lock().unwrap();
    assert!(!uploads[0].archive_path.exists());
}

#[tokio::test]
async fn test_logs_and_severities_deduplicated_across_ticks() {
    let target = target_dir();
    let first_logs = vec![log("Cloning", "1")];
    let second_logs = vec![log("Cloning", "1"), log("Analyzing", "2")];
    let api = FakeApi::new(
        true,
        vec![
            status("running", first_logs, SeverityCounts::new(0, 2, 0, 0)),
            status("running", second_logs.clone(), SeverityCounts::new(0, 2, 0, 0)),
            status("end", second_logs, SeverityCounts::new(0, 5, 0, 0)),
        ],
    );
    let mut reporter = Reporter::new(Vec::new());

    run_scan(
        &request(target.path()),
        &api,
        &ZipArchiver::default(),
        &mut reporter,
        fast(),
    )
    .await
    .unwrap();

    let out = output(reporter);
    assert_eq!(out.matches("Cloning").count(), 1);
    assert_eq!(out.matches("Analyzing").count(), 1);
    assert_eq!(out.matches("New SAST issues").count(), 2);
    assert!(out.contains(": 2"));
    assert!(out.contains(": 3"));
}
