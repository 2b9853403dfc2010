//! End-to-end scan workflow.
//!
//! target check -> ensure project -> archive -> plan -> upload -> poll.
//! The archive lives in a temporary directory owned by this function and is
//! removed on every exit path once the upload stage is over.

use crate::archive::Archiver;
use crate::config::ScanRequest;
use crate::error::{ScanError, EXIT_REMOTE_FAILURE, EXIT_SUCCESS};
use crate::poller::{poll_scan, JobOutcome, PollOptions};
use crate::render::Reporter;
use crate::upload::client::{ScanApi, UploadRequest};
use crate::upload::plan::plan;
use std::io::Write;
use tracing::info;
use url::Url;

/// Successful end of the workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed { scan_id: String, report_url: String },
    Failed { scan_id: String, state: String },
}

impl ScanOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            ScanOutcome::Completed { .. } => EXIT_SUCCESS,
            ScanOutcome::Failed { .. } => EXIT_REMOTE_FAILURE,
        }
    }
}

/// Create the project unless it already exists
pub async fn ensure_project<A: ScanApi, W: Write>(
    api: &A,
    project: &str,
    reporter: &mut Reporter<W>,
) -> Result<(), ScanError> {
    if api.project_exists(project).await? {
        reporter.success(&format!("Project '{}' found", project))?;
        return Ok(());
    }

    info!(project, "Project not found, creating it");
    api.create_project(project).await?;
    reporter.success(&format!("Project '{}' created", project))?;
    Ok(())
}

/// Run a full scan and wait for its result
pub async fn run_scan<A, P, W>(
    request: &ScanRequest,
    api: &A,
    archiver: &P,
    reporter: &mut Reporter<W>,
    options: PollOptions,
) -> Result<ScanOutcome, ScanError>
where
    A: ScanApi,
    P: Archiver,
    W: Write,
{
    if !request.target_dir.is_dir() {
        return Err(ScanError::TargetNotFound(request.target_dir.clone()));
    }

    ensure_project(api, &request.project, reporter).await?;

    reporter.info(&format!("Archiving {}", request.target_dir.display()))?;
    let scan_id = {
        let archive = archiver.package(&request.target_dir, &request.project)?;
        reporter.manifest(archive.manifest(), archive.size_bytes())?;

        let upload_plan = plan(archive.size_bytes())?;
        reporter.plan(&upload_plan, archive.size_bytes())?;

        let upload = UploadRequest {
            archive_path: archive.path(),
            archive_bytes: archive.size_bytes(),
            project: &request.project,
            branch: request.branch.as_deref(),
            policy_id: request.policy_id.as_deref(),
            plan: &upload_plan,
        };
        api.upload_scan(upload).await?
        // archive and its temporary directory are dropped here
    };

    reporter.success(&format!("Scan started (id {})", scan_id))?;

    match poll_scan(api, &scan_id, reporter, options).await? {
        JobOutcome::Completed => {
            let report_url = report_url(&request.base_url, &request.project, &request.organization)?;
            reporter.completed(&scan_id, &report_url)?;
            Ok(ScanOutcome::Completed {
                scan_id,
                report_url,
            })
        }
        JobOutcome::Failed { state } => {
            reporter.failed(&scan_id, &state)?;
            Ok(ScanOutcome::Failed { scan_id, state })
        }
    }
}

/// Link to the project's results in the web UI
pub fn report_url(base_url: &str, project: &str, organization: &str) -> Result<String, ScanError> {
    let mut url = Url::parse(base_url.trim_end_matches('/'))
        .map_err(|e| ScanError::Config(format!("Invalid base URL '{}': {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| ScanError::Config(format!("Invalid base URL '{}'", base_url)))?
        .pop_if_empty()
        .extend(["projects", "project-details", project]);
    url.query_pairs_mut().append_pair("tenant", organization);
    Ok(url.to_string())
}
