//! HTTP transport for the CodeThreat API.
//!
//! Every call goes through `send_with_retry`, which retries 5xx responses
//! with exponential backoff. Requests that never produce a response are
//! classified (timeout, DNS, reset, connect) and returned without retry.

use crate::error::{Rejection, ScanError, UploadDiagnostics};
use crate::upload::plan::UploadPlan;
use crate::upload::progress::{ProgressReader, ProgressSnapshot};
use crate::upload::retry::{classify_status, classify_transport, RetryStrategy};
use crate::upload::types::{
    ProjectCreateRequest, ProjectCreateResponse, ScanStartResponse, ScanStatus, SCAN_SOURCE,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use url::Url;

pub const ORGANIZATION_HEADER: &str = "x-ct-organization";

/// Timeouts for the small JSON calls
const API_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const API_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub fn user_agent() -> String {
    format!("codethreat-cli/{}", env!("CARGO_PKG_VERSION"))
}

/// Everything needed to upload one archive
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub archive_path: &'a Path,
    pub archive_bytes: u64,
    pub project: &'a str,
    pub branch: Option<&'a str>,
    pub policy_id: Option<&'a str>,
    pub plan: &'a UploadPlan,
}

/// Remote calls made by the scan pipeline
#[allow(async_fn_in_trait)]
pub trait ScanApi {
    /// True only for a 200 response
    async fn project_exists(&self, project: &str) -> Result<bool, ScanError>;

    async fn create_project(&self, project: &str) -> Result<(), ScanError>;

    /// Upload an archive and return the scan id
    async fn upload_scan(&self, upload: UploadRequest<'_>) -> Result<String, ScanError>;

    /// Fetch the current scan state; never retried
    async fn scan_status(&self, scan_id: &str) -> Result<ScanStatus, ScanError>;
}

pub type ProgressObserver = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// reqwest-backed `ScanApi`
#[derive(Clone)]
pub struct HttpScanApi {
    base_url: String,
    client: reqwest::Client,
    headers: HeaderMap,
    retry: RetryStrategy,
    progress_observer: ProgressObserver,
}

impl HttpScanApi {
    pub fn new(base_url: &str, token: &str, organization: &str) -> Result<Self, ScanError> {
        let headers = default_headers(token, organization)?;
        let client = reqwest::Client::builder()
            .default_headers(headers.clone())
            .connect_timeout(API_CONNECT_TIMEOUT)
            .timeout(API_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ScanError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            headers,
            retry: RetryStrategy::default(),
            progress_observer: Arc::new(|_: ProgressSnapshot| {}),
        })
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Receive progress snapshots for chunked uploads; they are logged either way
    pub fn with_progress_observer(mut self, observer: ProgressObserver) -> Self {
        self.progress_observer = observer;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ScanError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ScanError::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))
    }

    /// Send a request, rebuilding it for each retry of a 5xx response
    async fn send_with_retry<B, T>(
        &self,
        operation: &'static str,
        build: B,
        on_transport: T,
    ) -> Result<reqwest::Response, ScanError>
    where
        B: Fn() -> Result<reqwest::RequestBuilder, ScanError>,
        T: Fn(&reqwest::Error) -> ScanError,
    {
        let mut attempt = 0;
        loop {
            let response = build()?.send().await.map_err(|e| on_transport(&e))?;
            let status = response.status().as_u16();

            if let Some(error_type) = classify_status(status) {
                if self.retry.should_retry(attempt, error_type) {
                    let delay = self.retry.calculate_backoff(attempt);
                    warn!(
                        operation,
                        status,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        "Server error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
            }

            return Ok(response);
        }
    }

    fn build_form(
        &self,
        upload: &UploadRequest<'_>,
        buffered: Option<&[u8]>,
    ) -> Result<Form, ScanError> {
        let part = match buffered {
            Some(bytes) => Part::bytes(bytes.to_vec()),
            None => {
                let file = std::fs::File::open(upload.archive_path)?;
                let observer = self.progress_observer.clone();
                let reader = ProgressReader::new(
                    tokio::fs::File::from_std(file),
                    upload.archive_bytes,
                    Box::new(move |snapshot: ProgressSnapshot| {
                        log_progress(snapshot);
                        observer(snapshot)
                    }),
                );
                let body = reqwest::Body::wrap_stream(ReaderStream::new(reader));
                Part::stream_with_length(body, upload.archive_bytes)
            }
        };

        let part = part
            .file_name(format!("{}.zip", upload.project))
            .mime_str("application/zip")
            .map_err(|e| ScanError::Archive(format!("Invalid upload part: {}", e)))?;

        let mut form = Form::new()
            .part("upfile", part)
            .text("project", upload.project.to_string())
            .text("scan_source", SCAN_SOURCE);
        if let Some(branch) = upload.branch {
            form = form.text("branch", branch.to_string());
        }
        if let Some(policy_id) = upload.policy_id {
            form = form.text("policy_id", policy_id.to_string());
        }
        Ok(form)
    }
}

impl ScanApi for HttpScanApi {
    async fn project_exists(&self, project: &str) -> Result<bool, ScanError> {
        let mut url = self.endpoint("/api/project")?;
        url.query_pairs_mut().append_pair("key", project);

        let response = self
            .send_with_retry(
                "Project check",
                || Ok(self.client.get(url.clone())),
                |e| transport_error("Project check", e, None),
            )
            .await?;

        let exists = response.status().as_u16() == 200;
        debug!(project, status = response.status().as_u16(), exists, "Project check");
        Ok(exists)
    }

    async fn create_project(&self, project: &str) -> Result<(), ScanError> {
        let url = self.endpoint("/api/project/add")?;
        let payload = ProjectCreateRequest::for_project(project);

        let response = self
            .send_with_retry(
                "Project creation",
                || Ok(self.client.post(url.clone()).json(&payload)),
                |e| transport_error("Project creation", e, None),
            )
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status != 200 {
            return Err(ScanError::ProjectCreate {
                status,
                body,
                rejection: Rejection::Status,
            });
        }

        match serde_json::from_str::<ProjectCreateResponse>(&body) {
            Ok(parsed) if parsed.is_success() => {
                info!(project, "Project created");
                Ok(())
            }
            _ => Err(ScanError::ProjectCreate {
                status,
                body,
                rejection: Rejection::Body,
            }),
        }
    }

    async fn upload_scan(&self, upload: UploadRequest<'_>) -> Result<String, ScanError> {
        let url = self.endpoint("/api/scan/start")?;
        let plan = *upload.plan;

        // Dedicated client so the tier's connect timeout applies
        let client = reqwest::Client::builder()
            .default_headers(self.headers.clone())
            .connect_timeout(plan.connection_timeout)
            .build()
            .map_err(|e| ScanError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let buffered = if plan.chunked {
            None
        } else {
            Some(tokio::fs::read(upload.archive_path).await?)
        };

        info!(
            project = upload.project,
            bytes = upload.archive_bytes,
            tier = %plan.tier,
            chunked = plan.chunked,
            "Uploading archive"
        );

        let started = Instant::now();
        let response = self
            .send_with_retry(
                "Scan upload",
                || {
                    let form = self.build_form(&upload, buffered.as_deref())?;
                    Ok(client
                        .post(url.clone())
                        .timeout(plan.read_timeout)
                        .multipart(form))
                },
                |e| {
                    let diagnostics = UploadDiagnostics {
                        archive_bytes: upload.archive_bytes,
                        tier: plan.tier,
                        connection_timeout_secs: plan.connection_timeout.as_secs(),
                        read_timeout_secs: plan.read_timeout.as_secs(),
                        elapsed_secs: started.elapsed().as_secs_f64(),
                    };
                    transport_error("Scan upload", e, Some(diagnostics))
                },
            )
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status != 200 {
            return Err(ScanError::UploadRejected {
                status,
                body,
                rejection: Rejection::Status,
            });
        }

        match serde_json::from_str::<ScanStartResponse>(&body) {
            Ok(ScanStartResponse {
                error: false,
                scan_id: Some(scan_id),
            }) => {
                info!(
                    scan_id = %scan_id,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Upload accepted"
                );
                Ok(scan_id)
            }
            _ => Err(ScanError::UploadRejected {
                status,
                body,
                rejection: Rejection::Body,
            }),
        }
    }

    async fn scan_status(&self, scan_id: &str) -> Result<ScanStatus, ScanError> {
        let mut url = self.endpoint("/api/scan/status")?;
        url.path_segments_mut()
            .map_err(|_| ScanError::Config(format!("Invalid base URL '{}'", self.base_url)))?
            .push(scan_id);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error("Status fetch", &e, None))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status != 200 {
            return Err(ScanError::StatusFetch { status, body });
        }

        serde_json::from_str(&body).map_err(|e| ScanError::StatusFetch {
            status,
            body: format!("unreadable status body ({}): {}", e, body),
        })
    }
}

fn default_headers(token: &str, organization: &str) -> Result<HeaderMap, ScanError> {
    let invalid = |name: &str| ScanError::Config(format!("{} contains invalid header characters", name));

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| invalid("Token"))?,
    );
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&user_agent()).map_err(|_| invalid("User agent"))?,
    );
    headers.insert(
        ORGANIZATION_HEADER,
        HeaderValue::from_str(organization).map_err(|_| invalid("Organization"))?,
    );
    Ok(headers)
}

fn transport_error(
    operation: &'static str,
    err: &reqwest::Error,
    diagnostics: Option<UploadDiagnostics>,
) -> ScanError {
    let failure = classify_transport(err);
    warn!(operation, failure = failure.label(), error = %err, "Request failed without a response");
    ScanError::Transport {
        operation,
        failure,
        detail: err.to_string(),
        diagnostics,
    }
}

fn log_progress(snapshot: ProgressSnapshot) {
    info!(
        transferred = snapshot.transferred,
        total = snapshot.total,
        percent = %format!("{:.1}", snapshot.percent()),
        bytes_per_sec = snapshot.bytes_per_sec as u64,
        eta = ?snapshot.eta,
        "Upload progress"
    );
}
