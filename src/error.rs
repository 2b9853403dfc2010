use crate::upload::plan::UploadTier;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a scan that completed successfully
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for local, transport or I/O failures
pub const EXIT_FAILURE: u8 = 1;
/// Exit code for failures reported by the remote service
pub const EXIT_REMOTE_FAILURE: u8 = 2;

/// How a request failed before an HTTP response was received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Connect or read deadline elapsed
    Timeout,
    /// Host name could not be resolved
    Dns,
    /// Peer reset or aborted the connection mid-transfer
    ConnectionReset,
    /// Connection could not be established
    Connect,
    /// Anything else reqwest reports
    Other,
}

impl TransportFailure {
    pub fn label(&self) -> &'static str {
        match self {
            TransportFailure::Timeout => "timeout",
            TransportFailure::Dns => "DNS resolution failure",
            TransportFailure::ConnectionReset => "connection reset",
            TransportFailure::Connect => "connection failure",
            TransportFailure::Other => "transport failure",
        }
    }
}

/// Why the remote refused a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Non-200 HTTP status
    Status,
    /// 200 response whose body reported an error or lacked the expected fields
    Body,
}

/// Context attached to upload transport failures for remediation output
#[derive(Debug, Clone, PartialEq)]
pub struct UploadDiagnostics {
    pub archive_bytes: u64,
    pub tier: UploadTier,
    pub connection_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub elapsed_secs: f64,
}

/// Scan client errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Target directory does not exist
    #[error("Target directory not found: {}", .0.display())]
    TargetNotFound(PathBuf),

    /// Walk produced no archivable files
    #[error("Nothing to upload: no files left in {} after exclusions", .0.display())]
    EmptyTarget(PathBuf),

    /// Archive could not be created or finalized
    #[error("Archive error: {0}")]
    Archive(String),

    /// Archive exceeds the hard upload limit
    #[error("Archive is too large to upload ({size_mb:.1} MB, limit {limit_mb} MB)")]
    ArchiveTooLarge { size_mb: f64, limit_mb: u64 },

    /// Project could not be created remotely
    #[error("Project creation failed with status {status}: {body}")]
    ProjectCreate {
        status: u16,
        body: String,
        rejection: Rejection,
    },

    /// Upload was rejected by the remote service
    #[error("Scan upload rejected with status {status}: {body}")]
    UploadRejected {
        status: u16,
        body: String,
        rejection: Rejection,
    },

    /// Request never produced a response
    #[error("{operation} failed ({}): {detail}", .failure.label())]
    Transport {
        operation: &'static str,
        failure: TransportFailure,
        detail: String,
        diagnostics: Option<UploadDiagnostics>,
    },

    /// Status endpoint returned a non-200 response or an unreadable body
    #[error("Failed to fetch scan status (status {status}): {body}")]
    StatusFetch { status: u16, body: String },

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            ScanError::UploadRejected { .. } => EXIT_REMOTE_FAILURE,
            _ => EXIT_FAILURE,
        }
    }
}

impl From<zip::result::ZipError> for ScanError {
    fn from(err: zip::result::ZipError) -> Self {
        ScanError::Archive(err.to_string())
    }
}

impl From<walkdir::Error> for ScanError {
    fn from(err: walkdir::Error) -> Self {
        ScanError::Archive(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScanError::TargetNotFound(PathBuf::from("/missing"));
        assert_eq!(err.to_string(), "Target directory not found: /missing");
    }

    #[test]
    fn test_transport_display_includes_failure_kind() {
        let err = ScanError::Transport {
            operation: "Scan upload",
            failure: TransportFailure::Timeout,
            detail: "operation timed out".to_string(),
            diagnostics: None,
        };
        assert_eq!(
            err.to_string(),
            "Scan upload failed (timeout): operation timed out"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ScanError::Config("x".into()).exit_code(), EXIT_FAILURE);
        assert_eq!(
            ScanError::ArchiveTooLarge {
                size_mb: 3000.0,
                limit_mb: 2048
            }
            .exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(
            ScanError::ProjectCreate {
                status: 200,
                body: "{}".into(),
                rejection: Rejection::Body
            }
            .exit_code(),
            EXIT_FAILURE
        );
        assert_eq!(
            ScanError::UploadRejected {
                status: 400,
                body: "bad".into(),
                rejection: Rejection::Status
            }
            .exit_code(),
            EXIT_REMOTE_FAILURE
        );
        assert_eq!(
            ScanError::StatusFetch {
                status: 500,
                body: String::new()
            }
            .exit_code(),
            EXIT_FAILURE
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ScanError = io.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
