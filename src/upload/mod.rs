//! Upload planning and transport.
//!
//! Sizes the archive into a tier, then talks to the CodeThreat API (project
//! check/creation, archive upload, status fetch).

pub mod client;
pub mod plan;
pub mod progress;
pub mod retry;
pub mod types;

pub use client::{HttpScanApi, ScanApi, UploadRequest};
pub use plan::{plan, UploadPlan, UploadTier};
pub use progress::{ProgressReader, ProgressSnapshot};
pub use retry::RetryStrategy;
pub use types::{ScanLogEntry, ScanStatus, SeverityCounts};
