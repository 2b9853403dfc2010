//! Wire types for the CodeThreat API.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Result message returned by a successful project creation
pub const PROJECT_CREATED_MARKER: &str = "successfull";

/// Value of the `scan_source` form field
pub const SCAN_SOURCE: &str = "CLI";

#[derive(Debug, Clone, Serialize)]
pub struct ProjectCreateRequest {
    pub project_name: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl ProjectCreateRequest {
    pub fn for_project(project_name: &str) -> Self {
        Self {
            project_name: project_name.to_string(),
            description: "Created by CodeThreat CLI".to_string(),
            tags: vec!["cli".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectCreateResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub result: Option<ProjectCreateResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectCreateResult {
    #[serde(default)]
    pub message: Option<String>,
}

impl ProjectCreateResponse {
    pub fn is_success(&self) -> bool {
        !self.error
            && self
                .result
                .as_ref()
                .and_then(|r| r.message.as_deref())
                == Some(PROJECT_CREATED_MARKER)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanStartResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default, deserialize_with = "id_as_string")]
    pub scan_id: Option<String>,
}

/// One entry of a scan's log
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanLogEntry {
    #[serde(rename = "logType", default)]
    pub log_type: String,
    #[serde(default)]
    pub message: String,
    /// Creation timestamp as sent by the server
    #[serde(default, deserialize_with = "timestamp_as_string")]
    pub create_date: String,
}

/// Issue counts by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SeverityCounts {
    #[serde(default, deserialize_with = "lenient_count")]
    pub critical: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub high: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub medium: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub low: u64,
}

impl SeverityCounts {
    pub fn new(critical: u64, high: u64, medium: u64, low: u64) -> Self {
        Self {
            critical,
            high,
            medium,
            low,
        }
    }

    /// Per-severity increase since `previous`; decreases count as zero
    pub fn delta_since(&self, previous: &SeverityCounts) -> SeverityCounts {
        SeverityCounts {
            critical: self.critical.saturating_sub(previous.critical),
            high: self.high.saturating_sub(previous.high),
            medium: self.medium.saturating_sub(previous.medium),
            low: self.low.saturating_sub(previous.low),
        }
    }

    /// Non-zero categories, most severe first
    pub fn non_zero(&self) -> Vec<(&'static str, u64)> {
        [
            ("critical", self.critical),
            ("high", self.high),
            ("medium", self.medium),
            ("low", self.low),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.critical == 0 && self.high == 0 && self.medium == 0 && self.low == 0
    }

    /// True when any category went down compared to `previous`
    pub fn decreased_from(&self, previous: &SeverityCounts) -> bool {
        self.critical < previous.critical
            || self.high < previous.high
            || self.medium < previous.medium
            || self.low < previous.low
    }
}

/// Response of the scan status endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub logs: Vec<ScanLogEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sast_severities: SeverityCounts,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sca_severities: SeverityCounts,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn timestamp_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

fn id_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_create_success_requires_marker() {
        let ok: ProjectCreateResponse =
            serde_json::from_str(r#"{"error":false,"result":{"message":"successfull"}}"#).unwrap();
        assert!(ok.is_success());

        let flagged: ProjectCreateResponse =
            serde_json::from_str(r#"{"error":true,"result":{"message":"successfull"}}"#).unwrap();
        assert!(!flagged.is_success());

        let other: ProjectCreateResponse =
            serde_json::from_str(r#"{"error":false,"result":{"message":"exists"}}"#).unwrap();
        assert!(!other.is_success());

        let empty: ProjectCreateResponse = serde_json::from_str("{}").unwrap();
        assert!(!empty.is_success());
    }

    #[test]
    fn test_scan_start_id_forms() {
        let s: ScanStartResponse = serde_json::from_str(r#"{"error":false,"scan_id":"abc"}"#).unwrap();
        assert_eq!(s.scan_id.as_deref(), Some("abc"));

        let n: ScanStartResponse = serde_json::from_str(r#"{"error":false,"scan_id":42}"#).unwrap();
        assert_eq!(n.scan_id.as_deref(), Some("42"));

        let missing: ScanStartResponse = serde_json::from_str(r#"{"error":false}"#).unwrap();
        assert!(missing.scan_id.is_none());
    }

    #[test]
    fn test_scan_status_parsing() {
        let json = r#"{
            "state": "running",
            "logs": [
                {"logType": "info", "message": "Scan is starting", "create_date": "2024-05-01T10:00:00Z"},
                {"logType": "error", "message": "boom", "create_date": 1714557600000}
            ],
            "sast_severities": {"critical": 2, "high": "1", "medium": null},
            "sca_severities": null
        }"#;
        let status: ScanStatus = serde_json::from_str(json).unwrap();

        assert_eq!(status.state, "running");
        assert_eq!(status.logs.len(), 2);
        assert_eq!(status.logs[0].create_date, "2024-05-01T10:00:00Z");
        assert_eq!(status.logs[1].create_date, "1714557600000");
        assert_eq!(status.sast_severities, SeverityCounts::new(2, 1, 0, 0));
        assert_eq!(status.sca_severities, SeverityCounts::default());
    }

    #[test]
    fn test_delta_only_counts_increases() {
        let previous = SeverityCounts::new(2, 1, 0, 0);
        let current = SeverityCounts::new(5, 1, 0, 0);

        let delta = current.delta_since(&previous);
        assert_eq!(delta, SeverityCounts::new(3, 0, 0, 0));
        assert_eq!(delta.non_zero(), vec![("critical", 3)]);
    }

    #[test]
    fn test_delta_absorbs_decrease() {
        let previous = SeverityCounts::new(5, 4, 3, 2);
        let current = SeverityCounts::new(1, 6, 3, 0);

        assert_eq!(current.delta_since(&previous), SeverityCounts::new(0, 2, 0, 0));
        assert!(current.decreased_from(&previous));
    }
}
