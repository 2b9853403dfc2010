//! Size-tiered upload planning.
//!
//! Timeouts assume a pessimistic ~1 MB/s link so slow but legitimate uploads
//! are not cut off. Archives above the warning tier are rejected before any
//! bytes are sent.

use crate::error::ScanError;
use std::fmt;
use std::time::Duration;

pub const MB: u64 = 1024 * 1024;

/// Upper bounds (inclusive) of each tier in megabytes
pub const OPTIMAL_MAX_MB: u64 = 50;
pub const GOOD_MAX_MB: u64 = 100;
pub const LARGE_MAX_MB: u64 = 500;
pub const WARNING_MAX_MB: u64 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum UploadTier {
    Optimal,
    Good,
    Large,
    Warning,
    Critical,
}

impl UploadTier {
    /// Tier for an archive of `bytes`
    pub fn classify(bytes: u64) -> Self {
        if bytes <= OPTIMAL_MAX_MB * MB {
            UploadTier::Optimal
        } else if bytes <= GOOD_MAX_MB * MB {
            UploadTier::Good
        } else if bytes <= LARGE_MAX_MB * MB {
            UploadTier::Large
        } else if bytes <= WARNING_MAX_MB * MB {
            UploadTier::Warning
        } else {
            UploadTier::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadTier::Optimal => "optimal",
            UploadTier::Good => "good",
            UploadTier::Large => "large",
            UploadTier::Warning => "warning",
            UploadTier::Critical => "critical",
        }
    }
}

impl fmt::Display for UploadTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer settings derived from the archive size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    pub tier: UploadTier,
    pub connection_timeout: Duration,
    pub read_timeout: Duration,
    /// Stream the archive through a progress-tracking reader
    pub chunked: bool,
}

/// Plan an upload for an archive of `archive_bytes`.
///
/// Fails with `ArchiveTooLarge` for the critical tier.
pub fn plan(archive_bytes: u64) -> Result<UploadPlan, ScanError> {
    let tier = UploadTier::classify(archive_bytes);
    let (connection_secs, read_secs, chunked) = match tier {
        UploadTier::Optimal => (60, 900, false),
        UploadTier::Good => (120, 1800, false),
        UploadTier::Large => (300, 5400, true),
        UploadTier::Warning => (600, 10800, true),
        UploadTier::Critical => {
            return Err(ScanError::ArchiveTooLarge {
                size_mb: bytes_to_mb(archive_bytes),
                limit_mb: WARNING_MAX_MB,
            })
        }
    };

    Ok(UploadPlan {
        tier,
        connection_timeout: Duration::from_secs(connection_secs),
        read_timeout: Duration::from_secs(read_secs),
        chunked,
    })
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / MB as f64
}

/// Human readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries_are_inclusive() {
        assert_eq!(UploadTier::classify(0), UploadTier::Optimal);
        assert_eq!(UploadTier::classify(50 * MB), UploadTier::Optimal);
        assert_eq!(UploadTier::classify(50 * MB + 1), UploadTier::Good);
        assert_eq!(UploadTier::classify(100 * MB), UploadTier::Good);
        assert_eq!(UploadTier::classify(100 * MB + 1), UploadTier::Large);
        assert_eq!(UploadTier::classify(500 * MB), UploadTier::Large);
        assert_eq!(UploadTier::classify(500 * MB + 1), UploadTier::Warning);
        assert_eq!(UploadTier::classify(2048 * MB), UploadTier::Warning);
        assert_eq!(UploadTier::classify(2048 * MB + 1), UploadTier::Critical);
        assert_eq!(UploadTier::classify(u64::MAX), UploadTier::Critical);
    }

    #[test]
    fn test_tiers_never_decrease_with_size() {
        let mut previous = UploadTier::Optimal;
        for mb in (0..=3000u64).step_by(7) {
            let tier = UploadTier::classify(mb * MB);
            assert!(tier >= previous, "tier went backwards at {} MB", mb);
            previous = tier;
        }
    }

    #[test]
    fn test_plan_timeouts() {
        let optimal = plan(10 * MB).unwrap();
        assert_eq!(optimal.tier, UploadTier::Optimal);
        assert_eq!(optimal.connection_timeout, Duration::from_secs(60));
        assert_eq!(optimal.read_timeout, Duration::from_secs(900));
        assert!(!optimal.chunked);

        let good = plan(80 * MB).unwrap();
        assert_eq!(good.connection_timeout, Duration::from_secs(120));
        assert_eq!(good.read_timeout, Duration::from_secs(1800));
        assert!(!good.chunked);

        let large = plan(300 * MB).unwrap();
        assert_eq!(large.connection_timeout, Duration::from_secs(300));
        assert_eq!(large.read_timeout, Duration::from_secs(5400));
        assert!(large.chunked);

        let warning = plan(1500 * MB).unwrap();
        assert_eq!(warning.connection_timeout, Duration::from_secs(600));
        assert_eq!(warning.read_timeout, Duration::from_secs(10800));
        assert!(warning.chunked);
    }

    #[test]
    fn test_plan_rejects_critical() {
        let err = plan(3000 * MB).unwrap_err();
        match err {
            ScanError::ArchiveTooLarge { size_mb, limit_mb } => {
                assert_eq!(limit_mb, 2048);
                assert!((size_mb - 3000.0).abs() < f64::EPSILON);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        assert_eq!(plan(123 * MB).unwrap(), plan(123 * MB).unwrap());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * MB), "5.0 MB");
    }
}
