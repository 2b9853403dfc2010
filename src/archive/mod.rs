//! Archive construction with exclusion filtering.

pub mod builder;
pub mod exclusion;

pub use builder::{build_archive, ArchiveManifest, Archiver, PackagedArchive, ZipArchiver};
pub use exclusion::{ExclusionFilter, ExclusionRule};
