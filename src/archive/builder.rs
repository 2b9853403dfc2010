//! Zip archive construction for scan uploads.
//!
//! Walks the target tree once, prunes excluded directories before descending,
//! and streams every remaining file into a deflated zip inside a scoped
//! temporary directory. Unreadable files are logged and skipped.

use crate::archive::exclusion::ExclusionFilter;
use crate::error::ScanError;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Number of excluded paths kept for display
pub const MAX_EXCLUDED_SAMPLES: usize = 10;

/// Files at or above this size need zip64 extra fields
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Counters accumulated during the archive walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveManifest {
    pub included_files: u64,
    pub included_bytes: u64,
    pub excluded_files: u64,
    pub excluded_dirs: u64,
    pub excluded_bytes: u64,
    /// Files skipped because they could not be read
    pub skipped_files: u64,
    /// First excluded file paths, relative to the target
    pub excluded_samples: Vec<String>,
}

impl ArchiveManifest {
    fn record_excluded_file(&mut self, relative: &str, size: u64) {
        self.excluded_files += 1;
        self.excluded_bytes += size;
        if self.excluded_samples.len() < MAX_EXCLUDED_SAMPLES {
            self.excluded_samples.push(relative.to_string());
        }
    }

    /// Excluded files beyond the displayed samples
    pub fn hidden_excluded_files(&self) -> u64 {
        self.excluded_files
            .saturating_sub(self.excluded_samples.len() as u64)
    }
}

/// A finished archive, deleted together with its temporary directory on drop
#[derive(Debug)]
pub struct PackagedArchive {
    _dir: TempDir,
    path: PathBuf,
    size_bytes: u64,
    manifest: ArchiveManifest,
}

impl PackagedArchive {
    /// Wrap an archive file living inside `dir`
    pub fn new(dir: TempDir, path: PathBuf, manifest: ArchiveManifest) -> Result<Self, ScanError> {
        let size_bytes = std::fs::metadata(&path)?.len();
        Ok(Self {
            _dir: dir,
            path,
            size_bytes,
            manifest,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn manifest(&self) -> &ArchiveManifest {
        &self.manifest
    }
}

/// Produces the upload archive for a target directory
pub trait Archiver {
    fn package(&self, target_dir: &Path, project_name: &str) -> Result<PackagedArchive, ScanError>;
}

/// Default zip archiver
#[derive(Debug, Clone, Default)]
pub struct ZipArchiver {
    filter: ExclusionFilter,
}

impl ZipArchiver {
    pub fn new(filter: ExclusionFilter) -> Self {
        Self { filter }
    }
}

impl Archiver for ZipArchiver {
    fn package(&self, target_dir: &Path, project_name: &str) -> Result<PackagedArchive, ScanError> {
        build_archive_with(&self.filter, target_dir, project_name)
    }
}

/// Build an archive using the default exclusion table
pub fn build_archive(target_dir: &Path, project_name: &str) -> Result<PackagedArchive, ScanError> {
    build_archive_with(&ExclusionFilter::default(), target_dir, project_name)
}

/// Build an archive of `target_dir`, skipping everything `filter` excludes
pub fn build_archive_with(
    filter: &ExclusionFilter,
    target_dir: &Path,
    project_name: &str,
) -> Result<PackagedArchive, ScanError> {
    if !target_dir.is_dir() {
        return Err(ScanError::TargetNotFound(target_dir.to_path_buf()));
    }

    let temp_dir = tempfile::Builder::new().prefix("codethreat-").tempdir()?;
    let archive_path = temp_dir
        .path()
        .join(format!("{}.zip", sanitize_file_stem(project_name)));

    info!(target_dir = %target_dir.display(), archive = %archive_path.display(), "Building archive");

    let file = File::create(&archive_path)?;
    let mut zip = ZipWriter::new(file);
    let mut manifest = ArchiveManifest::default();

    let mut walker = WalkDir::new(target_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "Skipping unreadable path");
                manifest.skipped_files += 1;
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(target_dir) else {
            continue;
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if filter.is_excluded_dir(relative) {
                debug!(path = %relative.display(), "Pruning excluded directory");
                manifest.excluded_dirs += 1;
                walker.skip_current_dir();
            }
            continue;
        }

        if file_type.is_symlink() {
            debug!(path = %relative.display(), "Skipping symlink");
            continue;
        }

        let entry_name = archive_entry_name(relative);
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);

        if filter.should_exclude(relative) {
            manifest.record_excluded_file(&entry_name, size);
            continue;
        }

        match append_file(&mut zip, entry.path(), &entry_name, size) {
            Ok(written) => {
                manifest.included_files += 1;
                manifest.included_bytes += written;
            }
            Err(AppendError::Read(err)) => {
                warn!(path = %entry.path().display(), error = %err, "Skipping file that could not be read");
                manifest.skipped_files += 1;
            }
            Err(AppendError::Zip(err)) => return Err(err.into()),
        }
    }

    zip.finish()?;

    if manifest.included_files == 0 {
        return Err(ScanError::EmptyTarget(target_dir.to_path_buf()));
    }

    info!(
        included = manifest.included_files,
        excluded_files = manifest.excluded_files,
        excluded_dirs = manifest.excluded_dirs,
        skipped = manifest.skipped_files,
        "Archive complete"
    );

    PackagedArchive::new(temp_dir, archive_path, manifest)
}

enum AppendError {
    /// Source file problem; the walk continues
    Read(io::Error),
    /// Archive writer problem; the archive is unusable
    Zip(zip::result::ZipError),
}

fn append_file<W: io::Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    source: &Path,
    entry_name: &str,
    size_hint: u64,
) -> Result<u64, AppendError> {
    let mut file = File::open(source).map_err(AppendError::Read)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size_hint >= ZIP64_THRESHOLD);

    zip.start_file(entry_name, options).map_err(AppendError::Zip)?;

    match io::copy(&mut file, zip) {
        Ok(written) => Ok(written),
        Err(err) => {
            zip.abort_file().map_err(AppendError::Zip)?;
            Err(AppendError::Read(err))
        }
    }
}

/// Forward-slash entry name for a path relative to the target root
fn archive_entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.trim_matches('.').is_empty() {
        "archive".to_string()
    } else {
        stem
    }
}
