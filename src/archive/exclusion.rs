//! Exclusion rules for the upload archive.
//!
//! Drops VCS metadata, dependency and build output directories, IDE state,
//! binaries, media and logs before anything is compressed.

use std::path::{Component, Path};

/// Patterns excluded from every upload.
///
/// A trailing `/` marks a directory name, a leading `*.` a suffix glob, and
/// anything else an exact file name.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    // Version control
    ".git/",
    ".svn/",
    ".hg/",
    ".bzr/",
    "CVS/",
    ".gitattributes",
    // JavaScript / TypeScript
    "node_modules/",
    "bower_components/",
    "jspm_packages/",
    ".npm/",
    ".yarn/",
    ".pnpm-store/",
    ".next/",
    ".nuxt/",
    ".svelte-kit/",
    ".angular/",
    ".parcel-cache/",
    ".turbo/",
    ".cache/",
    "coverage/",
    ".nyc_output/",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "*.min.js",
    "*.min.css",
    "*.map",
    // Python
    "__pycache__/",
    ".venv/",
    "venv/",
    "env/",
    ".tox/",
    ".nox/",
    ".mypy_cache/",
    ".pytest_cache/",
    ".ruff_cache/",
    ".eggs/",
    "site-packages/",
    "*.pyc",
    "*.pyo",
    "*.pyd",
    "*.egg",
    "*.whl",
    "Pipfile.lock",
    "poetry.lock",
    // JVM
    ".gradle/",
    ".m2/",
    "*.class",
    "*.jar",
    "*.war",
    "*.ear",
    // .NET
    ".dotnet/",
    "obj/",
    "*.snupkg",
    "TestResults/",
    "*.nupkg",
    "*.pdb",
    // Go / Rust / Ruby / PHP
    "vendor/",
    "target/",
    ".bundle/",
    "Gemfile.lock",
    "composer.lock",
    "Cargo.lock",
    "go.sum",
    // iOS / Android
    "Pods/",
    "DerivedData/",
    "*.apk",
    "*.aab",
    "*.ipa",
    // Generic build output
    "build/",
    "dist/",
    "out/",
    "tmp/",
    "temp/",
    ".terraform/",
    ".serverless/",
    // IDE and editor state
    ".idea/",
    ".vscode/",
    ".vs/",
    ".settings/",
    ".fleet/",
    ".project",
    ".classpath",
    "*.iml",
    "*.suo",
    "*.user",
    "*.swp",
    "*.swo",
    ".DS_Store",
    "Thumbs.db",
    "desktop.ini",
    // Native binaries and objects
    "*.exe",
    "*.dll",
    "*.so",
    "*.dylib",
    "*.o",
    "*.obj",
    "*.a",
    "*.lib",
    "*.bin",
    "*.dat",
    // Archives
    "*.zip",
    "*.tar",
    "*.gz",
    "*.tgz",
    "*.bz2",
    "*.xz",
    "*.7z",
    "*.rar",
    "*.iso",
    "*.dmg",
    // Images
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.bmp",
    "*.ico",
    "*.tiff",
    "*.webp",
    "*.psd",
    // Audio / video
    "*.mp3",
    "*.wav",
    "*.ogg",
    "*.flac",
    "*.mp4",
    "*.avi",
    "*.mov",
    "*.mkv",
    "*.webm",
    // Fonts and documents
    "*.ttf",
    "*.otf",
    "*.woff",
    "*.woff2",
    "*.eot",
    "*.pdf",
    // Databases
    "*.db",
    "*.sqlite",
    "*.sqlite3",
    // Logs
    "logs/",
    "*.log",
];

/// A single parsed exclusion pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionRule {
    /// Exact path component, e.g. `node_modules`
    Directory(String),
    /// File name suffix including the dot, e.g. `.pyc`
    Suffix(String),
    /// Exact file name, e.g. `Gemfile.lock`
    FileName(String),
}

impl ExclusionRule {
    /// Parse a pattern in its declared form
    pub fn parse(pattern: &str) -> Self {
        if let Some(name) = pattern.strip_suffix('/') {
            ExclusionRule::Directory(name.to_string())
        } else if let Some(ext) = pattern.strip_prefix('*') {
            ExclusionRule::Suffix(ext.to_string())
        } else {
            ExclusionRule::FileName(pattern.to_string())
        }
    }

    /// Check this rule against a path
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            ExclusionRule::Directory(name) => path.components().any(|component| {
                matches!(component, Component::Normal(part) if part == name.as_str())
            }),
            ExclusionRule::Suffix(ext) => path.to_string_lossy().ends_with(ext.as_str()),
            ExclusionRule::FileName(name) => path
                .file_name()
                .map(|file_name| file_name == name.as_str())
                .unwrap_or(false),
        }
    }
}

/// Immutable set of exclusion rules
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    rules: Vec<ExclusionRule>,
}

impl Default for ExclusionFilter {
    fn default() -> Self {
        Self::from_patterns(DEFAULT_EXCLUSIONS)
    }
}

impl ExclusionFilter {
    pub fn from_patterns(patterns: &[&str]) -> Self {
        Self {
            rules: patterns.iter().map(|p| ExclusionRule::parse(p)).collect(),
        }
    }

    /// True when any rule matches the path
    pub fn should_exclude(&self, path: &Path) -> bool {
        self.rules.iter().any(|rule| rule.matches(path))
    }

    /// True when the path's own name is an excluded directory name.
    ///
    /// Used to prune a directory before descending into it.
    pub fn is_excluded_dir(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        self.rules.iter().any(|rule| {
            matches!(rule, ExclusionRule::Directory(dir) if name == dir.as_str())
        })
    }

    pub fn rules(&self) -> &[ExclusionRule] {
        &self.rules
    }
}
