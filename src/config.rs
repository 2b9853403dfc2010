use crate::error::ScanError;
use std::fs;
use std::path::{Path, PathBuf};

pub const TOKEN_KEY: &str = "CODETHREAT_TOKEN";
pub const ORGANIZATION_KEY: &str = "CODETHREAT_ORG";
pub const BASE_URL_KEY: &str = "CODETHREAT_URL";

const CONFIG_FILE_NAME: &str = ".codethreat_cli_config";

pub fn get_config_file_path() -> Result<PathBuf, ScanError> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .ok_or_else(|| ScanError::Config("Could not find home directory".to_string()))
}

pub fn get_logs_dir() -> Result<PathBuf, ScanError> {
    dirs::home_dir()
        .map(|home| home.join(".codethreat").join("logs"))
        .ok_or_else(|| ScanError::Config("Could not find home directory".to_string()))
}

pub fn ensure_logs_dir() -> Result<PathBuf, ScanError> {
    let logs_dir = get_logs_dir()?;
    if !logs_dir.exists() {
        fs::create_dir_all(&logs_dir)?;

        // Set permissions to 700 (read/write/execute for owner only) on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let metadata = fs::metadata(&logs_dir)?;
            let mut permissions = metadata.permissions();
            permissions.set_mode(0o700);
            fs::set_permissions(&logs_dir, permissions)?;
        }
    }
    Ok(logs_dir)
}

/// Looks up settings in the environment, then in the flat config file
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    file_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(file_path: Option<PathBuf>) -> Self {
        Self { file_path }
    }

    /// Resolver backed by `~/.codethreat_cli_config`
    pub fn from_default_location() -> Self {
        Self::new(get_config_file_path().ok())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_with(key, |k| std::env::var(k).ok())
    }

    /// Same as `get` with an explicit environment lookup
    pub fn get_with<F>(&self, key: &str, env: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = env(key).filter(|v| !v.trim().is_empty()) {
            return Some(value);
        }
        self.file_path
            .as_deref()
            .and_then(|path| read_config_value(path, key))
    }
}

fn read_config_value(path: &Path, key: &str) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    parse_config_value(&content, key)
}

/// First `KEY=value` line for `key`; blank lines and `#` comments are ignored
pub fn parse_config_value(content: &str, key: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Inputs for one scan run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub target_dir: PathBuf,
    pub project: String,
    pub base_url: String,
    pub token: String,
    pub organization: String,
    pub branch: Option<String>,
    pub policy_id: Option<String>,
}

impl ScanRequest {
    /// Build a request from resolved settings; fails naming the first missing key
    pub fn from_config(
        config: &ConfigResolver,
        target_dir: PathBuf,
        project: String,
        branch: Option<String>,
        policy_id: Option<String>,
    ) -> Result<Self, ScanError> {
        Self::from_lookup(|key| config.get(key), target_dir, project, branch, policy_id)
    }

    pub fn from_lookup<F>(
        lookup: F,
        target_dir: PathBuf,
        project: String,
        branch: Option<String>,
        policy_id: Option<String>,
    ) -> Result<Self, ScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key).ok_or_else(|| ScanError::Config(format!("{} is not set", key)))
        };

        let token = require(TOKEN_KEY)?;
        let organization = require(ORGANIZATION_KEY)?;
        let base_url = require(BASE_URL_KEY)?.trim_end_matches('/').to_string();

        if project.trim().is_empty() {
            return Err(ScanError::Config("Project name must not be empty".to_string()));
        }

        Ok(Self {
            target_dir,
            project,
            base_url,
            token,
            organization,
            branch: branch.filter(|b| !b.trim().is_empty()),
            policy_id: policy_id.filter(|p| !p.trim().is_empty()),
        })
    }
}
