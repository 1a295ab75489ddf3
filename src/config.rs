use crate::manifest::OverflowPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

/// Roots and limits a run works with.
///
/// Every field is optional in the TOML file; missing ones keep the defaults
/// below, which match the layout of a stock WAF install.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where the new files of an upgrade are staged.
    pub staging_root: String,
    /// The deployed tree. A record's `waf_base` replaces this.
    pub live_root: String,
    /// Where replaced and deleted files are kept for rollback.
    pub backup_root: String,
    pub max_path_length: usize,
    pub max_record_count: usize,
    pub overflow: OverflowPolicy,
    /// Mode for directories created in the backup and live trees.
    pub dir_mode: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            staging_root: "upgrade/".to_string(),
            live_root: "/waf/".to_string(),
            backup_root: "bak/".to_string(),
            max_path_length: 256,
            max_record_count: 128,
            overflow: OverflowPolicy::Reject,
            dir_mode: 0o751,
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ConfigError::PermissionDenied(path.to_path_buf())
            } else {
                ConfigError::Io(e)
            }
        })?;

        Self::from_toml(&content)
    }

    /// Apply command line overrides on top of the loaded values.
    pub fn with_overrides(
        mut self,
        staging_root: Option<String>,
        live_root: Option<String>,
        backup_root: Option<String>,
    ) -> Self {
        if let Some(root) = staging_root {
            self.staging_root = root;
        }
        if let Some(root) = live_root {
            self.live_root = root;
        }
        if let Some(root) = backup_root {
            self.backup_root = root;
        }
        self
    }
}
