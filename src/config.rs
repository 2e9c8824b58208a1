//! Daemon Configuration
//!
//! YAML-backed configuration with load-time validation. Every policy knob is
//! checked when the file is read so a bad `sort_key` or a half-configured
//! post-action is rejected at startup, not at the first transfer that
//! happens to exercise it.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors surfaced at load time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("feed '{feed}': {reason}")]
    Invalid { feed: String, reason: String },
}

/// Top-level daemon configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Directory holding one audit record file per feed.
    pub audit_dir: PathBuf,
    /// Optional directory scanned for per-feed suppression flag files.
    #[serde(default)]
    pub suppress_dir: Option<PathBuf>,
    pub feeds: Vec<FeedConfig>,
}

impl AppConfig {
    /// Load and validate a YAML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: AppConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every feed; called by [`AppConfig::load`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for feed in &self.feeds {
            if !seen.insert(feed.name.as_str()) {
                return Err(ConfigError::Invalid {
                    feed: feed.name.clone(),
                    reason: "duplicate feed name".to_string(),
                });
            }
            feed.validate()?;
        }
        Ok(())
    }
}

/// Logging configuration (level, destination, rotation).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log directory; stdout-only when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default)]
    pub use_json: bool,
    /// "hourly", "daily", or anything else for a single unrotated file.
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            file: default_log_file(),
            use_json: false,
            rotation: default_rotation(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "feedhaul.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_key_fn() -> String {
    "id_rsa".to_string()
}

/// One source→destination transfer route.
///
/// Immutable for the lifetime of a run; the polling loop shares it read-only.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedConfig {
    /// Unique feed identifier, used for audit and suppression file names.
    pub name: String,
    /// Local directory polled for candidate files.
    pub source_dir: PathBuf,
    /// Glob pattern selecting candidate filenames within `source_dir`.
    pub source_fn: String,
    /// Remote directory files are delivered to.
    pub dest_dir: PathBuf,
    pub dest_host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub dest_user: String,
    /// Private key filename, resolved under `~/.ssh/`.
    #[serde(default = "default_key_fn")]
    pub key_fn: String,
    /// Minimum seconds between directory scans.
    pub polling_seconds: u64,
    #[serde(default)]
    pub sort_key: SortKey,
    #[serde(default)]
    pub source_post_action: SourcePostAction,
    /// Archive directory for `source_post_action: move`.
    #[serde(default)]
    pub source_post_dir: Option<PathBuf>,
    #[serde(default)]
    pub dest_post_action: DestPostAction,
    #[serde(default)]
    pub dest_post_action_symlink_dir: Option<PathBuf>,
    #[serde(default)]
    pub dest_post_action_symlink_fn: Option<String>,
    /// Stop the poller after this many successful transfers.
    #[serde(default)]
    pub transfer_limit: Option<u64>,
}

impl FeedConfig {
    /// Compile the `source_fn` glob. Validation guarantees this succeeds for
    /// a loaded config; the `Result` covers hand-built configs.
    pub fn glob(&self) -> Result<GlobMatcher, globset::Error> {
        Ok(Glob::new(&self.source_fn)?.compile_matcher())
    }

    /// Fully-qualified symlink path for the symlink dest post-action.
    pub fn dest_symlink_fqfn(&self) -> Option<PathBuf> {
        let dir = self.dest_post_action_symlink_dir.as_ref()?;
        let link_fn = self.dest_post_action_symlink_fn.as_ref()?;
        Some(dir.join(link_fn))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            feed: self.name.clone(),
            reason,
        };

        if self.name.is_empty() {
            return Err(ConfigError::Invalid {
                feed: "<unnamed>".to_string(),
                reason: "feed name must not be empty".to_string(),
            });
        }
        if self.dest_user.is_empty() {
            return Err(invalid("dest_user must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(invalid("port must be non-zero".to_string()));
        }
        if let Err(e) = Glob::new(&self.source_fn) {
            return Err(invalid(format!(
                "bad source_fn glob '{}': {e}",
                self.source_fn
            )));
        }
        if self.source_post_action == SourcePostAction::Move && self.source_post_dir.is_none() {
            return Err(invalid(
                "source_post_action 'move' requires source_post_dir".to_string(),
            ));
        }
        if self.dest_post_action == DestPostAction::Symlink && self.dest_symlink_fqfn().is_none() {
            return Err(invalid(
                "dest_post_action 'symlink' requires dest_post_action_symlink_dir \
                 and dest_post_action_symlink_fn"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Ordering policy for candidate files.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "Option<String>", try_from = "Option<String>")]
pub enum SortKey {
    /// Directory order, unsorted.
    #[default]
    None,
    /// Lexicographic by filename.
    Name,
    /// By the value of a `key-value` token embedded in the filename.
    Field(String),
}

impl SortKey {
    pub fn as_config_str(&self) -> Option<String> {
        match self {
            SortKey::None => None,
            SortKey::Name => Some("name".to_string()),
            SortKey::Field(key) => Some(format!("field:{key}")),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_config_str() {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "none"),
        }
    }
}

impl From<SortKey> for Option<String> {
    fn from(key: SortKey) -> Self {
        key.as_config_str()
    }
}

impl TryFrom<Option<String>> for SortKey {
    type Error = String;

    fn try_from(value: Option<String>) -> Result<Self, Self::Error> {
        let Some(raw) = value else {
            return Ok(SortKey::None);
        };
        match raw.as_str() {
            "none" => Ok(SortKey::None),
            "name" => Ok(SortKey::Name),
            _ => match raw.strip_prefix("field:") {
                Some(key) if !key.is_empty() => Ok(SortKey::Field(key.to_string())),
                _ => Err(format!(
                    "invalid sort_key '{raw}' (expected 'none', 'name' or 'field:<key>')"
                )),
            },
        }
    }
}

/// What happens to the source file after a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePostAction {
    #[default]
    None,
    /// Delete the source file.
    Delete,
    /// Move the source file into `source_post_dir`.
    Move,
}

/// Destination-side side effect after the rename into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestPostAction {
    #[default]
    None,
    /// Maintain a symlink pointing at the delivered file.
    Symlink,
    /// Checksum verification. Accepted by config, unimplemented at runtime.
    CrcCheck,
}

/// Minimal feed for unit tests elsewhere in the crate.
#[cfg(test)]
pub fn test_feed(source_dir: &str, dest_dir: &str) -> FeedConfig {
    FeedConfig {
        name: "test".to_string(),
        source_dir: PathBuf::from(source_dir),
        source_fn: "*".to_string(),
        dest_dir: PathBuf::from(dest_dir),
        dest_host: "localhost".to_string(),
        port: 22,
        dest_user: "tester".to_string(),
        key_fn: "id_rsa".to_string(),
        polling_seconds: 0,
        sort_key: SortKey::None,
        source_post_action: SourcePostAction::None,
        source_post_dir: None,
        dest_post_action: DestPostAction::None,
        dest_post_action_symlink_dir: None,
        dest_post_action_symlink_fn: None,
        transfer_limit: None,
    }
}
