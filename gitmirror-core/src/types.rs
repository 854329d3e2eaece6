//! Domain types for mirrored repositories and configuration snapshots.
//!
//! Every type here is immutable once built. A configuration change produces a
//! brand new [`Config`]; nothing is patched in place.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::RepoRegistry;

/// Host prefix stripped from SSH URLs when deriving a short repository name.
const FORGE_SSH_PREFIX: &str = "git@github.com:";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Whether a repository tracks a branch or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    #[default]
    Branch,
    Tag,
}

impl LabelKind {
    /// Parse a config value; `None` for anything other than `branch`/`tag`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "branch" => Some(LabelKind::Branch),
            "tag" => Some(LabelKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for LabelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelKind::Branch => write!(f, "branch"),
            LabelKind::Tag => write!(f, "tag"),
        }
    }
}

/// The two operations a sync job can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Clone,
    Update,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Clone => write!(f, "clone"),
            JobKind::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Filter directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Logging settings from the `logging` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub format: LogFormat,
    pub output: LogOutput,
    pub level: LogLevel,
    pub timestamp: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            output: LogOutput::Stdout,
            level: LogLevel::Info,
            timestamp: true,
        }
    }
}

/// One mirrored repository, with defaults already applied.
#[derive(Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Remote URL, compared verbatim against push events.
    pub url: String,
    /// HTTP path that routes webhooks to this repository.
    pub path: String,
    /// Local checkout directory.
    pub directory: PathBuf,
    pub label: String,
    pub label_kind: LabelKind,
    pub remote: String,
    pub secret: String,
    pub ssh_private_key: Option<PathBuf>,
    pub ssh_passphrase: Option<String>,
    pub trigger: Option<PathBuf>,
}

impl RepositoryConfig {
    /// Short name for log context: `git@github.com:owner/repo.git` → `owner/repo`.
    pub fn name(&self) -> &str {
        let name = self.url.strip_prefix(FORGE_SSH_PREFIX).unwrap_or(&self.url);
        name.strip_suffix(".git").unwrap_or(name)
    }

    /// Ref checked out by a fresh clone.
    pub fn clone_ref(&self) -> String {
        match self.label_kind {
            LabelKind::Branch => format!("refs/heads/{}", self.label),
            LabelKind::Tag => format!("refs/tags/{}", self.label),
        }
    }

    /// Ref whose target an update resets to, after fetching.
    pub fn target_ref(&self) -> String {
        match self.label_kind {
            LabelKind::Branch => format!("refs/remotes/{}/{}", self.remote, self.label),
            LabelKind::Tag => format!("refs/tags/{}", self.label),
        }
    }

    pub fn has_secret(&self) -> bool {
        !self.secret.is_empty()
    }
}

impl fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("url", &self.url)
            .field("path", &self.path)
            .field("directory", &self.directory)
            .field("label", &self.label)
            .field("label_kind", &self.label_kind)
            .field("remote", &self.remote)
            .field("secret", &if self.has_secret() { "<redacted>" } else { "" })
            .field("ssh_private_key", &self.ssh_private_key)
            .field("ssh_passphrase", &self.ssh_passphrase.as_ref().map(|_| "<redacted>"))
            .field("trigger", &self.trigger)
            .finish()
    }
}

/// One configuration generation.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub port: u16,
    /// Fetch attempts per update; never below 1.
    pub retry_count: u32,
    pub retry_delay: Duration,
    /// Concurrency limit for the dispatcher; never below 1.
    pub threads: usize,
    pub initialise: bool,
    pub logging: LogSettings,
    pub repos: RepoRegistry,
    pub loaded_at: DateTime<Utc>,
}

impl Config {
    /// `listen:port` as accepted by `TcpListener::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }

    pub fn repositories(&self) -> &[Arc<RepositoryConfig>] {
        self.repos.all()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
