//! YAML configuration loading.
//!
//! # Lookup order
//!
//! ```text
//! --config <path>                      (explicit, skips the search)
//! /etc/gitmirror/config.yaml
//! <user config dir>/gitmirror/config.yaml
//! ./config.yaml
//! ```
//!
//! # Defaults
//!
//! Every load deserializes into a fresh [`RawConfig`] and applies defaults
//! exactly once in [`build`]. A key removed from the file therefore reverts to
//! its default on the next reload instead of keeping the previous value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::registry::RepoRegistry;
use crate::types::{
    Config, LabelKind, LogFormat, LogLevel, LogOutput, LogSettings, RepositoryConfig,
};

pub const CONFIG_FILE_NAME: &str = "config.yaml";
pub const SYSTEM_CONFIG_DIR: &str = "/etc/gitmirror";

pub const DEFAULT_LISTEN: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_RETRY_COUNT: u32 = 1;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 10;
pub const DEFAULT_THREADS: usize = 5;
pub const DEFAULT_LABEL: &str = "master";
pub const DEFAULT_REMOTE: &str = "origin";

// ---------------------------------------------------------------------------
// 1. Raw document
// ---------------------------------------------------------------------------

/// The configuration document exactly as written; every field optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub listen: Option<String>,
    pub port: Option<PortValue>,
    pub retry_count: Option<u32>,
    pub retry_delay: Option<u64>,
    pub threads: Option<usize>,
    pub initialise: Option<bool>,
    pub logging: RawLogging,
    pub repos: Vec<RawRepo>,
}

/// Ports are accepted both as numbers and as quoted strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(u16),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawLogging {
    pub format: Option<String>,
    pub output: Option<String>,
    pub level: Option<String>,
    pub timestamp: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRepo {
    pub url: String,
    pub path: String,
    pub directory: PathBuf,
    pub label: Option<String>,
    #[serde(rename = "labelType", alias = "label_type")]
    pub label_type: Option<String>,
    pub remote: Option<String>,
    pub secret: Option<String>,
    #[serde(rename = "sshPrivKey", alias = "ssh_priv_key")]
    pub ssh_priv_key: Option<PathBuf>,
    #[serde(rename = "sshPassPhrase", alias = "ssh_pass_phrase")]
    pub ssh_pass_phrase: Option<String>,
    pub trigger: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// 2. Locate + load
// ---------------------------------------------------------------------------

/// Candidate config files in lookup order.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("gitmirror").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(CONFIG_FILE_NAME));
    paths
}

/// Resolve the config file: the explicit path if given, else the first
/// existing entry of [`search_paths`].
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let searched = search_paths();
    searched
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or(ConfigError::NotFound { searched })
}

/// Read and build a configuration generation from `path`.
pub fn load_at(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = parse(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(build(raw))
}

/// Parse a YAML document; an empty document yields all defaults.
pub fn parse(contents: &str) -> Result<RawConfig, serde_yaml::Error> {
    if contents.trim().is_empty() {
        return Ok(RawConfig::default());
    }
    serde_yaml::from_str(contents)
}

// ---------------------------------------------------------------------------
// 3. Defaults
// ---------------------------------------------------------------------------

/// Apply defaults and validation, producing an immutable [`Config`].
///
/// Problems that have a sensible fallback are logged as warnings rather than
/// rejected: unknown label types fall back to `branch`, zero retry counts and
/// thread limits are raised to 1, duplicate paths are reported.
pub fn build(raw: RawConfig) -> Config {
    let repos: Vec<RepositoryConfig> = raw.repos.into_iter().map(build_repo).collect();
    let registry = RepoRegistry::new(repos);
    for path in registry.duplicate_paths() {
        tracing::warn!(
            path = %path,
            "multiple repos configured with the same path; only the first will be used",
        );
    }

    let retry_count = match raw.retry_count {
        Some(0) => {
            tracing::warn!("retry_count of 0 would never fetch, using 1");
            1
        }
        Some(n) => n,
        None => DEFAULT_RETRY_COUNT,
    };
    let threads = match raw.threads {
        Some(0) => {
            tracing::warn!("threads of 0 would never run a job, using 1");
            1
        }
        Some(n) => n,
        None => DEFAULT_THREADS,
    };

    Config {
        listen: raw.listen.unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
        port: build_port(raw.port),
        retry_count,
        retry_delay: Duration::from_secs(raw.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY_SECS)),
        threads,
        initialise: raw.initialise.unwrap_or(true),
        logging: build_logging(raw.logging),
        repos: registry,
        loaded_at: Utc::now(),
    }
}

fn build_port(port: Option<PortValue>) -> u16 {
    match port {
        None => DEFAULT_PORT,
        Some(PortValue::Number(n)) => n,
        Some(PortValue::Text(text)) => text.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(port = %text, default = DEFAULT_PORT, "invalid port, using default");
            DEFAULT_PORT
        }),
    }
}

fn build_logging(raw: RawLogging) -> LogSettings {
    let format = match raw.format.as_deref() {
        None | Some("") | Some("text") => LogFormat::Text,
        Some("json") => LogFormat::Json,
        Some(other) => {
            tracing::warn!(format = %other, "unknown logging format, using text");
            LogFormat::Text
        }
    };
    let output = match raw.output.as_deref() {
        None | Some("") | Some("stdout") => LogOutput::Stdout,
        Some(path) => LogOutput::File(PathBuf::from(path)),
    };
    let level = match raw.level.as_deref() {
        None | Some("") => LogLevel::Info,
        Some(value) => LogLevel::parse(value).unwrap_or_else(|| {
            tracing::warn!(level = %value, "unknown logging level, using info");
            LogLevel::Info
        }),
    };
    LogSettings {
        format,
        output,
        level,
        timestamp: raw.timestamp.unwrap_or(true),
    }
}

fn build_repo(raw: RawRepo) -> RepositoryConfig {
    let label_kind = match non_empty(raw.label_type) {
        None => LabelKind::Branch,
        Some(value) => LabelKind::parse(&value).unwrap_or_else(|| {
            tracing::warn!(
                url = %raw.url,
                label_type = %value,
                "unknown label type, defaulting to branch",
            );
            LabelKind::Branch
        }),
    };

    RepositoryConfig {
        label: non_empty(raw.label).unwrap_or_else(|| DEFAULT_LABEL.to_string()),
        label_kind,
        remote: non_empty(raw.remote).unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
        secret: raw.secret.unwrap_or_default(),
        ssh_private_key: raw.ssh_priv_key.filter(|p| !p.as_os_str().is_empty()),
        ssh_passphrase: non_empty(raw.ssh_pass_phrase),
        trigger: raw.trigger.filter(|p| !p.as_os_str().is_empty()),
        url: raw.url,
        path: raw.path,
        directory: raw.directory,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_all_defaults() {
        let config = build(parse("").expect("parse"));
        assert_eq!(config.listen, DEFAULT_LISTEN);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.retry_count, 1);
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert_eq!(config.threads, 5);
        assert!(config.initialise);
        assert_eq!(config.logging, LogSettings::default());
        assert!(config.repos.is_empty());
    }

    #[test]
    fn port_accepts_quoted_string() {
        let config = build(parse("port: \"8080\"\n").expect("parse"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn invalid_port_string_falls_back() {
        let config = build(parse("port: nope\n").expect("parse"));
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn zero_limits_are_raised() {
        let config = build(parse("retry_count: 0\nthreads: 0\n").expect("parse"));
        assert_eq!(config.retry_count, 1);
        assert_eq!(config.threads, 1);
    }

    #[test]
    fn repo_defaults_applied_once() {
        let yaml = "repos:\n  - url: git@github.com:acme/site.git\n    path: /site\n    directory: /srv/site\n";
        let config = build(parse(yaml).expect("parse"));
        let repo = &config.repositories()[0];
        assert_eq!(repo.label, "master");
        assert_eq!(repo.label_kind, LabelKind::Branch);
        assert_eq!(repo.remote, "origin");
        assert!(repo.trigger.is_none());
        assert!(repo.ssh_private_key.is_none());
    }

    #[test]
    fn unknown_label_type_defaults_to_branch() {
        let yaml = "repos:\n  - url: u\n    path: /p\n    directory: /d\n    labelType: commit\n";
        let config = build(parse(yaml).expect("parse"));
        assert_eq!(config.repositories()[0].label_kind, LabelKind::Branch);
    }

    #[test]
    fn logging_section_parsed() {
        let yaml = "logging:\n  format: json\n  output: /var/log/gitmirror.log\n  level: debug\n  timestamp: false\n";
        let config = build(parse(yaml).expect("parse"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(
            config.logging.output,
            LogOutput::File(PathBuf::from("/var/log/gitmirror.log"))
        );
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(!config.logging.timestamp);
    }

    #[test]
    fn locate_prefers_explicit_path() {
        let explicit = Path::new("/nonexistent/custom.yaml");
        assert_eq!(locate(Some(explicit)).expect("locate"), explicit);
    }
}
