//! Config loading error-message, defaulting and routing integration tests.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_fs::prelude::*;
use gitmirror_core::{config, ConfigError, LabelKind, LogFormat};
use predicates::prelude::*;
use rstest::rstest;
use tracing_subscriber::fmt::MakeWriter;

const FULL: &str = r#"
listen: 127.0.0.1
port: 6000
retry_count: 3
retry_delay: 2
threads: 2
initialise: false
logging:
  format: json
  level: warn
repos:
  - url: git@github.com:acme/site.git
    path: /site
    directory: /srv/site
    label: v1.2.0
    labelType: tag
    remote: upstream
    secret: hunter2
    sshPrivKey: /home/deploy/.ssh/id_ed25519
    sshPassPhrase: correct-horse
    trigger: /srv/site.trigger
  - url: git@github.com:acme/docs.git
    path: /docs/
    directory: /srv/docs
"#;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_file_returns_io_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    let err = config::load_at(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(predicate::str::contains("config.yaml").eval(&err.to_string()));
}

#[rstest]
#[case::repos_not_a_list("repos: 42\n")]
#[case::retry_count_not_a_number("retry_count: many\n")]
#[case::top_level_list("- listen\n- port\n")]
fn load_wrong_shape_returns_parse_error(#[case] yaml: &str) {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(yaml).expect("write");
    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn not_found_lists_searched_paths() {
    let err = ConfigError::NotFound {
        searched: vec![PathBuf::from("/etc/gitmirror/config.yaml"), PathBuf::from("config.yaml")],
    };
    let msg = err.to_string();
    assert!(msg.contains("/etc/gitmirror/config.yaml"));
    assert!(msg.contains(", config.yaml"));
}

// ---------------------------------------------------------------------------
// 2. Full document
// ---------------------------------------------------------------------------

#[test]
fn full_document_round_trips_every_field() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(FULL).expect("write");

    let cfg = config::load_at(file.path()).expect("load");
    assert_eq!(cfg.bind_address(), "127.0.0.1:6000");
    assert_eq!(cfg.retry_count, 3);
    assert_eq!(cfg.retry_delay, Duration::from_secs(2));
    assert_eq!(cfg.threads, 2);
    assert!(!cfg.initialise);
    assert_eq!(cfg.logging.format, LogFormat::Json);

    let site = cfg.repos.find("/site").expect("site routed");
    assert_eq!(site.name(), "acme/site");
    assert_eq!(site.label_kind, LabelKind::Tag);
    assert_eq!(site.remote, "upstream");
    assert_eq!(site.secret, "hunter2");
    assert_eq!(
        site.ssh_private_key.as_deref(),
        Some(std::path::Path::new("/home/deploy/.ssh/id_ed25519"))
    );
    assert_eq!(site.ssh_passphrase.as_deref(), Some("correct-horse"));
    assert_eq!(
        site.trigger.as_deref(),
        Some(std::path::Path::new("/srv/site.trigger"))
    );

    let docs = cfg.repos.find("/docs").expect("docs routed without trailing slash");
    assert_eq!(docs.label, "master");
    assert_eq!(docs.remote, "origin");
}

// ---------------------------------------------------------------------------
// 3. Reload semantics
// ---------------------------------------------------------------------------

#[test]
fn omitted_fields_revert_to_defaults_on_reload() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(FULL).expect("write");
    let first = config::load_at(file.path()).expect("first load");
    assert_eq!(first.threads, 2);

    file.write_str("repos:\n  - url: git@github.com:acme/site.git\n    path: /site\n    directory: /srv/site\n")
        .expect("rewrite");
    let second = config::load_at(file.path()).expect("second load");

    assert_eq!(second.threads, 5);
    assert_eq!(second.retry_count, 1);
    assert_eq!(second.port, 5555);
    assert!(second.initialise);
    let site = second.repos.find("/site").expect("site");
    assert_eq!(site.label_kind, LabelKind::Branch);
    assert_eq!(site.label, "master");
    assert!(site.trigger.is_none());
    assert!(!site.has_secret());
}

#[test]
fn duplicate_paths_route_to_first_occurrence() {
    let yaml = r#"
repos:
  - url: first
    path: /dup
    directory: /srv/first
  - url: second
    path: /dup
    directory: /srv/second
  - url: third
    path: /dup/
    directory: /srv/third
"#;
    let raw = config::parse(yaml).expect("parse");
    let logs = LogCapture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    let cfg = tracing::subscriber::with_default(subscriber, || config::build(raw));

    assert_eq!(cfg.repos.find("/dup").expect("routed").url, "first");
    assert_eq!(cfg.repos.len(), 3, "duplicates are kept in the list");
    let output = logs.contents();
    let warnings: Vec<&str> = output
        .lines()
        .filter(|line| line.contains("WARN") && line.contains("same path"))
        .collect();
    assert_eq!(warnings.len(), 2, "one warning per duplicate: {output}");
    assert!(warnings.iter().all(|line| line.contains("/dup")));
}

/// In-memory log sink for asserting on emitted warnings.
#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
