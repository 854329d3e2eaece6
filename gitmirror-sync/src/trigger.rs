//! Best-effort trigger file touch.
//!
//! Downstream automation watches the trigger file's mtime. A failure here is
//! logged and reported but never fails the sync that caused it.

use std::fs::OpenOptions;
use std::path::Path;

use filetime::{set_file_mtime, FileTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// No trigger configured for this repository.
    Skipped,
    Updated,
    Created,
    Failed,
}

/// Bump the trigger file's mtime, creating the file if it is missing.
pub fn touch(trigger: Option<&Path>) -> TriggerOutcome {
    let Some(path) = trigger else {
        return TriggerOutcome::Skipped;
    };

    match set_file_mtime(path, FileTime::now()) {
        Ok(()) => {
            tracing::info!(trigger = %path.display(), "updated trigger file");
            TriggerOutcome::Updated
        }
        Err(err) => {
            tracing::warn!(
                trigger = %path.display(),
                error = %err,
                "failed to update trigger file, attempting to create",
            );
            match create(path) {
                Ok(()) => {
                    tracing::info!(trigger = %path.display(), "created trigger file");
                    TriggerOutcome::Created
                }
                Err(err) => {
                    tracing::error!(
                        trigger = %path.display(),
                        error = %err,
                        "failed to create trigger file",
                    );
                    TriggerOutcome::Failed
                }
            }
        }
    }
}

#[cfg(unix)]
fn create(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o660)
        .open(path)
        .map(|_| ())
}

#[cfg(not(unix))]
fn create(path: &Path) -> std::io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map(|_| ())
}
