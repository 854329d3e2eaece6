//! # gitmirror-sync
//!
//! The per-repository synchronization engine.
//!
//! A [`SyncWorker`] runs [`SyncJob`]s (Clone or Update) through a
//! [`git::GitBackend`], serialized per repository by the [`StatusTable`].

pub mod error;
pub mod git;
pub mod status;
pub mod trigger;
pub mod worker;

pub use error::SyncError;
pub use git::{FetchOutcome, Git2Backend, GitBackend, Mirror, SshAuth};
pub use status::{StatusTable, SyncGuard};
pub use trigger::TriggerOutcome;
pub use worker::{RetryPolicy, SyncJob, SyncOutcome, SyncWorker, Syncable};
