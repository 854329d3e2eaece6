//! gitmirror core library: configuration model, loading and routing.
//!
//! - [`types`]: repository and configuration snapshot types
//! - [`config`]: YAML lookup, parsing and defaulting
//! - [`registry`]: ordered repository list with path lookup
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use error::ConfigError;
pub use registry::RepoRegistry;
pub use types::{
    Config, JobKind, LabelKind, LogFormat, LogLevel, LogOutput, LogSettings, RepositoryConfig,
};
