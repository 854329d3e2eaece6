//! `gitmirror run`: foreground daemon.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use gitmirror_core::config;

#[derive(Args, Debug, Default)]
pub struct RunArgs {}

impl RunArgs {
    pub fn run(self, explicit: Option<&Path>) -> Result<()> {
        let path = config::locate(explicit).context("could not locate configuration")?;
        gitmirror_daemon::start_blocking(&path).context("gitmirror exited with error")
    }
}
