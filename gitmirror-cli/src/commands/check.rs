//! `gitmirror check`: validate a configuration file without starting anything.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use gitmirror_core::{config, Config, LogOutput, RepositoryConfig};

#[derive(Args, Debug, Default)]
pub struct CheckArgs {}

impl CheckArgs {
    pub fn run(self, explicit: Option<&Path>) -> Result<()> {
        let path = config::locate(explicit).context("could not locate configuration")?;
        let config = config::load_at(&path).context("invalid configuration")?;

        println!("{} {}", "config:".bold(), path.display());
        print_settings(&config);
        println!();
        print_repos(&config);

        let duplicates = config.repos.duplicate_paths();
        for dup in &duplicates {
            println!(
                "{} multiple repos use path {dup}; only the first is routed",
                "warning:".yellow().bold()
            );
        }
        if duplicates.is_empty() {
            println!("{}", "configuration OK".green());
        }
        Ok(())
    }
}

fn print_settings(config: &Config) {
    let output = match &config.logging.output {
        LogOutput::Stdout => "stdout".to_string(),
        LogOutput::File(path) => path.display().to_string(),
    };
    println!("  listen:      {}", config.bind_address());
    println!("  threads:     {}", config.threads);
    println!(
        "  retries:     {} (delay {}s)",
        config.retry_count,
        config.retry_delay.as_secs()
    );
    println!("  initialise:  {}", config.initialise);
    println!(
        "  logging:     {:?} {} to {output}",
        config.logging.format, config.logging.level
    );
}

fn print_repos(config: &Config) {
    if config.repos.is_empty() {
        println!("{}", "no repos configured".yellow());
        return;
    }
    println!("{} ({})", "repos".bold(), config.repos.len());
    for repo in config.repositories() {
        print_repo(repo);
    }
}

fn print_repo(repo: &RepositoryConfig) {
    let checkout = if repo.directory.exists() {
        "present".green()
    } else {
        "missing".yellow()
    };
    println!("  {} {}", repo.path.bold(), repo.name());
    println!("      url:       {}", repo.url);
    println!("      tracks:    {} {} on {}", repo.label_kind, repo.label, repo.remote);
    println!("      directory: {} ({checkout})", repo.directory.display());
    if let Some(trigger) = &repo.trigger {
        println!("      trigger:   {}", trigger.display());
    }
    let auth = match &repo.ssh_private_key {
        Some(key) => key.display().to_string(),
        None => "ssh-agent".to_string(),
    };
    println!("      auth:      {auth}");
    println!(
        "      signature: {}",
        if repo.has_secret() { "verified" } else { "not checked" }
    );
}
