//! `quill cache` subcommand group.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use quill_config::Config;

use super::open_cache;
use crate::error::CliError;
use crate::output::Output;

/// Cache commands.
#[derive(Subcommand)]
pub(crate) enum CacheCommand {
    /// Delete compiled artifacts that no rendered document references.
    Clean(CleanArgs),
}

impl CacheCommand {
    /// Execute the cache subcommand.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        match self {
            Self::Clean(args) => args.execute(),
        }
    }
}

/// Arguments for the cache clean command.
#[derive(Args)]
pub(crate) struct CleanArgs {
    /// Path to configuration file (default: auto-discover quill.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl CleanArgs {
    fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.config.as_deref(), None)?;

        if !config.cache_resolved.enabled {
            output.warning("Cache is disabled, nothing to clean");
            return Ok(());
        }

        let cache = open_cache(&config);
        let removed = cache.purge();
        for key in &removed {
            output.info(&format!("  removed {key}"));
        }
        output.success(&format!("Removed {} artifact(s)", removed.len()));
        Ok(())
    }
}
