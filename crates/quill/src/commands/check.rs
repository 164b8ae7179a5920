//! `quill check` command implementation.

use std::path::PathBuf;

use clap::Args;
use quill_config::Config;
use quill_render::{CollectingSink, Registry, Severity};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the check command.
#[derive(Args)]
pub(crate) struct CheckArgs {
    /// Path to configuration file (default: auto-discover quill.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl CheckArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();
        let config = Config::load(self.config.as_deref(), None)?;

        match &config.config_path {
            Some(path) => output.info(&format!("Checking {}", path.display())),
            None => output.info("No quill.toml found, checking defaults"),
        }

        let sink = CollectingSink::new();
        let registry = Registry::build(&config.environments, &sink);
        let problems = sink.problems();
        for problem in &problems {
            output.problem(problem);
        }

        let errors = problems
            .iter()
            .filter(|p| p.severity == Severity::Error)
            .count();
        let environments = registry.environments().count();
        if errors > 0 {
            return Err(CliError::Validation(format!(
                "{errors} configuration error(s), {environments} environment(s) usable"
            )));
        }

        output.success(&format!(
            "Configuration OK: {environments} environment(s), {} warning(s)",
            problems.len()
        ));
        Ok(())
    }
}
