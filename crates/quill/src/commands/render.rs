//! `quill render` command implementation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use quill_cache::PathKeys;
use quill_compile::TexCompiler;
use quill_config::{CliSettings, Config};
use quill_render::{CollectingSink, DiagnosticSink, Pipeline, Registry};

use super::{open_cache, spacing_rules};
use crate::error::CliError;
use crate::output::Output;

/// Arguments for the render command.
#[derive(Args)]
pub(crate) struct RenderArgs {
    /// Markdown file to render.
    input: PathBuf,

    /// Write HTML to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover quill.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Do not read or write the persistent compilation cache.
    #[arg(long)]
    no_cache: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

impl RenderArgs {
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            cache_enabled: self.no_cache.then_some(false),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;
        let document = fs::read_to_string(&self.input)?;

        let sink = Arc::new(CollectingSink::new());
        let registry = Registry::build(&config.environments, sink.as_ref());
        let cache = Arc::new(open_cache(&config));
        let document_key = document_key(&config, &self.input);
        let spacing = spacing_rules(&config.components);
        let work_dir = config.cache_resolved.work_dir();

        let compiler = TexCompiler::new(Arc::clone(&cache), config.compile_resolved, work_dir);
        let pipeline = Pipeline::new(registry)
            .with_compiler(Arc::new(compiler))
            .with_spacing(spacing)
            .with_sink(Arc::clone(&sink) as Arc<dyn DiagnosticSink>);

        let rendered = pipeline.render(&document)?;
        tracing::info!(
            document = %document_key,
            components = rendered.compiled.len(),
            "Rendered document"
        );

        for problem in sink.problems() {
            output.problem(&problem);
        }

        let scheduled = cache.retain_document(
            &document_key,
            rendered.compiled.iter().map(|c| c.artifact.clone()),
        );
        if !scheduled.is_empty() {
            output.info(&format!(
                "{} compiled artifact(s) no longer used; run `quill cache clean` to delete them",
                scheduled.len()
            ));
        }

        match &self.output {
            Some(path) => {
                fs::write(path, &rendered.html)?;
                output.success(&format!(
                    "Rendered {} to {}",
                    self.input.display(),
                    path.display()
                ));
            }
            None => Output::document(&rendered.html)?,
        }
        Ok(())
    }
}

/// Cache key of the rendered document, relative to the project root.
///
/// The project root is the directory of the config file, or the current
/// directory when no config file was found.
fn document_key(config: &Config, input: &Path) -> String {
    let cwd = std::env::current_dir().unwrap_or_default();
    let root = config
        .config_path
        .as_deref()
        .and_then(Path::parent)
        .map_or_else(|| cwd.clone(), |dir| cwd.join(dir));
    PathKeys::new(root).keyify(&cwd.join(input))
}
