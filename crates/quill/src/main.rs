//! Quill CLI - Markdown renderer with verbatim environments.
//!
//! Provides commands for:
//! - `render`: Render a Markdown file to HTML
//! - `check`: Validate the environment configuration
//! - `cache clean`: Delete compiled artifacts no document uses anymore

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CacheCommand, CheckArgs, RenderArgs};
use output::Output;

/// Quill - Markdown renderer with verbatim environments.
#[derive(Parser)]
#[command(name = "quill", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a Markdown file to HTML.
    Render(RenderArgs),
    /// Check the configuration and report every problem.
    Check(CheckArgs),
    /// Compilation cache maintenance.
    #[command(subcommand)]
    Cache(CacheCommand),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = matches!(&cli.command, Commands::Render(args) if args.verbose);

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Render(args) => args.execute(),
        Commands::Check(args) => args.execute(),
        Commands::Cache(cmd) => cmd.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
