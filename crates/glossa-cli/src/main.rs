//! Glossa - code annotation scenario runner
//!
//! Replays scripted focus, scroll and pointer events against a headless DOM
//! with a mounted code annotation, printing every published state as JSON.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use glossa_core::AnnotationConfig;

mod scenario;

use scenario::Scenario;

/// Glossa - Code Annotation Tracker
#[derive(Parser)]
#[command(name = "glossa")]
#[command(about = "Replay code annotation scenarios against a headless DOM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Annotation config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file
    Replay {
        /// Scenario file (TOML)
        scenario: PathBuf,
    },

    /// Replay the built-in demo scenario
    Demo,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => AnnotationConfig::load(path)?,
        None => AnnotationConfig::default(),
    };

    let scenario = match &cli.command {
        Commands::Replay { scenario } => Scenario::load(scenario)?,
        Commands::Demo => Scenario::demo(),
    };

    let mut out = std::io::BufWriter::new(std::io::stdout().lock());
    let summary = scenario::replay(&scenario, config, &mut out).await?;
    out.flush()?;

    tracing::info!(
        steps = summary.steps,
        records = summary.records,
        rendered = summary.rendered,
        "Replay finished"
    );
    Ok(())
}
