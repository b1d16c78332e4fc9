use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use concord::format::{self, OutputFormat};
use concord::scenario::{self, Scenario};
use concord::telemetry;
use concord_core::{ConcordConfig, ConflictDetector, MergeEngine, Operation};

/// Multi-agent change consolidation
///
/// concord decides how concurrent edits from several editing agents (a
/// typist, an AI assistant, a formatter, ...) against the same document are
/// coordinated, which of them conflict, and how they combine into one
/// ordered change list.
///
/// QUICK START:
///
///   # Replay a captured session and see every decision
///   concord replay session.json
///
///   # Only classify conflicts among a set of operations
///   concord detect ops.json
///
///   # Only merge a set of operations
///   concord merge ops.json --format json
///
/// Diagnostics go to stderr; set CONCORD_LOG=json for JSON lines and
/// RUST_LOG=debug for per-pair decisions.
#[derive(Parser)]
#[command(name = "concord")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'concord <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Configuration file (TOML); defaults apply when absent
    #[arg(long, env = "CONCORD_CONFIG")]
    config: Option<PathBuf>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario through a consolidation manager
    ///
    /// The scenario is a JSON object with a `steps` array (submit, acquire,
    /// release, advance, tick, process, status) run against a manual clock.
    Replay {
        /// Scenario file
        scenario: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Classify conflicts among operations
    ///
    /// Reads a JSON array of operations and runs conflict detection only.
    Detect {
        /// Operations file
        operations: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Merge operations into one change list
    ///
    /// Reads a JSON array of operations and runs the merging engine only.
    Merge {
        /// Operations file
        operations: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file (TOML); defaults apply when absent
        #[arg(long, env = "CONCORD_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { scenario, common } => replay(&scenario, &common),
        Commands::Detect { operations, common } => detect(&operations, &common),
        Commands::Merge { operations, common } => merge(&operations, &common),
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ConcordConfig> {
    match path {
        Some(path) => ConcordConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display())),
        None => Ok(ConcordConfig::default()),
    }
}

fn load_operations(path: &Path) -> Result<Vec<Operation>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading operations {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing operations {}", path.display()))
}

fn replay(path: &Path, common: &CommonArgs) -> Result<()> {
    let config = load_config(common.config.as_deref())?;
    let scenario = Scenario::load(path)?;
    let report = scenario::replay(&scenario, config)
        .with_context(|| format!("replaying {}", path.display()))?;
    print!("{}", common.format.render(&report, format::report_text)?);
    Ok(())
}

fn detect(path: &Path, common: &CommonArgs) -> Result<()> {
    let config = load_config(common.config.as_deref())?;
    let ops = load_operations(path)?;
    let now = ops.iter().map(|o| o.timestamp).max().unwrap_or(0);
    let conflicts = ConflictDetector::new(config.detection).detect_conflicts(&ops, now);
    print!("{}", common.format.render(&conflicts, |c| format::conflicts_text(c))?);
    Ok(())
}

fn merge(path: &Path, common: &CommonArgs) -> Result<()> {
    let config = load_config(common.config.as_deref())?;
    let ops = load_operations(path)?;
    let result = MergeEngine::new(config.merge).merge_operations(&ops);
    print!("{}", common.format.render(&result, format::merge_text)?);
    Ok(())
}
