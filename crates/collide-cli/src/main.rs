//! Collide CLI - Replay edit scenarios against the conflict engine
//!
//! Feeds scripted concurrent edits through the engine and reports the
//! conflicts, resolutions, and audit trail they produce.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use collide_core::{EngineConfig, FieldTier};
use thiserror::Error;

mod scenario;

use scenario::Scenario;

#[derive(Parser)]
#[command(name = "collide")]
#[command(about = "Field-level edit conflict detection for shared records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file against a fresh engine
    Run {
        /// Path to the scenario JSON file
        scenario: PathBuf,
        /// Optional engine configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
        /// Output the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how a field would be classified under a configuration
    Explain {
        /// Table name
        table: String,
        /// Field name
        field: String,
        /// Optional engine configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] collide_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown resolution strategy: {0}")]
    UnknownStrategy(String),
    #[error("No pending conflict on {0}")]
    NoPendingConflict(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("collide=info".parse().unwrap()),
        )
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            config,
            json,
        } => run_scenario(&scenario, config.as_deref(), json).await?,
        Commands::Explain {
            table,
            field,
            config,
        } => run_explain(&table, &field, config.as_deref())?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, CliError> {
    let config = match path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

async fn run_scenario(path: &Path, config_path: Option<&Path>, json: bool) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let scenario: Scenario = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let report = scenario::run(&scenario, config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for step in &report.steps {
        println!("{}", scenario::describe(step));
    }
    println!(
        "open conflicts: {}, resolved: {}, discarded: {}",
        report.open_conflicts.len(),
        report.resolved_count(),
        report.discarded_count(),
    );
    for conflict in &report.open_conflicts {
        println!(
            "  pending {} on {} (severity {}, {} intents)",
            conflict.id,
            conflict.key,
            conflict.severity,
            conflict.intents.len(),
        );
    }

    Ok(())
}

fn run_explain(table: &str, field: &str, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let tier = config.field_tiers.tier_of(table, field);

    let tier_label = match tier {
        FieldTier::Low => "low",
        FieldTier::Medium => "medium",
        FieldTier::High => "high",
    };
    println!("{table}.{field}: tier {tier_label}");
    match tier {
        FieldTier::Low => {
            println!("  divergent edits classify low when values are near-identical or");
            println!("  mergeable text; low conflicts auto-resolve to the newest value.");
        }
        FieldTier::Medium => {
            println!("  divergent edits classify medium by default; medium conflicts");
            println!("  auto-resolve via merge, pending review for non-text values.");
        }
        FieldTier::High => {
            println!("  divergent edits classify high (critical when editors started");
            println!("  from different baselines) and always wait for a human decision.");
        }
    }

    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }

    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "collide", buffer);
}
