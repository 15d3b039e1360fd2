//! Parser Forge CLI
//!
//! The `parser-forge` command synthesizes, runs and validates document
//! parsers for named targets.
//!
//! ## Commands
//!
//! - `run`: full self-correcting loop, generating the parser if needed
//! - `exec`: run an already stored parser, no generation
//! - `list`: show stored parsers
//!
//! ## Exit codes
//!
//! `0` passed, `3` failed after retries, `4` generation failed, `1` error.

mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use forge_artifact::{ArtifactStore, FsArtifactStore, Table, Target};
use forge_codegen::{is_stub, GeminiGenerator, StubArtifact};
use forge_core::{execute_stored, ForgeConfig, Orchestrator, RunRequest, RunResult};
use forge_runtime::{
    load_reference, save_table, write_table, ArtifactRegistry, ExecutionOutcome, Executor,
    PythonLoader,
};
use tracing::{info, warn, Level};

const DEFAULT_CONFIG_FILE: &str = "forge.toml";
const PREVIEW_ROWS: usize = 5;

#[derive(Parser)]
#[command(name = "parser-forge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Synthesize and validate document parsers on demand", long_about = None)]
struct Cli {
    /// Configuration file (default: ./forge.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the artifact directory
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Produce a validated table for a target, generating its parser if needed
    Run {
        /// Target identifier (e.g. icici, sbi)
        #[arg(short, long)]
        target: String,

        /// Input document
        #[arg(short, long)]
        input: PathBuf,

        /// Reference CSV the output must match
        #[arg(short, long)]
        expected: Option<PathBuf>,

        /// Write the resulting table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ignore the stored parser and generate a new one
        #[arg(long)]
        force_regenerate: bool,

        /// Lower the attempt limit (1 to 3)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Print the run report as JSON instead of a preview
        #[arg(long)]
        report_json: bool,
    },

    /// Run a stored parser without generation or validation
    Exec {
        /// Target identifier
        #[arg(short, long)]
        target: String,

        /// Input document
        #[arg(short, long)]
        input: PathBuf,

        /// Write the resulting table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored parsers
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // credentials usually live in .env next to the data
    let _ = dotenvy::dotenv();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.log_json, level);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = cli.store_dir {
        config = config.with_store_dir(dir);
    }

    match cli.command {
        Commands::Run {
            target,
            input,
            expected,
            output,
            force_regenerate,
            max_attempts,
            report_json,
        } => {
            if let Some(max) = max_attempts {
                config = config.with_max_attempts(max);
            }
            let target = Target::new(&target)?;
            let mut request = RunRequest::new(target, input).with_force_regenerate(force_regenerate);
            if let Some(path) = expected {
                let reference = load_reference(&path)
                    .with_context(|| format!("loading reference {}", path.display()))?;
                request = request.with_expected(reference);
            }
            cmd_run(config, request, output.as_deref(), report_json).await
        }
        Commands::Exec {
            target,
            input,
            output,
        } => cmd_exec(&config, &Target::new(&target)?, &input, output.as_deref()).await,
        Commands::List => cmd_list(&config),
    }
}

fn load_config(path: Option<&Path>) -> Result<ForgeConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
        None => return Ok(ForgeConfig::default()),
    };
    let config = ForgeConfig::from_toml_file(path)?;
    info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

async fn cmd_run(
    config: ForgeConfig,
    request: RunRequest,
    output: Option<&Path>,
    report_json: bool,
) -> Result<ExitCode> {
    let api_key = config.api_key_from_env();
    if api_key.is_none() {
        warn!(
            variable = %config.generation.api_key_env,
            "no API key set, generation will fall back to the stub"
        );
    }
    let generator = GeminiGenerator::new(config.gemini_settings(api_key))?;
    let orchestrator = Orchestrator::with_defaults(config, Arc::new(generator))?;

    let report = orchestrator.run_with_deadline(request).await?;

    if let (Some(path), Some(table)) = (output, report.table.as_ref()) {
        save_table(table, path)?;
        println!("Parsed table saved to {}", path.display());
    }

    if report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {} after {} attempt(s), {} generation call(s)",
            report.target, report.result, report.attempts, report.generation_calls
        );
        for diagnostic in report.result.diagnostics() {
            println!("  {diagnostic}");
        }
        if output.is_none() {
            if let Some(table) = &report.table {
                print_preview(table)?;
            }
        }
    }

    Ok(match report.result {
        RunResult::Passed => ExitCode::SUCCESS,
        RunResult::FailedAfterRetries(_) => ExitCode::from(3),
        RunResult::GenerationFailed(_) => ExitCode::from(4),
    })
}

async fn cmd_exec(
    config: &ForgeConfig,
    target: &Target,
    input: &Path,
    output: Option<&Path>,
) -> Result<ExitCode> {
    config.validate()?;
    let store = FsArtifactStore::new(&config.store_dir);
    let contract = config.contract();
    let registry = ArtifactRegistry::new(Arc::new(PythonLoader::new(
        config.interpreter.clone(),
        contract.clone(),
    )));
    let warmup = registry.warm_from(&store, &StubArtifact::for_contract(&contract))?;
    for (failed, reason) in &warmup.failed {
        warn!(target = %failed, reason = %reason, "stored parser not loaded");
    }

    if registry.lookup(target).is_err() {
        let available: Vec<String> = registry.targets().iter().map(ToString::to_string).collect();
        bail!(
            "unsupported target '{target}'. Available: [{}]",
            available.join(", ")
        );
    }

    let mut executor = Executor::new(config.execution_timeout());
    if config.enforce_columns {
        executor = executor.with_required_columns(contract.columns);
    }

    match execute_stored(&registry, &executor, target, input).await? {
        ExecutionOutcome::Success(table) => {
            match output {
                Some(path) => {
                    save_table(&table, path)?;
                    println!("Parsed table saved to {}", path.display());
                }
                None => print_preview(&table)?,
            }
            Ok(ExitCode::SUCCESS)
        }
        ExecutionOutcome::Failure(reason) => bail!("execution failed: {reason}"),
    }
}

fn cmd_list(config: &ForgeConfig) -> Result<ExitCode> {
    let store = FsArtifactStore::new(&config.store_dir);
    let targets = store.list()?;
    if targets.is_empty() {
        println!("No parsers stored in {}", store.root().display());
        return Ok(ExitCode::SUCCESS);
    }
    for target in targets {
        let source = store.load(&target)?;
        let marker = if is_stub(source.text()) { " (stub)" } else { "" };
        println!(
            "{target:<16} {}  {}{marker}",
            source.digest().short(),
            store.locate(&target)
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn print_preview(table: &Table) -> Result<()> {
    let head = Table {
        columns: table.columns.clone(),
        rows: table.rows.iter().take(PREVIEW_ROWS).cloned().collect(),
    };
    println!("Parsed table preview ({} of {} rows):", head.row_count(), table.row_count());
    write_table(&head, std::io::stdout().lock())?;
    Ok(())
}
