use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nova_bsp_model::{BuildTargetId, ProjectDetails, TargetSnapshot};
use nova_config::{ConfigDiagnostics, NovaConfig};
use nova_project_sync::{
    InMemoryModelStore, LoadRequest, ModuleGraph, PlanEntry, ReconciliationEngine, SyncOutcome,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "nova-sync",
    version,
    about = "Nova BSP project sync (offline planning from recorded snapshots)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the apply plan for a recorded BSP snapshot
    Plan(PlanArgs),
    /// Print the JSON schema of `nova.toml`
    Schema,
}

#[derive(Args)]
struct PlanArgs {
    /// JSON file holding the recorded BSP responses (`targets`, `sources`, `javacOptions`, ...)
    #[arg(long)]
    snapshot: PathBuf,
    /// Module graph written by an earlier `--write-graph`; the plan is computed against it
    #[arg(long)]
    previous: Option<PathBuf>,
    /// Target id to load (repeatable)
    #[arg(long = "load", value_name = "TARGET")]
    load: Vec<String>,
    /// Target id to unload (repeatable)
    #[arg(long = "unload", value_name = "TARGET")]
    unload: Vec<String>,
    /// Config file (defaults to discovery from the workspace root)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Workspace root used for config discovery and project naming
    #[arg(long, default_value = ".")]
    workspace: PathBuf,
    /// Write the resulting module graph to this file
    #[arg(long)]
    write_graph: Option<PathBuf>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    plan: &'a [PlanEntry],
    warnings: Vec<String>,
    modules: usize,
    libraries: usize,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Plan(args) => plan(args),
        Command::Schema => {
            let schema = nova_config::json_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(0)
        }
    }
}

fn plan(args: PlanArgs) -> Result<i32> {
    let workspace_root = std::fs::canonicalize(&args.workspace).unwrap_or(args.workspace.clone());
    let mut config = load_config(args.config.as_deref(), &workspace_root)?;
    nova_config::init_tracing(&config.logging);
    config.sync.project_name = Some(config.project_name_for(&workspace_root));

    let details: ProjectDetails = read_json(&args.snapshot)?;
    let snapshot = TargetSnapshot::from_project_details(details);

    let mut engine = ReconciliationEngine::from_config(config.sync);
    let mut store = match args.previous.as_deref() {
        Some(path) => {
            let previous: ModuleGraph = read_json(path)?;
            engine = engine.with_previous_graph(previous.clone());
            InMemoryModelStore::from_graph(previous)
        }
        None => InMemoryModelStore::new(),
    };

    let request = LoadRequest {
        load: args.load.into_iter().map(BuildTargetId::from).collect(),
        unload: args.unload.into_iter().map(BuildTargetId::from).collect(),
    };
    let outcome = engine
        .reconcile(Some(&snapshot), &request, &mut store)
        .context("failed to compute sync plan")?;

    tracing::debug!(
        target: "nova.sync.cli",
        targets = snapshot.len(),
        entries = outcome.plan.len(),
        "planned snapshot"
    );

    if let Some(path) = args.write_graph.as_deref() {
        let text = serde_json::to_string_pretty(store.graph())?;
        std::fs::write(path, text)
            .with_context(|| format!("failed to write module graph to {}", path.display()))?;
    }

    print_outcome(&outcome, store.graph(), args.json)?;
    Ok(0)
}

fn load_config(path: Option<&Path>, workspace_root: &Path) -> Result<NovaConfig> {
    let (config, diagnostics) = match path {
        Some(path) => NovaConfig::load_from_path_with_diagnostics(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let (config, _, diagnostics) =
                nova_config::load_for_workspace_with_diagnostics(workspace_root)
                    .context("failed to load workspace config")?;
            (config, diagnostics)
        }
    };
    report_config_diagnostics(&diagnostics)?;
    Ok(config)
}

fn report_config_diagnostics(diagnostics: &ConfigDiagnostics) -> Result<()> {
    for key in &diagnostics.unknown_keys {
        eprintln!("warning: unknown config key `{key}`");
    }
    for warning in &diagnostics.warnings {
        eprintln!("warning: {warning}");
    }
    if !diagnostics.is_ok() {
        let errors: Vec<String> = diagnostics.errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("invalid config: {}", errors.join("; "));
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_outcome(outcome: &SyncOutcome, graph: &ModuleGraph, json: bool) -> Result<()> {
    let warnings: Vec<String> = outcome.warnings.iter().map(ToString::to_string).collect();
    if json {
        let report = PlanReport {
            plan: outcome.plan.entries(),
            warnings,
            modules: graph.module_count(),
            libraries: graph.library_count(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for warning in &warnings {
        println!("warning: {warning}");
    }
    if outcome.plan.is_empty() {
        println!("no changes");
        return Ok(());
    }
    for entry in outcome.plan.entries() {
        println!("{} {}", entry.op_name(), entry.entity_name());
    }
    println!(
        "{} change(s); {} module(s), {} library(ies)",
        outcome.plan.len(),
        graph.module_count(),
        graph.library_count()
    );
    Ok(())
}
