use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use reconflow::prelude::*;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reconflow")]
#[command(about = "Dependency-ordered execution engine for reconnaissance workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose (debug-level) logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow file to completion
    Run {
        /// Path to the workflow YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Path to an engine config YAML file (default: in-memory state, ./data artifacts)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// User id recorded on the Run Record
        #[arg(short, long, default_value = "local")]
        user: String,

        /// Stream one JSON line per progress event on stdout
        #[arg(long)]
        events: bool,
    },

    /// Validate a workflow file without running it
    Validate {
        /// Path to the workflow YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List the built-in tool adapters this binary ships
    ListAdapters,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "reconflow=debug"
    } else {
        "reconflow=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            tracing::error!(error = %err, "reconflow failed");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run {
            file,
            config,
            user,
            events,
        } => run_workflow(file, config, &user, events).await,
        Commands::Validate { file } => validate(file).await,
        Commands::ListAdapters => list_adapters().await,
    }
}

fn load_definition(file: &PathBuf) -> anyhow::Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(file)?;
    Ok(serde_yaml::from_str(&content)?)
}

async fn run_workflow(
    file: PathBuf,
    config_path: Option<PathBuf>,
    user: &str,
    stream_events: bool,
) -> anyhow::Result<bool> {
    let definition = load_definition(&file)?;
    let config = match config_path {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };

    let driver = Driver::new(
        config.build_state_store(),
        ArtifactPersister::new(config.data_root_path()),
        AdapterRegistry::with_builtins(),
    );

    println!("Running workflow: {}\n", file.display());

    let (tx, mut rx) = mpsc::channel(256);
    let stop = Arc::new(AtomicBool::new(false));

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if stream_events {
                if let Ok(line) = serde_json::to_string(&event) {
                    println!("{line}");
                }
            } else {
                print_event(&event);
            }
        }
    });

    let outcome = driver.run(definition, user, tx, stop).await?;
    let _ = printer.await;

    println!("\n=== Run {} ===\n", outcome.run_id);
    println!("Status: {:?}", outcome.status);
    for (task_id, result) in &outcome.results {
        let marker = if result.status == TaskStatus::Completed {
            "✓"
        } else {
            "✗"
        };
        println!("  {marker} {task_id}: {:?}", result.status);
        for error in &result.errors {
            println!("      {error}");
        }
    }

    Ok(matches!(outcome.status, RunStatus::Completed | RunStatus::Partial))
}

fn print_event(event: &ProgressEvent) {
    match event.kind {
        EventKind::TaskStarted => {
            println!("  → {}", event.task_name.as_deref().unwrap_or("?"));
        }
        EventKind::TaskCompleted => {
            println!("  ✓ {}", event.task_name.as_deref().unwrap_or("?"));
        }
        EventKind::TaskFailed => {
            println!(
                "  ✗ {} ({})",
                event.task_name.as_deref().unwrap_or("?"),
                event.error.as_deref().unwrap_or("unknown error")
            );
        }
        EventKind::Progress | EventKind::RunCompleted => {}
    }
}

async fn validate(file: PathBuf) -> anyhow::Result<bool> {
    let definition = load_definition(&file)?;
    match load_workflow(definition) {
        Ok(workflow) => {
            println!("✓ {} is valid ({} tasks)", file.display(), workflow.tasks.len());
            Ok(true)
        }
        Err(err) => {
            println!("✗ {} is invalid: {err}", file.display());
            Ok(false)
        }
    }
}

async fn list_adapters() -> anyhow::Result<bool> {
    let registry = AdapterRegistry::with_builtins();
    println!("Built-in adapters:\n");
    for name in registry.names() {
        if let Some(adapter) = registry.get(&name) {
            let meta = adapter.metadata();
            println!(
                "  {:<10} category={:<12} executable={:<10} requires_root={}",
                meta.name, meta.category, meta.executable, meta.requires_root
            );
        }
    }
    Ok(true)
}
