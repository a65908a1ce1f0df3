mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use cli::{Cli, Commands};
use groupapp_backup::core::metadata;
use groupapp_backup::core::storage::BackupStatusStore;
use groupapp_backup::core::{
    BackupOutcome, BackupWorker, DockerRegistry, FileStatusStore, HttpTransferClient, TaskWorker,
    WorkerRuntime,
};
use groupapp_backup::utils::{format_bytes, WorkerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let result = match cli.command {
        Commands::Run { task, timeout } => handle_run(cli.config.as_deref(), &task, timeout).await,
        Commands::Inspect { metadata: path } => handle_inspect(&path).await,
        Commands::Status { backup_id } => handle_status(cli.config.as_deref(), &backup_id).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<WorkerConfig> {
    match path {
        Some(path) => WorkerConfig::load_from(path),
        None => WorkerConfig::load(),
    }
}

async fn handle_run(config: Option<&Path>, task: &Path, timeout: Duration) -> Result<()> {
    let config = load_config(config)?;
    let raw = tokio::fs::read(task)
        .await
        .with_context(|| format!("Failed to read task descriptor {}", task.display()))?;

    let registry = DockerRegistry::connect()?;
    if !registry.check_docker().await {
        tracing::warn!("Docker daemon did not answer ping, image operations will fail");
    }

    // A single upload never outlives the task's own budget
    let transfer = HttpTransferClient::new(config.transfer_scheme.clone()).with_timeout(timeout);
    let store = Arc::new(FileStatusStore::new(config.status_dir.clone()));
    let runtime = WorkerRuntime {
        registry: Some(Arc::new(registry)),
        transfer: Arc::new(transfer),
        store: store.clone(),
        config,
    };

    let mut worker = BackupWorker::from_descriptor(&raw, &runtime)?;
    store.ensure(&worker.task().backup_id).await?;
    tracing::info!(worker = worker.name(), backup_id = %worker.task().backup_id, "task accepted");

    if let Err(e) = worker.run(timeout).await {
        worker.error_callback(&e).await;
        worker.stop();
        return Err(e.into());
    }
    worker.stop();

    if let Some(outcome) = worker.outcome() {
        print_outcome(outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &BackupOutcome) {
    println!("{} backup {}", "✓".green().bold(), outcome.backup_id.bold());
    println!("  {:<12} {}", "Metadata:", outcome.metadata_version);
    println!("  {:<12} {} ({})", "Archive:", outcome.location, outcome.location_kind);
    println!("  {:<12} {}", "Size:", format_bytes(outcome.size));
    for service in &outcome.services {
        println!(
            "  {:<12} {} version(s), {} lost, {} failed, {} data bundle(s)",
            service.service_id,
            service.transferred,
            service.lost,
            service.failed,
            service.volume_bundles.len()
        );
    }
    if outcome.plugins > 0 {
        println!("  {:<12} {}", "Plugins:", outcome.plugins);
    }
}

async fn handle_inspect(path: &Path) -> Result<()> {
    let blob = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let resolved = metadata::resolve(&blob)?;
    let snapshot = &resolved.snapshot;

    println!("Format: {}", resolved.version.to_string().cyan());
    println!("\n{:<36} {:<24} {:>9} {:>8}", "Service", "Alias", "Versions", "Volumes");
    println!("{}", "-".repeat(80));
    for service in &snapshot.services {
        println!(
            "{:<36} {:<24} {:>9} {:>8}",
            service.service_id,
            service.service.service_alias,
            service.versions.len(),
            service.volumes.len()
        );
    }
    println!(
        "\nPlugins: {}  Plugin build versions: {}",
        snapshot.plugins.len(),
        snapshot.plugin_build_versions.len()
    );
    Ok(())
}

async fn handle_status(config: Option<&Path>, backup_id: &str) -> Result<()> {
    let config = load_config(config)?;
    let store = FileStatusStore::new(config.status_dir);
    let record = store.get(backup_id).await?;

    let status = match record.status.as_str() {
        "success" => record.status.green(),
        "failed" => record.status.red(),
        _ => record.status.yellow(),
    };
    println!("Backup {}: {}", record.backup_id.bold(), status);
    println!("  Location: {} ({})", record.source_dir, record.source_type);
    println!("  Size:     {}", format_bytes(record.backup_size));
    if let Some(updated) = record.updated_at {
        println!("  Updated:  {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}
