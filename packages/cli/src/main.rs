//! `batch-convert`: run one batch over a bundle in object storage.
//!
//! Batch settings come from `BATCH_*` variables and storage from
//! `STORAGE_*`/`S3_*`; flags override the most common ones. The final
//! `BatchResult` is printed to stdout as JSON.

use std::process::ExitCode;
use std::sync::Arc;

use actors::{BatchOrchestrator, ConverterRegistry, JobEvent, JobRegistry, SourceKind, converter};
use batch_core::{BatchConfig, BatchError, ConfigError};
use clap::Parser;
use storage::{ObjectStoreArchive, StorageError};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "batch-convert", about = "Convert every file in a stored bundle")]
struct Args {
    /// Bundle key prefix in object storage.
    bundle: String,

    /// Maximum conversions in flight (overrides BATCH_MAX_CONCURRENCY).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Extension given to converted files (overrides BATCH_TARGET_EXTENSION).
    #[arg(long)]
    target_extension: Option<String>,

    /// Only convert files with these extensions (comma separated).
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("failed to render result: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CliError> {
    let config = apply_args(BatchConfig::from_env()?, &args);
    config.validate()?;

    let archive = Arc::new(ObjectStoreArchive::from_env().await?);
    let registry = Arc::new(JobRegistry::from_config(&config));
    let _eviction = registry.spawn_eviction(config.eviction_interval());
    follow_events(&registry);

    let orchestrator = BatchOrchestrator::new(Arc::clone(&registry), config);
    let (job_id, result) = orchestrator
        .run(&args.bundle, Arc::new(demo_converter()), archive.as_ref())
        .await?;

    tracing::info!(
        "Job {} converted {}/{} files ({}%)",
        job_id,
        result.processed_files,
        result.total_files,
        result.success_rate
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn apply_args(mut config: BatchConfig, args: &Args) -> BatchConfig {
    if let Some(concurrency) = args.concurrency {
        config = config.with_max_concurrency(concurrency);
    }
    if let Some(extension) = &args.target_extension {
        config = config.with_target_extension(extension.clone());
    }
    if !args.include.is_empty() {
        config = config.with_include_extensions(args.include.iter().cloned());
    }
    config
}

/// Log job events as they are published.
fn follow_events(registry: &JobRegistry) {
    let mut events = registry.broadcaster().subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event @ JobEvent::JobProgress { .. }) => {
                    tracing::debug!("{}", event.description())
                }
                Ok(event) => tracing::info!("{}", event.description()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Event follower skipped {} events", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Passthrough converter that stamps each output with its source kind.
fn demo_converter() -> ConverterRegistry {
    ConverterRegistry::new()
        .with_classifier(classify)
        .with_fallback(converter!(|item| {
            let kind = item.source_kind.unwrap_or_else(SourceKind::generic);
            Ok(format!("# source kind: {kind}\n{}", item.raw_content))
        }))
}

fn classify(content: &str) -> SourceKind {
    let lowered = content.to_ascii_lowercase();
    if lowered.contains("proc sql") || lowered.trim_start().starts_with("select") {
        SourceKind::new("sql")
    } else if lowered.contains("%macro") {
        SourceKind::new("macro")
    } else if lowered.contains("data ") {
        SourceKind::new("data_step")
    } else {
        SourceKind::generic()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use actors::{ConversionPort, WorkItem};

    #[test]
    fn flags_override_environment_config() {
        let args = Args::parse_from([
            "batch-convert",
            "uploads/b1",
            "--concurrency",
            "2",
            "--target-extension",
            "py",
            "--include",
            "sas,sql",
        ]);
        let config = apply_args(BatchConfig::default(), &args);

        assert_eq!(args.bundle, "uploads/b1");
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.target_extension, "py");
        assert!(config.includes_extension(Some("sql")));
        assert!(!config.includes_extension(Some("txt")));
    }

    #[test]
    fn classifier_recognises_common_shapes() {
        assert_eq!(classify("PROC SQL; quit;"), SourceKind::new("sql"));
        assert_eq!(classify("%macro m; %mend;"), SourceKind::new("macro"));
        assert_eq!(classify("data out; set in; run;"), SourceKind::new("data_step"));
        assert_eq!(classify("hello"), SourceKind::generic());
    }

    #[tokio::test]
    async fn demo_converter_passes_content_through() -> Result<(), Box<dyn std::error::Error>> {
        let converter = demo_converter();
        let item = WorkItem::new("a.sas", "data x;").with_source_kind(classify("data x;"));

        let output = converter.convert(&item).await?;
        assert_eq!(output, "# source kind: data_step\ndata x;");
        Ok(())
    }
}
