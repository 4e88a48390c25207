//! Lumen CLI: operator commands for the ingestion pipeline.
//!
//! Configuration comes from the environment (and `.env`), the same variables the
//! service uses: STORAGE_BACKEND, S3_BUCKET, S3_REGION, LOCAL_STORAGE_PATH, ...

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lumen_core::models::{FinalizeUploadRequest, PresignedUploadRequest};
use lumen_core::IngestConfig;
use lumen_infra::init_telemetry;
use lumen_processing::{FfmpegTranscoder, VariantGenerator};
use lumen_services::{
    AssetJanitor, IngestService, JsonlCatalog, LogNotifier, OrphanSweeper, StagingArea,
    UploadPipeline,
};
use lumen_storage::{create_storage, AssetBase, Storage};
use lumen_worker::{IngestQueue, IngestQueueConfig};
use serde::Serialize;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "lumen", about = "Lumen media ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a pre-signed staging upload URL
    Presign {
        /// Owner UUID
        #[arg(long)]
        owner: Uuid,
        /// Original filename (its extension picks the staging key extension)
        #[arg(long)]
        filename: String,
        /// Content type the client will upload with
        #[arg(long)]
        content_type: String,
    },
    /// Finalize staged uploads and run them through the pipeline
    Ingest {
        /// Staging keys, each named `{upload_id}.{ext}` under the staging prefix
        #[arg(required = true)]
        staging_keys: Vec<String>,
        /// Owner UUID
        #[arg(long)]
        owner: Uuid,
        /// Catalog file (JSON lines) to append records to
        #[arg(long, default_value = "catalog.jsonl")]
        catalog: PathBuf,
        /// Publish without moderation
        #[arg(long)]
        privileged: bool,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Comma-separated tags
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// Run one orphan sweep pass over the staging prefix
    Sweep {
        /// Keep sweeping on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Delete every stored rendition of an asset
    Purge {
        /// Asset base, e.g. media/{owner_id}/{upload_id}
        base: String,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Upload id encoded in a staging key's file name
fn upload_id_from_key(staging_key: &str) -> anyhow::Result<Uuid> {
    let name = staging_key.rsplit('/').next().unwrap_or(staging_key);
    let stem = name.split_once('.').map_or(name, |(stem, _)| stem);
    Uuid::parse_str(stem).with_context(|| {
        format!("Staging key {} is not named after an upload id", staging_key)
    })
}

async fn wait_until_idle(queue: &IngestQueue) {
    loop {
        let stats = queue.stats();
        if stats.queued == 0 && stats.active == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[derive(Serialize)]
struct IngestSummary {
    submitted: usize,
    rejected: Vec<String>,
    published: usize,
}

#[allow(clippy::too_many_arguments)]
async fn ingest(
    config: &IngestConfig,
    storage: Arc<dyn Storage>,
    staging_keys: Vec<String>,
    owner: Uuid,
    catalog_path: PathBuf,
    privileged: bool,
    title: Option<String>,
    category: Option<String>,
    tags: Vec<String>,
) -> anyhow::Result<()> {
    let transcoder =
        FfmpegTranscoder::from_config(config).context("Invalid transcoder configuration")?;
    let generator = VariantGenerator::from_config(config, Arc::new(transcoder));
    let catalog = Arc::new(JsonlCatalog::new(catalog_path));
    let before = catalog.load_all().await?.len();

    let pipeline = Arc::new(UploadPipeline::new(
        storage.clone(),
        catalog.clone(),
        Arc::new(LogNotifier),
        generator,
    ));
    let queue = IngestQueue::new(IngestQueueConfig::from(config), pipeline);
    let service = IngestService::from_config(config, storage, queue.clone());

    let mut summary = IngestSummary {
        submitted: 0,
        rejected: Vec::new(),
        published: 0,
    };

    for staging_key in staging_keys {
        let upload_id = match upload_id_from_key(&staging_key) {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "Skipping staging key");
                summary.rejected.push(staging_key);
                continue;
            }
        };
        let request = FinalizeUploadRequest {
            staging_key: staging_key.clone(),
            upload_id,
            owner_id: owner,
            is_privileged: privileged,
            title: title.clone(),
            category: category.clone(),
            location: None,
            camera_model: None,
            coordinates: None,
            tags: tags.clone(),
            content_type: None,
        };
        match service.finalize(request).await {
            Ok(outcome) if outcome.accepted => summary.submitted += 1,
            Ok(_) => summary.rejected.push(staging_key),
            Err(e) => {
                tracing::error!(error = %e, staging_key = %staging_key, "Finalize rejected");
                summary.rejected.push(staging_key);
            }
        }
    }

    wait_until_idle(&queue).await;
    queue.shutdown().await;

    summary.published = catalog.load_all().await?.len().saturating_sub(before);
    print_json(&summary)?;

    if summary.published < summary.submitted || !summary.rejected.is_empty() {
        anyhow::bail!(
            "{} of {} uploads failed",
            summary.submitted - summary.published + summary.rejected.len(),
            summary.submitted + summary.rejected.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = IngestConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    init_telemetry(config.log_format).context("Failed to initialize tracing")?;

    let storage = create_storage(&config)
        .await
        .context("Failed to initialize storage")?;

    match cli.command {
        Commands::Presign {
            owner,
            filename,
            content_type,
        } => {
            let response = StagingArea::from_config(&config, storage)
                .presign_upload(PresignedUploadRequest {
                    owner_id: owner,
                    filename,
                    content_type,
                })
                .await?;
            print_json(&response)?;
        }
        Commands::Ingest {
            staging_keys,
            owner,
            catalog,
            privileged,
            title,
            category,
            tags,
        } => {
            ingest(
                &config,
                storage,
                staging_keys,
                owner,
                catalog,
                privileged,
                title,
                category,
                tags,
            )
            .await?;
        }
        Commands::Sweep { watch: false } => {
            let sweeper = OrphanSweeper::from_config(&config, storage);
            let report = sweeper.sweep_once().await?;
            print_json(&report)?;
        }
        Commands::Sweep { watch: true } => {
            let handle = Arc::new(OrphanSweeper::from_config(&config, storage)).start();
            tracing::info!(
                interval_secs = config.orphan_sweep_interval.as_secs(),
                "Orphan sweeper running, press Ctrl-C to stop"
            );
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            handle.abort();
        }
        Commands::Purge { base } => {
            let base = AssetBase::parse(&base)?;
            let report = AssetJanitor::new(storage).purge(&base).await;
            print_json(&report)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_id_is_read_from_the_key_name() {
        let id = Uuid::new_v4();
        assert_eq!(
            upload_id_from_key(&format!("uploads/{}.gif", id)).unwrap(),
            id
        );
        assert!(upload_id_from_key("uploads/holiday.gif").is_err());
    }

    #[test]
    fn cli_parses_ingest_tags() {
        let id = Uuid::new_v4();
        let cli = Cli::try_parse_from([
            "lumen",
            "ingest",
            "uploads/a.png",
            "--owner",
            &id.to_string(),
            "--tags",
            "red,blue",
        ])
        .unwrap();
        match cli.command {
            Commands::Ingest { tags, owner, .. } => {
                assert_eq!(tags, vec!["red", "blue"]);
                assert_eq!(owner, id);
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn cli_parses_sweep_watch_flag() {
        let once = Cli::try_parse_from(["lumen", "sweep"]).unwrap();
        assert!(matches!(once.command, Commands::Sweep { watch: false }));

        let watch = Cli::try_parse_from(["lumen", "sweep", "--watch"]).unwrap();
        assert!(matches!(watch.command, Commands::Sweep { watch: true }));
    }
}
