//! Run command implementation: the full bronze → silver → gold → index pipeline

use super::chunk::{cmd_chunk, ChunkStats};
use super::ingest::{cmd_ingest, IngestStats};
use super::parse::{cmd_parse, ParseStats};
use super::sync::{cmd_sync, SyncReport};
use crate::chunk::TokenCounter;
use crate::config::Config;
use crate::databricks::{validate_embedding_endpoint, ServingEndpoints, VectorIndexService};
use crate::error::Result;
use crate::tables::{RunCounts, RunStatus, TableStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Remote services used by the index step
pub struct RemoteServices<'a> {
    pub index: &'a dyn VectorIndexService,
    pub serving: &'a dyn ServingEndpoints,
}

/// Everything one pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub ingest: IngestStats,
    pub parse: ParseStats,
    pub chunk: ChunkStats,
    pub sync: Option<SyncReport>,
}

/// Run every stage in order; `remote = None` stops after the gold table
pub async fn cmd_run(
    config: &Config,
    store: &TableStore,
    counter: Arc<dyn TokenCounter>,
    remote: Option<RemoteServices<'_>>,
) -> Result<RunReport> {
    config.require_pipeline_inputs()?;

    if let Some(remote) = &remote {
        validate_embedding_endpoint(
            remote.serving,
            &config.embedding.endpoint_name,
            &config.embedding.task,
        )
        .await?;
    } else {
        warn!("Skipping vector index sync");
    }

    let source_root = config.source_root().display().to_string();
    let run = store.start_run(&source_root).await?;
    info!("Started pipeline run {}", run.id);

    let mut counts = RunCounts::default();
    let result = run_stages(config, store, counter, remote.as_ref(), &mut counts).await;

    match result {
        Ok((ingest, parse, chunk, sync)) => {
            store
                .complete_run(&run.id, RunStatus::Completed, &counts, None)
                .await?;
            Ok(RunReport {
                run_id: run.id,
                ingest,
                parse,
                chunk,
                sync,
            })
        }
        Err(e) => {
            store
                .complete_run(&run.id, RunStatus::Failed, &counts, Some(e.to_string()))
                .await?;
            Err(e)
        }
    }
}

async fn run_stages(
    config: &Config,
    store: &TableStore,
    counter: Arc<dyn TokenCounter>,
    remote: Option<&RemoteServices<'_>>,
    counts: &mut RunCounts,
) -> Result<(IngestStats, ParseStats, ChunkStats, Option<SyncReport>)> {
    let ingest = cmd_ingest(config, store).await?;
    counts.files_ingested = ingest.files_ingested;

    let parse = cmd_parse(config, store).await?;
    counts.docs_parsed = parse.docs_parsed;
    counts.parse_errors = parse.parse_errors;

    let chunk = cmd_chunk(config, store, counter).await?;
    counts.chunks_written = chunk.chunks_written;

    let sync = match remote {
        Some(remote) => {
            let report = cmd_sync(config, store, remote.index).await?;
            counts.index_action = Some(report.outcome.to_string());
            Some(report)
        }
        None => None,
    };

    Ok((ingest, parse, chunk, sync))
}

/// Print a full run report to console
pub fn print_run_report(report: &RunReport) {
    super::print_ingest_stats(&report.ingest);
    super::print_parse_stats(&report.parse);
    super::print_chunk_stats(&report.chunk);
    if let Some(sync) = &report.sync {
        super::print_sync_report(sync);
    }
    println!("\n✓ Run {} completed", report.run_id);
}
