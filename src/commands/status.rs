//! Status command implementation

use crate::config::Config;
use crate::databricks::{IndexStatus, VectorIndexService};
use crate::error::Result;
use crate::tables::{ChunkChange, PipelineRun, TableKind, TableStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// State of one pipeline table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableStatus {
    pub name: String,
    pub kind: TableKind,
    pub version: Option<i64>,
    pub rows: i64,
    pub change_feed: bool,
    pub url: String,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub source_root: String,
    pub tables: Vec<TableStatus>,
    pub index_name: String,
    pub endpoint_name: String,
    pub endpoint_state: Option<String>,
    pub index: Option<IndexStatus>,
    pub index_error: Option<String>,
    pub last_run: Option<PipelineRun>,
}

/// Get pipeline status; the index is only queried when a client is given
pub async fn cmd_status(
    config: &Config,
    store: &TableStore,
    index: Option<&dyn VectorIndexService>,
) -> Result<StatusInfo> {
    info!("Getting status");
    let names = config.table_names();

    let mut tables = Vec::with_capacity(3);
    for (name, kind) in [
        (&names.bronze, TableKind::Bronze),
        (&names.silver, TableKind::Silver),
        (&names.gold, TableKind::Gold),
    ] {
        let registry = store.table_info(name).await?;
        tables.push(TableStatus {
            name: name.clone(),
            kind,
            version: registry.as_ref().map(|t| t.version),
            rows: store.row_count(name, kind).await?,
            change_feed: registry.map(|t| t.change_feed).unwrap_or(false),
            url: config.table_url(name),
        });
    }

    let (index_status, index_error) = match index {
        Some(service) => match service.get_index(&names.index).await {
            Ok(status) => (Some(status), None),
            Err(e) => {
                debug!("Index status error: {:?}", e);
                (None, Some(e.to_string()))
            }
        },
        None => (None, None),
    };

    let endpoint_name = config.vector_search.endpoint_name.clone();
    let endpoint_state = match index {
        Some(service) => match service.list_endpoints().await {
            Ok(endpoints) => endpoints
                .into_iter()
                .find(|e| e.name == endpoint_name)
                .map(|e| e.state.unwrap_or_else(|| "UNKNOWN".to_string())),
            Err(e) => {
                debug!("Endpoint list error: {:?}", e);
                None
            }
        },
        None => None,
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        source_root: config.source_root().display().to_string(),
        tables,
        index_name: names.index,
        endpoint_name,
        endpoint_state,
        index: index_status,
        index_error,
        last_run: store.latest_run().await?,
    })
}

/// Changes recorded on the gold table after `since_version`
pub async fn cmd_changes(config: &Config, store: &TableStore, since_version: i64) -> Result<Vec<ChunkChange>> {
    let gold = config.table_names().gold;
    info!("Reading changes of `{}` after version {}", gold, since_version);
    store.read_changes(&gold, since_version).await
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 medallion Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("Source: {}", status.source_root);

    println!("\nTables:");
    for table in &status.tables {
        match table.version {
            Some(version) => println!(
                "  {} [{}] v{}, {} rows{}",
                table.name,
                table.kind,
                version,
                table.rows,
                if table.change_feed { ", change feed on" } else { "" }
            ),
            None => println!("  {} [{}] not written", table.name, table.kind),
        }
        println!("    {}", table.url);
    }

    println!("\nVector index: {}", status.index_name);
    match &status.endpoint_state {
        Some(state) => println!("  Endpoint: {} ({})", status.endpoint_name, state),
        None => println!("  Endpoint: {}", status.endpoint_name),
    }
    match (&status.index, &status.index_error) {
        (Some(index), _) => {
            let ready = if index.ready { "✓ Ready" } else { "⚠ Not ready" };
            println!("  Status: {}", ready);
            if let Some(message) = &index.message {
                println!("  {}", message);
            }
            if let Some(rows) = index.indexed_row_count {
                println!("  Indexed rows: {}", rows);
            }
        }
        (None, Some(error)) => println!("  Status: ✗ {}", error),
        (None, None) => println!("  Status: not checked (no workspace credentials)"),
    }

    if let Some(run) = &status.last_run {
        println!("\nLast run: {} ({})", run.id, run.status);
        println!("  Started: {}", run.started_at);
        println!(
            "  Files: {}, parsed: {}, errors: {}, chunks: {}",
            run.files_ingested, run.docs_parsed, run.parse_errors, run.chunks_written
        );
        if let Some(action) = &run.index_action {
            println!("  Index: {}", action);
        }
        if let Some(error) = &run.error {
            println!("  Error: {}", error);
        }
    }
}

/// Print change feed entries to console
pub fn print_changes(changes: &[ChunkChange]) {
    if changes.is_empty() {
        println!("No changes recorded.");
        return;
    }

    for change in changes {
        println!(
            "v{} {:<6} {} #{} {}",
            change.version, change.change_type, change.document_uri, change.chunk_index, change.chunk_id
        );
    }
}
