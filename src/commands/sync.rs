//! Sync command implementation (vector index)

use crate::config::Config;
use crate::databricks::{ensure_index, IndexSpec, IndexSyncOutcome, VectorIndexService};
use crate::error::{Error, Result};
use crate::tables::TableStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What the index step did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub index_name: String,
    pub endpoint_name: String,
    pub source_table: String,
    pub outcome: IndexSyncOutcome,
}

/// Sync the vector index to the gold table, creating the index if it is missing
pub async fn cmd_sync(
    config: &Config,
    store: &TableStore,
    index: &dyn VectorIndexService,
) -> Result<SyncReport> {
    config.require_pipeline_inputs()?;
    let spec = IndexSpec::from_config(config);

    if store.table_info(&spec.source_table).await?.is_none() {
        return Err(Error::Other(format!(
            "Gold table `{}` has not been written yet. Run `medallion chunk` or `medallion run` first.",
            spec.source_table
        )));
    }

    let outcome = ensure_index(index, &spec).await?;
    info!("Index `{}` {}", spec.name, outcome);

    Ok(SyncReport {
        index_name: spec.name,
        endpoint_name: spec.endpoint_name,
        source_table: spec.source_table,
        outcome,
    })
}

/// Print sync report to console
pub fn print_sync_report(report: &SyncReport) {
    let action = match report.outcome {
        IndexSyncOutcome::Synced => "sync triggered",
        IndexSyncOutcome::Created => "created",
    };
    println!("\n🔎 Vector index: {} ({})", report.index_name, action);
    println!("  Endpoint: {}", report.endpoint_name);
    println!("  Source table: {}", report.source_table);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{test_config, test_store};
    use crate::databricks::test_support::FakeIndexService;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sync_requires_gold_table() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let store = test_store(tmp.path()).await;
        let fake = FakeIndexService::default();

        let err = cmd_sync(&config, &store, &fake).await.unwrap_err();

        assert!(matches!(err, Error::Other(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sync_existing_index() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let store = test_store(tmp.path()).await;
        let tables = config.table_names();
        store.overwrite_chunks(&tables.gold, &[]).await.unwrap();
        let fake = FakeIndexService::with_index(&tables.index);

        let report = cmd_sync(&config, &store, &fake).await.unwrap();

        assert_eq!(report.outcome, IndexSyncOutcome::Synced);
        assert_eq!(fake.calls(), vec![format!("sync:{}", tables.index)]);
    }

    #[tokio::test]
    async fn test_sync_without_embedding_endpoint_calls_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        let store = test_store(tmp.path()).await;
        let tables = config.table_names();
        store.overwrite_chunks(&tables.gold, &[]).await.unwrap();
        config.embedding.endpoint_name.clear();
        let fake = FakeIndexService::default();

        let err = cmd_sync(&config, &store, &fake).await.unwrap_err();

        assert!(matches!(err, Error::Config(m) if m.contains("embedding endpoint")));
        assert!(fake.calls().is_empty());
    }
}
