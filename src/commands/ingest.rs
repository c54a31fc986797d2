//! Ingest command implementation (bronze stage)

use crate::config::Config;
use crate::error::{Error, Result};
use crate::tables::{TableKind, TableStore};
use crate::volume;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Statistics from the ingestion stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub source_root: String,
    pub table: String,
    pub files_ingested: i64,
    pub bytes_ingested: i64,
    pub version: i64,
}

/// Scan the source volume and overwrite the bronze table
///
/// Fails with [`Error::Config`] before scanning when the catalog, schema or
/// volume is unset, and with [`Error::NoSourceFiles`] when the written table
/// is empty, before any later stage runs.
pub async fn cmd_ingest(config: &Config, store: &TableStore) -> Result<IngestStats> {
    config.require_pipeline_inputs()?;
    let root = config.source_root();
    let table = config.table_names().bronze;
    info!("Ingesting `{}` into `{}`", root.display(), table);

    let records = volume::scan(&root, &config.source.glob)?;
    let bytes_ingested = records.iter().map(|r| r.length).sum();
    let version = store.overwrite_raw_files(&table, &records).await?;

    let files_ingested = store.row_count(&table, TableKind::Bronze).await?;
    if files_ingested == 0 {
        return Err(Error::NoSourceFiles {
            root: root.display().to_string(),
            glob: config.source.glob.clone(),
        });
    }

    Ok(IngestStats {
        source_root: root.display().to_string(),
        table,
        files_ingested,
        bytes_ingested,
        version,
    })
}

/// Print ingestion stats to console
pub fn print_ingest_stats(stats: &IngestStats) {
    println!("\n🥉 Bronze: {}", stats.table);
    println!("  Source: {}", stats.source_root);
    println!("  Files: {} ({} bytes)", stats.files_ingested, stats.bytes_ingested);
    println!("  Version: {}", stats.version);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{test_config, test_store};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ingest_counts_matching_files() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let source = config.source_root();
        std::fs::create_dir_all(source.join("sub")).unwrap();
        std::fs::write(source.join("a.pdf"), b"%PDF-1").unwrap();
        std::fs::write(source.join("sub/b.pdf"), b"%PDF-22").unwrap();
        std::fs::write(source.join("readme.txt"), b"skip").unwrap();
        let store = test_store(tmp.path()).await;

        let stats = cmd_ingest(&config, &store).await.unwrap();

        assert_eq!(stats.files_ingested, 2);
        assert_eq!(stats.bytes_ingested, 13);
        assert_eq!(stats.table, "main.rag.bronze_pdfs_raw");
    }

    #[tokio::test]
    async fn test_ingest_empty_volume_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        std::fs::create_dir_all(config.source_root()).unwrap();
        let store = test_store(tmp.path()).await;

        let err = cmd_ingest(&config, &store).await.unwrap_err();

        assert!(matches!(err, Error::NoSourceFiles { .. }));
        assert!(err.to_string().contains("Upload at least 1 PDF"));
    }

    #[tokio::test]
    async fn test_ingest_without_volume_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.source.volume.clear();
        // the fallback root would be the parent of every volume in the schema
        config.source.root = None;
        let store = test_store(tmp.path()).await;

        let err = cmd_ingest(&config, &store).await.unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("source UC Volume"));
        assert!(store.table_info("main.rag.bronze__raw").await.unwrap().is_none());
    }
}
