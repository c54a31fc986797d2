//! Parse command implementation (silver stage)

use crate::config::Config;
use crate::error::Result;
use crate::parse::parse_pdf;
use crate::progress::{advance_progress, finish_progress, start_progress};
use crate::tables::{ParsedDocument, TableStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Statistics from the extraction stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseStats {
    pub table: String,
    pub docs_total: i64,
    pub docs_parsed: i64,
    pub parse_errors: i64,
    pub pages: i64,
    pub version: i64,
}

/// Extract text from every bronze row and overwrite the silver table
///
/// Failed rows are written with their error status; they never abort the stage.
pub async fn cmd_parse(config: &Config, store: &TableStore) -> Result<ParseStats> {
    config.require_pipeline_inputs()?;
    let tables = config.table_names();
    let raw_files = store.read_raw_files(&tables.bronze).await?;
    info!("Parsing {} files from `{}`", raw_files.len(), tables.bronze);

    let pb = start_progress(raw_files.len(), "Parsing PDFs");
    let mut docs = Vec::with_capacity(raw_files.len());
    for raw in &raw_files {
        let output = parse_pdf(&raw.content);
        if output.is_success() {
            debug!("Parsed {} ({:?} pages)", raw.document_uri, output.page_count());
        } else {
            debug!("Failed to parse {}: {}", raw.document_uri, output.status());
        }
        docs.push(ParsedDocument::from_raw(raw, output));
        advance_progress(&pb);
    }

    let version = store.overwrite_parsed(&tables.silver, &docs).await?;

    let docs_parsed = docs.iter().filter(|d| d.parsed_output.is_success()).count() as i64;
    let parse_errors = docs.len() as i64 - docs_parsed;
    let pages = docs
        .iter()
        .filter_map(|d| d.parsed_output.page_count())
        .sum();

    finish_progress(pb, &format!("{} parsed, {} errors", docs_parsed, parse_errors));

    if parse_errors > 0 {
        warn!("{} documents had parse errors. Please review.", parse_errors);
    }

    Ok(ParseStats {
        table: tables.silver,
        docs_total: docs.len() as i64,
        docs_parsed,
        parse_errors,
        pages,
        version,
    })
}

/// Print extraction stats to console
pub fn print_parse_stats(stats: &ParseStats) {
    println!("\n🥈 Silver: {}", stats.table);
    println!(
        "  Documents: {} parsed, {} errors ({} pages)",
        stats.docs_parsed, stats.parse_errors, stats.pages
    );
    println!("  Version: {}", stats.version);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{test_config, test_store, write_pdf};
    use crate::commands::cmd_ingest;
    use crate::error::Error;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_parse_keeps_failures_and_reloads_successes() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        write_pdf(&config.source_root().join("good.pdf"), 2);
        std::fs::write(config.source_root().join("broken.pdf"), b"not a pdf").unwrap();
        let store = test_store(tmp.path()).await;

        cmd_ingest(&config, &store).await.unwrap();
        let stats = cmd_parse(&config, &store).await.unwrap();

        assert_eq!(stats.docs_total, 2);
        assert_eq!(stats.docs_parsed, 1);
        assert_eq!(stats.parse_errors, 1);
        assert_eq!(stats.pages, 2);

        let silver = config.table_names().silver;
        let all = store.read_parsed(&silver, false).await.unwrap();
        for doc in &all {
            let output = &doc.parsed_output;
            assert_eq!(output.is_success(), output.text().is_some());
            assert_eq!(output.is_success(), output.page_count().is_some());
        }
        let broken = all.iter().find(|d| d.document_uri.ends_with("broken.pdf")).unwrap();
        assert!(broken.parsed_output.status().starts_with("ERROR: "));

        let ok = store.read_parsed(&silver, true).await.unwrap();
        assert_eq!(ok.len(), 1);
        assert!(ok[0].document_uri.ends_with("good.pdf"));
    }

    #[tokio::test]
    async fn test_parse_without_vector_search_endpoint_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        write_pdf(&config.source_root().join("good.pdf"), 1);
        let store = test_store(tmp.path()).await;
        cmd_ingest(&config, &store).await.unwrap();
        config.vector_search.endpoint_name.clear();

        let err = cmd_parse(&config, &store).await.unwrap_err();

        assert!(matches!(err, Error::Config(m) if m.contains("Vector Search endpoint")));
        let tables = config.table_names();
        assert!(store.table_info(&tables.silver).await.unwrap().is_none());
    }
}
