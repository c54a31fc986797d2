//! Chunk command implementation (gold stage)

use crate::chunk::{load_token_counter_blocking, TokenCounter, TokenSplitter};
use crate::config::Config;
use crate::error::Result;
use crate::progress::{advance_progress, finish_progress, start_progress};
use crate::tables::{ChunkRecord, TableStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Statistics from the chunking stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkStats {
    pub table: String,
    pub tokenizer: String,
    pub docs_chunked: i64,
    pub chunks_written: i64,
    pub max_chunk_tokens: usize,
    pub version: i64,
}

/// Tokenizer for the gold stage
///
/// The pipeline inputs are checked first so a misconfigured run fails before
/// any tokenizer download.
pub async fn load_chunk_counter(config: &Config) -> Result<Arc<dyn TokenCounter>> {
    config.require_pipeline_inputs()?;
    load_token_counter_blocking(&config.chunk.tokenizer).await
}

/// Split every successfully parsed document and overwrite the gold table
///
/// Change tracking is enabled on the gold table after the write.
pub async fn cmd_chunk(
    config: &Config,
    store: &TableStore,
    counter: Arc<dyn TokenCounter>,
) -> Result<ChunkStats> {
    config.require_pipeline_inputs()?;
    let tables = config.table_names();

    if let Some(window) = config.chunk_exceeds_context_window() {
        warn!(
            "Your chunk configuration ({} + {} overlap tokens) exceeds `{}` context window of {} tokens. \
             Embedding performance may be diminished since tokens past {} are ignored by the embedding model.",
            config.chunk.size_tokens,
            config.chunk.overlap_tokens,
            config.embedding.endpoint_name,
            window,
            window
        );
    }

    let tokenizer = counter.name().to_string();
    let splitter = TokenSplitter::new(counter, config.chunk.size_tokens, config.chunk.overlap_tokens)?;

    let docs = store.read_parsed(&tables.silver, true).await?;
    info!(
        "Chunking {} documents from `{}` ({} tokens, {} overlap, tokenizer {})",
        docs.len(),
        tables.silver,
        splitter.chunk_size(),
        splitter.chunk_overlap(),
        tokenizer
    );

    let pb = start_progress(docs.len(), "Chunking documents");
    let mut records = Vec::new();
    let mut max_chunk_tokens = 0;
    for doc in &docs {
        let text = doc.parsed_output.text().unwrap_or_default();
        let chunks = splitter.split(text)?;
        debug!("{}: {} chunks", doc.document_uri, chunks.len());

        for chunk in chunks {
            max_chunk_tokens = max_chunk_tokens.max(chunk.token_count);
            records.push(ChunkRecord {
                document_uri: doc.document_uri.clone(),
                modification_time: doc.modification_time.clone(),
                length: doc.length,
                chunk_index: chunk.index as i64,
                chunk_id: chunk.chunk_id(),
                chunk_text: chunk.text,
            });
        }
        advance_progress(&pb);
    }
    finish_progress(pb, &format!("{} chunks", records.len()));

    let version = store.overwrite_chunks(&tables.gold, &records).await?;
    store.enable_change_feed(&tables.gold).await?;

    Ok(ChunkStats {
        table: tables.gold,
        tokenizer,
        docs_chunked: docs.len() as i64,
        chunks_written: records.len() as i64,
        max_chunk_tokens,
        version,
    })
}

/// Print chunking stats to console
pub fn print_chunk_stats(stats: &ChunkStats) {
    println!("\n🥇 Gold: {}", stats.table);
    println!(
        "  Chunks: {} from {} documents (largest {} tokens, {})",
        stats.chunks_written, stats.docs_chunked, stats.max_chunk_tokens, stats.tokenizer
    );
    println!("  Version: {} (change data feed enabled)", stats.version);
}
