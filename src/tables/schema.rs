//! SQLite schema definition

/// SQL schema for the pipeline tables
///
/// Every logical table (bronze, silver, gold) lives in one physical table
/// keyed by its fully qualified name, so several volumes can share a database.
pub const SCHEMA_SQL: &str = r#"
-- Registry: one row per logical table written by the pipeline
CREATE TABLE IF NOT EXISTS table_registry (
    table_name TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    change_feed INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

-- Bronze: raw file bytes and metadata
CREATE TABLE IF NOT EXISTS raw_files (
    table_name TEXT NOT NULL,
    doc_uri TEXT NOT NULL,
    modification_time TEXT NOT NULL,
    length INTEGER NOT NULL,
    content BLOB NOT NULL,
    PRIMARY KEY (table_name, doc_uri)
);

-- Silver: extraction outcome per file, failures included
CREATE TABLE IF NOT EXISTS parsed_documents (
    table_name TEXT NOT NULL,
    doc_uri TEXT NOT NULL,
    modification_time TEXT NOT NULL,
    length INTEGER NOT NULL,
    page_count INTEGER,
    text TEXT,
    status TEXT NOT NULL,
    PRIMARY KEY (table_name, doc_uri)
);

-- Gold: one row per chunk; chunk_id is content-addressed and may repeat
CREATE TABLE IF NOT EXISTS chunks (
    table_name TEXT NOT NULL,
    doc_uri TEXT NOT NULL,
    modification_time TEXT NOT NULL,
    length INTEGER NOT NULL,
    chunk_index INTEGER NOT NULL,
    chunked_text TEXT NOT NULL,
    chunk_id TEXT NOT NULL,
    PRIMARY KEY (table_name, doc_uri, chunk_index)
);

-- Change feed for tables with change tracking enabled
CREATE TABLE IF NOT EXISTS chunk_changes (
    table_name TEXT NOT NULL,
    version INTEGER NOT NULL,
    change_type TEXT NOT NULL,
    doc_uri TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    chunk_id TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

-- Pipeline runs: tracking history
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id TEXT PRIMARY KEY,
    source_root TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    files_ingested INTEGER DEFAULT 0,
    docs_parsed INTEGER DEFAULT 0,
    parse_errors INTEGER DEFAULT 0,
    chunks_written INTEGER DEFAULT 0,
    index_action TEXT,
    error TEXT
);

CREATE INDEX IF NOT EXISTS idx_chunks_chunk_id ON chunks(chunk_id);
CREATE INDEX IF NOT EXISTS idx_changes_table_version ON chunk_changes(table_name, version);
CREATE INDEX IF NOT EXISTS idx_runs_started ON pipeline_runs(started_at);
"#;
