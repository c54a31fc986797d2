//! Pipeline table storage using SQLite
//!
//! This module persists the three pipeline stages as full snapshots:
//! - Bronze: raw file bytes with filesystem metadata
//! - Silver: extraction outcome per file, failures included
//! - Gold: chunks with content-addressed ids
//!
//! It also keeps a registry of table versions, a change feed for tables with
//! change tracking enabled, and the history of pipeline runs.

mod schema;

pub use schema::*;

use crate::error::{Error, Result};
use crate::parse::{ParsedOutput, PARSE_SUCCESS};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Table property that turns on the change feed
pub const CHANGE_FEED_PROPERTY: &str = "delta.enableChangeDataFeed";

/// Kinds of table the pipeline writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Bronze,
    Silver,
    Gold,
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableKind::Bronze => write!(f, "bronze"),
            TableKind::Silver => write!(f, "silver"),
            TableKind::Gold => write!(f, "gold"),
        }
    }
}

/// Pipeline run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(Error::Config(format!("Unknown run status: {}", s))),
        }
    }
}

/// A file found by the volume scan
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RawFileRecord {
    #[sqlx(rename = "doc_uri")]
    pub document_uri: String,
    pub modification_time: String,
    pub length: i64,
    #[serde(skip)]
    pub content: Vec<u8>,
}

/// A file after text extraction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub document_uri: String,
    pub modification_time: String,
    pub length: i64,
    pub parsed_output: ParsedOutput,
}

impl ParsedDocument {
    pub fn from_raw(raw: &RawFileRecord, parsed_output: ParsedOutput) -> Self {
        Self {
            document_uri: raw.document_uri.clone(),
            modification_time: raw.modification_time.clone(),
            length: raw.length,
            parsed_output,
        }
    }
}

#[derive(FromRow)]
struct ParsedRow {
    doc_uri: String,
    modification_time: String,
    length: i64,
    page_count: Option<i64>,
    text: Option<String>,
    status: String,
}

impl From<ParsedRow> for ParsedDocument {
    fn from(row: ParsedRow) -> Self {
        Self {
            document_uri: row.doc_uri,
            modification_time: row.modification_time,
            length: row.length,
            parsed_output: ParsedOutput::from_parts(row.page_count, row.text, row.status),
        }
    }
}

/// One chunk of a parsed document
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[sqlx(rename = "doc_uri")]
    pub document_uri: String,
    pub modification_time: String,
    pub length: i64,
    pub chunk_index: i64,
    #[sqlx(rename = "chunked_text")]
    pub chunk_text: String,
    pub chunk_id: String,
}

/// Registry entry for a logical table
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TableInfo {
    pub table_name: String,
    pub kind: String,
    pub version: i64,
    pub change_feed: bool,
    pub updated_at: String,
}

/// One change recorded for a gold table
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ChunkChange {
    pub version: i64,
    pub change_type: String,
    #[sqlx(rename = "doc_uri")]
    pub document_uri: String,
    pub chunk_index: i64,
    pub chunk_id: String,
}

/// A pipeline run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: String,
    pub source_root: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: String,
    pub files_ingested: i64,
    pub docs_parsed: i64,
    pub parse_errors: i64,
    pub chunks_written: i64,
    pub index_action: Option<String>,
    pub error: Option<String>,
}

/// Counters written when a run finishes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunCounts {
    pub files_ingested: i64,
    pub docs_parsed: i64,
    pub parse_errors: i64,
    pub chunks_written: i64,
    pub index_action: Option<String>,
}

/// Pipeline table database handle
#[derive(Clone)]
pub struct TableStore {
    pool: SqlitePool,
}

impl TableStore {
    /// Open (creating if needed) the table database and its schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Bump a table's version inside a write, returning the new version
    async fn next_version(
        tx: &mut Transaction<'_, Sqlite>,
        table: &str,
        kind: TableKind,
    ) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let version: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO table_registry (table_name, kind, version, change_feed, updated_at)
            VALUES (?, ?, 1, 0, ?)
            ON CONFLICT(table_name) DO UPDATE SET
                version = table_registry.version + 1,
                updated_at = excluded.updated_at
            RETURNING version
            "#,
        )
        .bind(table)
        .bind(kind.to_string())
        .bind(&now)
        .fetch_one(&mut **tx)
        .await?;
        Ok(version)
    }

    // ===== Bronze =====

    /// Replace the bronze table with a new snapshot
    pub async fn overwrite_raw_files(&self, table: &str, records: &[RawFileRecord]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let version = Self::next_version(&mut tx, table, TableKind::Bronze).await?;

        sqlx::query("DELETE FROM raw_files WHERE table_name = ?")
            .bind(table)
            .execute(&mut *tx)
            .await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO raw_files (table_name, doc_uri, modification_time, length, content)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(table)
            .bind(&record.document_uri)
            .bind(&record.modification_time)
            .bind(record.length)
            .bind(&record.content)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Wrote {} rows to {} (version {})", records.len(), table, version);
        Ok(version)
    }

    /// Read the bronze table
    pub async fn read_raw_files(&self, table: &str) -> Result<Vec<RawFileRecord>> {
        let records = sqlx::query_as::<_, RawFileRecord>(
            r#"
            SELECT doc_uri, modification_time, length, content
            FROM raw_files WHERE table_name = ? ORDER BY doc_uri
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    // ===== Silver =====

    /// Replace the silver table with a new snapshot
    pub async fn overwrite_parsed(&self, table: &str, docs: &[ParsedDocument]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let version = Self::next_version(&mut tx, table, TableKind::Silver).await?;

        sqlx::query("DELETE FROM parsed_documents WHERE table_name = ?")
            .bind(table)
            .execute(&mut *tx)
            .await?;

        for doc in docs {
            let output = &doc.parsed_output;
            sqlx::query(
                r#"
                INSERT INTO parsed_documents
                    (table_name, doc_uri, modification_time, length, page_count, text, status)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(table)
            .bind(&doc.document_uri)
            .bind(&doc.modification_time)
            .bind(doc.length)
            .bind(output.page_count())
            .bind(output.text())
            .bind(output.status())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Wrote {} rows to {} (version {})", docs.len(), table, version);
        Ok(version)
    }

    /// Read the silver table, optionally only successfully parsed rows
    pub async fn read_parsed(&self, table: &str, success_only: bool) -> Result<Vec<ParsedDocument>> {
        let rows = sqlx::query_as::<_, ParsedRow>(
            r#"
            SELECT doc_uri, modification_time, length, page_count, text, status
            FROM parsed_documents WHERE table_name = ? ORDER BY doc_uri
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|row| !success_only || row.status == PARSE_SUCCESS)
            .map(ParsedDocument::from)
            .collect())
    }

    // ===== Gold =====

    /// Replace the gold table with a new snapshot, feeding changes when enabled
    pub async fn overwrite_chunks(&self, table: &str, chunks: &[ChunkRecord]) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let version = Self::next_version(&mut tx, table, TableKind::Gold).await?;

        let change_feed: bool =
            sqlx::query_scalar("SELECT change_feed FROM table_registry WHERE table_name = ?")
                .bind(table)
                .fetch_one(&mut *tx)
                .await?;
        let now = Utc::now().to_rfc3339();

        if change_feed {
            sqlx::query(
                r#"
                INSERT INTO chunk_changes
                    (table_name, version, change_type, doc_uri, chunk_index, chunk_id, recorded_at)
                SELECT table_name, ?, 'delete', doc_uri, chunk_index, chunk_id, ?
                FROM chunks WHERE table_name = ?
                "#,
            )
            .bind(version)
            .bind(&now)
            .bind(table)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM chunks WHERE table_name = ?")
            .bind(table)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (table_name, doc_uri, modification_time, length, chunk_index, chunked_text, chunk_id)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(table)
            .bind(&chunk.document_uri)
            .bind(&chunk.modification_time)
            .bind(chunk.length)
            .bind(chunk.chunk_index)
            .bind(&chunk.chunk_text)
            .bind(&chunk.chunk_id)
            .execute(&mut *tx)
            .await?;

            if change_feed {
                sqlx::query(
                    r#"
                    INSERT INTO chunk_changes
                        (table_name, version, change_type, doc_uri, chunk_index, chunk_id, recorded_at)
                    VALUES (?, ?, 'insert', ?, ?, ?, ?)
                    "#,
                )
                .bind(table)
                .bind(version)
                .bind(&chunk.document_uri)
                .bind(chunk.chunk_index)
                .bind(&chunk.chunk_id)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        info!("Wrote {} rows to {} (version {})", chunks.len(), table, version);
        Ok(version)
    }

    /// Read the gold table in document and chunk order
    pub async fn read_chunks(&self, table: &str) -> Result<Vec<ChunkRecord>> {
        let chunks = sqlx::query_as::<_, ChunkRecord>(
            r#"
            SELECT doc_uri, modification_time, length, chunk_index, chunked_text, chunk_id
            FROM chunks WHERE table_name = ? ORDER BY doc_uri, chunk_index
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(chunks)
    }

    /// Turn on the change feed for a table
    pub async fn enable_change_feed(&self, table: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE table_registry SET change_feed = 1, updated_at = ? WHERE table_name = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(table)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::Other(format!(
                "Cannot set {} on `{}`: table has not been written",
                CHANGE_FEED_PROPERTY, table
            )));
        }
        debug!("Set {} = true on {}", CHANGE_FEED_PROPERTY, table);
        Ok(())
    }

    /// Changes recorded after `since_version`
    pub async fn read_changes(&self, table: &str, since_version: i64) -> Result<Vec<ChunkChange>> {
        let changes = sqlx::query_as::<_, ChunkChange>(
            r#"
            SELECT version, change_type, doc_uri, chunk_index, chunk_id
            FROM chunk_changes
            WHERE table_name = ? AND version > ?
            ORDER BY version, change_type, doc_uri, chunk_index
            "#,
        )
        .bind(table)
        .bind(since_version)
        .fetch_all(&self.pool)
        .await?;
        Ok(changes)
    }

    // ===== Registry =====

    /// Registry entry for a table, if it was ever written
    pub async fn table_info(&self, table: &str) -> Result<Option<TableInfo>> {
        let info = sqlx::query_as::<_, TableInfo>(
            "SELECT table_name, kind, version, change_feed, updated_at FROM table_registry WHERE table_name = ?",
        )
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;
        Ok(info)
    }

    /// Number of rows currently in a table
    pub async fn row_count(&self, table: &str, kind: TableKind) -> Result<i64> {
        let sql = match kind {
            TableKind::Bronze => "SELECT COUNT(*) FROM raw_files WHERE table_name = ?",
            TableKind::Silver => "SELECT COUNT(*) FROM parsed_documents WHERE table_name = ?",
            TableKind::Gold => "SELECT COUNT(*) FROM chunks WHERE table_name = ?",
        };
        let count: i64 = sqlx::query_scalar(sql)
            .bind(table)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ===== Pipeline runs =====

    /// Record the start of a pipeline run
    pub async fn start_run(&self, source_root: &str) -> Result<PipelineRun> {
        let run = PipelineRun {
            id: Uuid::new_v4().to_string(),
            source_root: source_root.to_string(),
            started_at: Utc::now().to_rfc3339(),
            completed_at: None,
            status: RunStatus::Running.to_string(),
            files_ingested: 0,
            docs_parsed: 0,
            parse_errors: 0,
            chunks_written: 0,
            index_action: None,
            error: None,
        };

        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, source_root, started_at, status)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.source_root)
        .bind(&run.started_at)
        .bind(&run.status)
        .execute(&self.pool)
        .await?;

        Ok(run)
    }

    /// Record the outcome of a pipeline run
    pub async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        counts: &RunCounts,
        error: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE pipeline_runs SET
                completed_at = ?,
                status = ?,
                files_ingested = ?,
                docs_parsed = ?,
                parse_errors = ?,
                chunks_written = ?,
                index_action = ?,
                error = ?
            WHERE id = ?
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(status.to_string())
        .bind(counts.files_ingested)
        .bind(counts.docs_parsed)
        .bind(counts.parse_errors)
        .bind(counts.chunks_written)
        .bind(&counts.index_action)
        .bind(error)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent pipeline run
    pub async fn latest_run(&self) -> Result<Option<PipelineRun>> {
        let run = sqlx::query_as::<_, PipelineRun>(
            "SELECT * FROM pipeline_runs ORDER BY started_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(run)
    }
}
