//! RAG chain configuration block

use crate::config::Config;
use crate::databricks::{DOCUMENT_SOURCE_COLUMN, EMBEDDING_SOURCE_COLUMN, PRIMARY_KEY_COLUMN};
use crate::error::Result;

/// Double-quoted YAML scalar; JSON string escapes are valid YAML escapes
fn quoted(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// YAML block to paste into the chain's configuration file
pub fn cmd_rag_config(config: &Config) -> Result<String> {
    config.require_pipeline_inputs()?;
    let names = config.table_names();
    Ok(format!(
        r#"vector_search_endpoint_name: {endpoint}
vector_search_index: {index}
# These must be set to use the Review App to match the columns in your index
vector_search_schema:
  primary_key: {primary_key}
  chunk_text: {chunk_text}
  document_source: {document_source}
vector_search_parameters:
  k: {k}
"#,
        endpoint = quoted(&config.vector_search.endpoint_name)?,
        index = quoted(&names.index)?,
        primary_key = quoted(PRIMARY_KEY_COLUMN)?,
        chunk_text = quoted(EMBEDDING_SOURCE_COLUMN)?,
        document_source = quoted(DOCUMENT_SOURCE_COLUMN)?,
        k = config.vector_search.k,
    ))
}
