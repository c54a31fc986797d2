//! Default values for configuration

/// Default workspace host, taken from `DATABRICKS_HOST` when set
pub fn default_workspace_host() -> String {
    std::env::var("DATABRICKS_HOST").unwrap_or_default()
}

/// Default environment variable holding the personal access token
pub fn default_token_env() -> String {
    "DATABRICKS_TOKEN".to_string()
}

/// Default request timeout in seconds
pub fn default_request_timeout() -> u64 {
    60
}

/// Default file name filter for the ingestion scan
pub fn default_source_glob() -> String {
    "*.pdf".to_string()
}

/// Default vector search pipeline type
pub fn default_pipeline_type() -> String {
    "TRIGGERED".to_string()
}

/// Default number of chunks retrieved by the chain
pub fn default_retrieval_k() -> usize {
    3
}

/// Default embedding endpoint (Foundation Model API BGE)
pub fn default_embedding_endpoint() -> String {
    DEFAULT_BGE_ENDPOINT.to_string()
}

/// Task an embedding endpoint must serve
pub fn default_embedding_task() -> String {
    "llm/v1/embeddings".to_string()
}

/// Default chunk size in tokens
pub fn default_chunk_size_tokens() -> usize {
    425
}

/// Default overlap between consecutive chunks in tokens
pub fn default_chunk_overlap_tokens() -> usize {
    75
}

/// Default tokenizer (matches the BGE embedding model)
pub fn default_tokenizer() -> String {
    "BAAI/bge-large-en-v1.5".to_string()
}

/// Default serving workload size for deployed chains
pub fn default_workload_size() -> String {
    "Small".to_string()
}

/// Default: scale deployed chains to zero when idle
pub fn default_scale_to_zero() -> bool {
    true
}

/// Foundation Model API BGE endpoint name
pub const DEFAULT_BGE_ENDPOINT: &str = "databricks-bge-large-en";

/// Context window of the BGE large model
pub const BGE_CONTEXT_WINDOW_TOKENS: usize = 512;

/// Known context windows for hosted embedding endpoints
pub fn known_context_window(endpoint: &str) -> Option<usize> {
    match endpoint {
        DEFAULT_BGE_ENDPOINT => Some(BGE_CONTEXT_WINDOW_TOKENS),
        "databricks-gte-large-en" => Some(8192),
        _ => None,
    }
}
