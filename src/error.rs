//! Custom error types for medallion

use thiserror::Error;

/// Main error type for medallion operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("PDF parse error: {0}")]
    Parse(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("`{root}` does not contain any files matching `{glob}`. Upload at least 1 PDF file to the volume and run again.")]
    NoSourceFiles { root: String, glob: String },

    #[error("{0}")]
    EndpointNotFound(String),

    #[error("Your endpoint `{endpoint}` is of type `{actual}`, not `{expected}`. Create a compatible embeddings endpoint to continue.")]
    EndpointTask {
        endpoint: String,
        expected: String,
        actual: String,
    },

    #[error("Model name `{0}` does not have the format 'catalog_name.schema_name.model_name'")]
    InvalidModelName(String),

    #[error("Resource does not exist: {0}")]
    ResourceNotFound(String),

    #[error("Databricks API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for medallion
pub type Result<T> = std::result::Result<T, Error>;
