//! CLI commands implementation

pub mod chunk;
pub mod ingest;
pub mod init;
pub mod model;
pub mod parse;
pub mod rag_config;
pub mod run;
pub mod status;
pub mod sync;

pub use chunk::*;
pub use ingest::*;
pub use init::*;
pub use model::*;
pub use parse::*;
pub use rag_config::*;
pub use run::*;
pub use status::*;
pub use sync::*;
