//! Error kinds surfaced by the ingestion and query pipeline.
//!
//! Functions across the workspace return [`anyhow::Result`]; the kinds
//! below are raised where a caller may need to tell failures apart and
//! can be recovered with `err.downcast_ref::<RagError>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    /// The configured document root does not exist.
    #[error("document root not found: {}", .0.display())]
    DataSourceMissing(PathBuf),

    /// Markdown files were found but none of them produced a chunk.
    #[error("no chunks produced from {files} markdown file(s)")]
    EmptyCorpus { files: usize },

    /// A single file could not be read or hashed.
    #[error("failed to read {}: {source}", path.display())]
    Compute {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The processing ledger exists but could not be parsed.
    #[error("processing ledger is corrupt: {0}")]
    LedgerCorrupt(String),

    /// Retrieval was attempted while no index is present.
    #[error("no index available; run `rag init` first")]
    IndexUnavailable,

    /// The completion backend failed or timed out.
    #[error("completion failed: {0}")]
    Completion(String),

    /// The embedding backend failed.
    #[error("embedding failed: {0}")]
    Embedding(String),
}

