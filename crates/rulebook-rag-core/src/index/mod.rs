//! Vector index capability.
//!
//! The [`VectorIndex`] trait is the boundary between the ingestion
//! pipeline and whatever engine stores and searches chunk embeddings.
//! Construction (`build` from chunks, `load` from disk) belongs to each
//! backend; once constructed, every backend supports the operations
//! below.
//!
//! The [`Retriever`] trait is the narrower, read-only view the query
//! orchestrator depends on. Index managers that guard a backend behind a
//! lock implement it directly.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Chunk;

/// Abstract vector index over [`Chunk`]s.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](VectorIndex::add) | Embed and append chunks |
/// | [`replace_document`](VectorIndex::replace_document) | Swap one document's chunks for new ones |
/// | [`search`](VectorIndex::search) | Nearest-neighbour search by query text |
/// | [`count`](VectorIndex::count) | Number of stored chunks |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Append chunks to the index and return how many were stored.
    ///
    /// Not idempotent: adding the same chunks twice stores duplicates.
    async fn add(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Replace every chunk of `document_name` with `chunks` and return how
    /// many were stored.
    ///
    /// All-or-nothing: if embedding or storing fails, the document's old
    /// chunks are still in the index.
    async fn replace_document(&self, document_name: &str, chunks: &[Chunk]) -> Result<usize>;

    /// Return at most `k` chunks ordered by decreasing similarity to
    /// `query`. Ties keep insertion order, so the same query against the
    /// same index state always yields the same sequence.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;

    /// Number of chunks currently stored.
    async fn count(&self) -> Result<usize>;
}

/// Read-only retrieval used by the query orchestrator.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return at most `k` chunks relevant to `query`, most relevant first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;
}
