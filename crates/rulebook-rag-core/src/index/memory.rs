//! In-memory [`VectorIndex`] implementation for tests and ephemeral use.
//!
//! Stores chunks and their vectors in a `Vec` behind `std::sync::RwLock`.
//! Search is brute-force cosine similarity over every stored vector.

use std::sync::{Arc, RwLock};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::Chunk;

use super::{Retriever, VectorIndex};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// In-memory vector index.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            chunks: RwLock::new(Vec::new()),
        }
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            bail!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }
        Ok(vectors)
    }

    /// Build an index pre-populated with `chunks`.
    pub async fn build(embedder: Arc<dyn Embedder>, chunks: &[Chunk]) -> Result<Self> {
        let index = Self::new(embedder);
        index.add(chunks).await?;
        Ok(index)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        let vectors = self.embed_chunks(chunks).await?;
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        push_all(&mut stored, chunks, vectors);
        Ok(chunks.len())
    }

    async fn replace_document(&self, document_name: &str, chunks: &[Chunk]) -> Result<usize> {
        let vectors = self.embed_chunks(chunks).await?;
        let mut stored = self
            .chunks
            .write()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        stored.retain(|sc| sc.chunk.document_name != document_name);
        push_all(&mut stored, chunks, vectors);
        Ok(chunks.len())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let query_vec = self.embedder.embed_query(query).await?;
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;

        let mut scored: Vec<(f32, &Chunk)> = stored
            .iter()
            .map(|sc| (cosine_similarity(&query_vec, &sc.vector), &sc.chunk))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, chunk)| chunk.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let stored = self
            .chunks
            .read()
            .map_err(|_| anyhow!("in-memory index lock poisoned"))?;
        Ok(stored.len())
    }
}

fn push_all(stored: &mut Vec<StoredChunk>, chunks: &[Chunk], vectors: Vec<Vec<f32>>) {
    for (chunk, vector) in chunks.iter().zip(vectors) {
        stored.push(StoredChunk {
            chunk: chunk.clone(),
            vector,
        });
    }
}

#[async_trait]
impl Retriever for InMemoryIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        self.search(query, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn chunk(text: &str, doc: &str, page: u32) -> Chunk {
        Chunk::new(text.to_string(), doc, page, String::new())
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(HashingEmbedder::new(128))
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = InMemoryIndex::build(
            embedder(),
            &[
                chunk("Elves have darkvision out to sixty feet", "phb.md", 1),
                chunk("Fireball deals fire damage in a sphere", "phb.md", 2),
            ],
        )
        .await
        .unwrap();

        let hits = index.search("fireball damage", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].page_number, 2);
    }

    #[tokio::test]
    async fn test_search_truncates_to_k() {
        let chunks: Vec<Chunk> = (0..10)
            .map(|i| chunk(&format!("rule number {}", i), "dmg.md", i + 1))
            .collect();
        let index = InMemoryIndex::build(embedder(), &chunks).await.unwrap();
        assert_eq!(index.search("rule", 4).await.unwrap().len(), 4);
        assert_eq!(index.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_equal_scores_keep_insertion_order() {
        let chunks = vec![
            chunk("same text", "a.md", 1),
            chunk("same text", "b.md", 1),
            chunk("same text", "c.md", 1),
        ];
        let index = InMemoryIndex::build(embedder(), &chunks).await.unwrap();
        let names: Vec<String> = index
            .search("same text", 3)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.document_name)
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "c.md"]);
    }

    #[tokio::test]
    async fn test_add_is_not_idempotent_and_replace_document_swaps_chunks() {
        let index = InMemoryIndex::new(embedder());
        let chunks = vec![chunk("one", "a.md", 1), chunk("two", "b.md", 1)];
        index.add(&chunks).await.unwrap();
        index.add(&chunks).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 4);

        let fresh = vec![chunk("uno", "a.md", 1)];
        assert_eq!(index.replace_document("a.md", &fresh).await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 3);
        let a: Vec<String> = index
            .search("uno", 3)
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.document_name == "a.md")
            .map(|c| c.text)
            .collect();
        assert_eq!(a, vec!["uno"]);
    }
}
