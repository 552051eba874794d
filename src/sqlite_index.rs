//! SQLite-backed [`VectorIndex`].
//!
//! Each row holds one chunk with its metadata, text and embedding (a
//! little-endian f32 BLOB). Search embeds the query and scans every row
//! with cosine similarity; rulebook corpora are a few thousand chunks, so
//! a brute-force scan stays fast.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rulebook_rag_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use rulebook_rag_core::index::{Retriever, VectorIndex};
use rulebook_rag_core::models::Chunk;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::debug;
use std::path::Path;
use std::sync::Arc;

use crate::db;
use crate::migrate;

pub struct SqliteIndex {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl SqliteIndex {
    /// Create a new, empty index file (or open an existing one) at `path`.
    pub async fn create(path: &Path, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        let pool = db::connect(path, true).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::with_pool(pool, embedder, batch_size))
    }

    /// Open an index that must already exist.
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>, batch_size: usize) -> Result<Self> {
        if !path.exists() {
            bail!("index file not found: {}", path.display());
        }
        let pool = db::connect(path, false).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::with_pool(pool, embedder, batch_size))
    }

    fn with_pool(pool: SqlitePool, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            pool,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Number of distinct documents with at least one chunk.
    pub async fn document_count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT document_name) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    /// Embed every chunk in `batch_size` batches. Runs before any write so
    /// a failed embedding call leaves the index unchanged.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = self.embedder.embed(&texts).await?;
            if batch_vectors.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    batch_vectors.len(),
                    batch.len()
                );
            }
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }

    async fn insert_chunks(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let model = self.embedder.model_name();

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (document_name, page_number, section_path, chunk_size,
                                    text, embedding, dims, model, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.document_name)
            .bind(chunk.page_number as i64)
            .bind(&chunk.section_path)
            .bind(chunk.chunk_size as i64)
            .bind(&chunk.text)
            .bind(vec_to_blob(vector))
            .bind(vector.len() as i64)
            .bind(model)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Close the connection pool. Later calls on this handle fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let vectors = self.embed_chunks(chunks).await?;

        let mut tx = self.pool.begin().await?;
        self.insert_chunks(&mut tx, chunks, &vectors).await?;
        tx.commit().await?;
        Ok(chunks.len())
    }

    async fn replace_document(&self, document_name: &str, chunks: &[Chunk]) -> Result<usize> {
        let vectors = self.embed_chunks(chunks).await?;

        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM chunks WHERE document_name = ?")
            .bind(document_name)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        self.insert_chunks(&mut tx, chunks, &vectors).await?;
        tx.commit().await?;

        if removed > 0 {
            debug!(document = %document_name, removed, added = chunks.len(), "replaced chunks");
        }
        Ok(chunks.len())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_query(query).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, document_name, page_number, section_path, text, embedding
            FROM chunks
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(f32, Chunk)> = Vec::with_capacity(rows.len());
        for row in rows {
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(&query_vec, &blob_to_vec(&blob));
            let page: i64 = row.get("page_number");
            scored.push((
                score,
                Chunk::new(
                    row.get("text"),
                    row.get::<String, _>("document_name").as_str(),
                    page as u32,
                    row.get("section_path"),
                ),
            ));
        }

        // Rows arrive in id order and the sort is stable, so ties keep it.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored.into_iter().map(|(_, chunk)| chunk).collect())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

#[async_trait]
impl Retriever for SqliteIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        self.search(query, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulebook_rag_core::embedding::HashingEmbedder;
    use tempfile::TempDir;

    fn chunk(text: &str, doc: &str, page: u32, section: &str) -> Chunk {
        Chunk::new(text.to_string(), doc, page, section.to_string())
    }

    async fn build(
        path: &Path,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
        chunks: &[Chunk],
    ) -> SqliteIndex {
        let index = SqliteIndex::create(path, embedder, batch_size).await.unwrap();
        index.add(chunks).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_build_search_and_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));

        let index = build(
            &path,
            embedder.clone(),
            1,
            &[
                chunk("Elves see in the dark with darkvision", "phb.md", 23, "Races > Elf"),
                chunk("Fireball explodes in a burst of flame", "phb.md", 241, "Spells > Fireball"),
                chunk("Goblins are small and sneaky", "mm.md", 166, ""),
            ],
        )
        .await;
        assert_eq!(index.count().await.unwrap(), 3);
        assert_eq!(index.document_count().await.unwrap(), 2);
        index.close().await;

        let reopened = SqliteIndex::open(&path, embedder, 64).await.unwrap();
        let hits = reopened.search("fireball flame burst", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].page_number, 241);
        assert_eq!(hits[0].section_path, "Spells > Fireball");
        assert_eq!(hits[0].chunk_size, hits[0].text.chars().count());
    }

    #[tokio::test]
    async fn test_replace_document_swaps_only_that_document() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        let index = build(
            &path,
            Arc::new(HashingEmbedder::new(32)),
            64,
            &[chunk("a", "a.md", 1, ""), chunk("b", "a.md", 2, ""), chunk("c", "c.md", 1, "")],
        )
        .await;

        let added = index
            .replace_document("a.md", &[chunk("a2", "a.md", 1, "")])
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(index.count().await.unwrap(), 2);
        assert_eq!(index.document_count().await.unwrap(), 2);
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_old_chunks() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        let index = build(
            &path,
            Arc::new(HashingEmbedder::new(32)),
            64,
            &[chunk("a", "a.md", 1, ""), chunk("b", "a.md", 2, "")],
        )
        .await;
        index.close().await;

        let reopened = SqliteIndex::open(&path, Arc::new(FailingEmbedder), 64)
            .await
            .unwrap();
        assert!(reopened
            .replace_document("a.md", &[chunk("a2", "a.md", 1, "")])
            .await
            .is_err());
        assert_eq!(reopened.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_open_missing_index_fails() {
        let tmp = TempDir::new().unwrap();
        let result = SqliteIndex::open(
            &tmp.path().join("nope.sqlite"),
            Arc::new(HashingEmbedder::new(32)),
            64,
        )
        .await;
        assert!(result.is_err());
    }
}
