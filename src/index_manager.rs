//! Index lifecycle: build, incremental update, retrieval, stats, reset.
//!
//! The persisted index is either **Absent** (no `index.sqlite` in the
//! index directory) or **Present**. [`IndexManager::init_or_update`]
//! moves Absent to Present by indexing every markdown file, or brings a
//! Present index up to date with the files whose content changed since
//! the ledger last recorded them.
//!
//! Writers (init/update, add, reset) hold the write half of a
//! `tokio::sync::RwLock` for the whole operation; retrieval holds the read
//! half while it searches, so queries never see a half-applied update.
//! Nothing coordinates separate processes writing the same index.

use anyhow::Result;
use async_trait::async_trait;
use rulebook_rag_core::embedding::Embedder;
use rulebook_rag_core::error::RagError;
use rulebook_rag_core::index::{Retriever, VectorIndex};
use rulebook_rag_core::models::Chunk;
use rulebook_rag_core::splitter::DocumentSplitter;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::ledger::ProcessingLedger;
use crate::scanner::{is_markdown, list_markdown_files, normalize_file_name, unique_file_names};
use crate::sqlite_index::SqliteIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Absent,
    Present,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub state: IndexState,
    pub chunk_count: usize,
    pub document_count: usize,
    pub processed_file_count: usize,
    pub last_update: Option<String>,
    pub index_path: PathBuf,
    pub index_size_bytes: u64,
}

/// Outcome of [`IndexManager::add_specific_files`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AddReport {
    pub added: Vec<String>,
    pub chunks: usize,
    /// Files that were rejected or failed, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

pub struct IndexManager {
    config: Config,
    embedder: Arc<dyn Embedder>,
    splitter: DocumentSplitter,
    handle: RwLock<Option<Arc<SqliteIndex>>>,
}

impl IndexManager {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        let splitter = DocumentSplitter::new(config.splitter_config());
        Self {
            config,
            embedder,
            splitter,
            handle: RwLock::new(None),
        }
    }

    /// Construct with the embedder named in the config.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        Ok(Self::new(config, embedder))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> IndexState {
        if self.config.index_path().exists() {
            IndexState::Present
        } else {
            IndexState::Absent
        }
    }

    /// Index new and changed documents, creating the index when absent.
    ///
    /// Returns `None` when there is nothing to query: no markdown files
    /// and no existing index.
    pub async fn init_or_update(&self) -> Result<Option<Arc<SqliteIndex>>> {
        let data_dir = &self.config.paths.data_dir;
        if !data_dir.exists() {
            return Err(RagError::DataSourceMissing(data_dir.clone()).into());
        }

        let mut guard = self.handle.write().await;
        let files = list_markdown_files(data_dir)?;
        info!(files = files.len(), dir = %data_dir.display(), "scanned document root");

        if files.is_empty() {
            if self.state() == IndexState::Present {
                warn!("no markdown files found; keeping existing index");
                return Ok(Some(self.load_locked(&mut guard).await?));
            }
            warn!("no markdown files found and no index present");
            return Ok(None);
        }

        match self.state() {
            IndexState::Absent => {
                let index = self.build_fresh(&files).await?;
                *guard = Some(index.clone());
                Ok(Some(index))
            }
            IndexState::Present => {
                let index = self.load_locked(&mut guard).await?;
                let mut ledger = ProcessingLedger::load(&self.config.ledger_path());
                let changed = ledger.diff(&files);
                if changed.is_empty() {
                    info!("index is up to date");
                    return Ok(Some(index));
                }

                info!(files = changed.len(), "updating index with new or changed files");
                let (processed, chunks) = self.index_files(&index, &changed).await;
                if !processed.is_empty() {
                    ledger.commit(&processed)?;
                }
                info!(files = processed.len(), chunks, "index updated");
                Ok(Some(index))
            }
        }
    }

    /// Split every file and build a new index from all of the chunks.
    async fn build_fresh(&self, files: &[PathBuf]) -> Result<Arc<SqliteIndex>> {
        let mut processed = Vec::with_capacity(files.len());
        let mut chunks: Vec<Chunk> = Vec::new();
        for path in files {
            match self.read_and_split(path) {
                Ok(doc_chunks) => {
                    chunks.extend(doc_chunks);
                    processed.push(path.clone());
                }
                Err(e) => warn!(error = %e, "skipping file"),
            }
        }

        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus { files: files.len() }.into());
        }

        info!(files = processed.len(), chunks = chunks.len(), "building new index");
        let index = SqliteIndex::create(
            &self.config.index_path(),
            self.embedder.clone(),
            self.config.embedding.batch_size,
        )
        .await?;

        if let Err(e) = index.add(&chunks).await {
            index.close().await;
            remove_index_files(&self.config.index_path());
            return Err(e);
        }

        // A fresh index starts a fresh ledger.
        let mut ledger = ProcessingLedger::load(&self.config.ledger_path());
        ledger.clear();
        ledger.commit(&processed)?;
        Ok(Arc::new(index))
    }

    /// Replace each document's chunks in `index`. A document that fails is
    /// logged and left out of the returned list.
    async fn index_files(&self, index: &SqliteIndex, files: &[PathBuf]) -> (Vec<PathBuf>, usize) {
        let mut processed = Vec::with_capacity(files.len());
        let mut total = 0;

        for path in files {
            let chunks = match self.read_and_split(path) {
                Ok(chunks) => chunks,
                Err(e) => {
                    warn!(error = %e, "skipping file");
                    continue;
                }
            };
            let name = normalize_file_name(path);
            match index.replace_document(&name, &chunks).await {
                Ok(n) => {
                    total += n;
                    processed.push(path.clone());
                }
                Err(e) => warn!(document = %name, error = %e, "failed to index document"),
            }
        }

        (processed, total)
    }

    fn read_and_split(&self, path: &Path) -> Result<Vec<Chunk>, RagError> {
        let text = std::fs::read_to_string(path).map_err(|source| RagError::Compute {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.splitter.split(&text, &normalize_file_name(path)))
    }

    /// Return the cached handle, opening the index if needed.
    async fn load_locked(&self, slot: &mut Option<Arc<SqliteIndex>>) -> Result<Arc<SqliteIndex>> {
        if let Some(index) = slot.as_ref() {
            return Ok(index.clone());
        }
        if self.state() == IndexState::Absent {
            return Err(RagError::IndexUnavailable.into());
        }
        let index = Arc::new(
            SqliteIndex::open(
                &self.config.index_path(),
                self.embedder.clone(),
                self.config.embedding.batch_size,
            )
            .await?,
        );
        *slot = Some(index.clone());
        Ok(index)
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if self.handle.read().await.is_some() {
            return Ok(());
        }
        let mut guard = self.handle.write().await;
        self.load_locked(&mut guard).await?;
        Ok(())
    }

    /// Append chunks, creating the index if it is absent.
    ///
    /// Not idempotent; the ledger diff is what prevents duplicates.
    pub async fn add_documents(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut guard = self.handle.write().await;
        let index = self.load_or_create_locked(&mut guard).await?;
        index.add(chunks).await
    }

    /// Index the given files regardless of the ledger and record them in it.
    ///
    /// Paths that do not exist or are not markdown are reported as
    /// skipped. A document already in the index has its chunks replaced.
    pub async fn add_specific_files(&self, paths: &[PathBuf]) -> Result<AddReport> {
        let mut report = AddReport::default();
        let mut valid = Vec::new();
        for path in paths {
            if !path.is_file() {
                report.skipped.push((path.clone(), "file not found".to_string()));
            } else if !is_markdown(path) {
                report.skipped.push((path.clone(), "not a markdown file".to_string()));
            } else {
                valid.push(path.clone());
            }
        }
        let unique = unique_file_names(valid.clone());
        for path in &valid {
            if !unique.contains(path) {
                report.skipped.push((path.clone(), "duplicate file name".to_string()));
            }
        }
        let valid = unique;
        if valid.is_empty() {
            return Ok(report);
        }

        let mut guard = self.handle.write().await;
        let index = self.load_or_create_locked(&mut guard).await?;
        let (processed, chunks) = self.index_files(&index, &valid).await;

        for path in &valid {
            if !processed.contains(path) {
                report.skipped.push((path.clone(), "failed to index".to_string()));
            }
        }
        if !processed.is_empty() {
            let mut ledger = ProcessingLedger::load(&self.config.ledger_path());
            ledger.commit(&processed)?;
        }

        report.added = processed.iter().map(|p| normalize_file_name(p)).collect();
        report.chunks = chunks;
        info!(files = report.added.len(), chunks, "added files to index");
        Ok(report)
    }

    async fn load_or_create_locked(
        &self,
        slot: &mut Option<Arc<SqliteIndex>>,
    ) -> Result<Arc<SqliteIndex>> {
        if self.state() == IndexState::Absent && slot.is_none() {
            let index = Arc::new(
                SqliteIndex::create(
                    &self.config.index_path(),
                    self.embedder.clone(),
                    self.config.embedding.batch_size,
                )
                .await?,
            );
            *slot = Some(index.clone());
            return Ok(index);
        }
        self.load_locked(slot).await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let state = self.state();
        let ledger = ProcessingLedger::load(&self.config.ledger_path());
        let index_path = self.config.index_path();

        let (chunk_count, document_count) = match state {
            IndexState::Absent => (0, 0),
            IndexState::Present => {
                self.ensure_loaded().await?;
                let guard = self.handle.read().await;
                match guard.as_ref() {
                    Some(index) => (index.count().await?, index.document_count().await?),
                    None => (0, 0),
                }
            }
        };

        Ok(IndexStats {
            state,
            chunk_count,
            document_count,
            processed_file_count: ledger.len(),
            last_update: ledger.last_update().map(str::to_string),
            index_size_bytes: index_size(&index_path),
            index_path,
        })
    }

    /// Delete the index and the ledger. Handles obtained earlier stop
    /// working; fetch a new one after the next init.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.handle.write().await;
        if let Some(index) = guard.take() {
            index.close().await;
        }

        let index_dir = &self.config.paths.index_dir;
        if index_dir.exists() {
            std::fs::remove_dir_all(index_dir)?;
            info!(dir = %index_dir.display(), "index removed");
        }
        Ok(())
    }
}

#[async_trait]
impl Retriever for IndexManager {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        self.ensure_loaded().await?;
        let guard = self.handle.read().await;
        let index = guard.as_ref().ok_or(RagError::IndexUnavailable)?;
        index.search(query, k).await
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

fn remove_index_files(path: &Path) {
    for p in [path.to_path_buf(), sidecar(path, "-wal"), sidecar(path, "-shm")] {
        if p.exists() {
            if let Err(e) = std::fs::remove_file(&p) {
                warn!(path = %p.display(), error = %e, "failed to remove index file");
            }
        }
    }
}

/// On-disk size of the index including its WAL.
fn index_size(path: &Path) -> u64 {
    [path.to_path_buf(), sidecar(path, "-wal")]
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum()
}
