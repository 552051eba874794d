//! Library-level tests of the index lifecycle, using the offline hashing
//! embedder so no model server is needed.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use rulebook_rag::config::Config;
use rulebook_rag::index_manager::{IndexManager, IndexState};
use rulebook_rag::ledger::ProcessingLedger;
use rulebook_rag::scanner::fingerprint;
use rulebook_rag_core::embedding::{Embedder, HashingEmbedder};
use rulebook_rag_core::error::RagError;
use rulebook_rag_core::index::Retriever;
use tempfile::TempDir;

fn manager_for(root: &Path) -> IndexManager {
    let mut config = Config::default();
    config.paths.data_dir = root.join("data");
    config.paths.index_dir = root.join("storage");
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;
    IndexManager::new(config, Arc::new(HashingEmbedder::new(128)))
}

fn write_corpus(root: &Path) {
    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(
        data.join("phb.md"),
        "# Spells\n## Fireball\nFireball deals fire damage in a twenty foot sphere.\n---\n# Conditions\n## Grappled\nA grappled creature's speed becomes zero.",
    )
    .unwrap();
    fs::write(
        data.join("mm.md"),
        "# Goblin\nGoblins are small sneaky humanoids.",
    )
    .unwrap();
}

#[tokio::test]
async fn test_first_run_indexes_everything_and_commits_ledger() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let manager = manager_for(tmp.path());

    let handle = manager.init_or_update().await.unwrap();
    assert!(handle.is_some());
    assert_eq!(manager.state(), IndexState::Present);

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.chunk_count, 3);
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.processed_file_count, 2);
    assert!(stats.last_update.is_some());
    assert!(stats.index_size_bytes > 0);
}

#[tokio::test]
async fn test_retrieval_returns_page_and_section_metadata() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let manager = manager_for(tmp.path());
    manager.init_or_update().await.unwrap();

    let hits = manager.retrieve("grappled creature speed", 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document_name, "phb.md");
    assert_eq!(hits[0].page_number, 2);
    assert_eq!(hits[0].section_path, "Conditions > Grappled");
}

#[tokio::test]
async fn test_unchanged_corpus_is_not_reindexed() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let manager = manager_for(tmp.path());
    manager.init_or_update().await.unwrap();
    manager.init_or_update().await.unwrap();

    assert_eq!(manager.stats().await.unwrap().chunk_count, 3);
}

#[tokio::test]
async fn test_changed_and_new_files_are_indexed_incrementally() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let manager = manager_for(tmp.path());
    manager.init_or_update().await.unwrap();

    let data = tmp.path().join("data");
    fs::write(
        data.join("mm.md"),
        "# Goblin\nGoblins are small sneaky humanoids.\n---\n# Orc\nOrcs are fierce.",
    )
    .unwrap();
    fs::write(data.join("dmg.md"), "# Traps\nPit traps hide under floors.").unwrap();

    let ledger_path = tmp.path().join("storage/processed_files.json");
    let before = ProcessingLedger::load(&ledger_path);
    let changed = before.diff(&rulebook_rag::scanner::list_markdown_files(&data).unwrap());
    assert_eq!(changed.len(), 2);

    manager.init_or_update().await.unwrap();
    let stats = manager.stats().await.unwrap();
    // phb: 2, mm: 2 (old chunk replaced), dmg: 1
    assert_eq!(stats.chunk_count, 5);
    assert_eq!(stats.processed_file_count, 3);

    let after = ProcessingLedger::load(&ledger_path);
    assert_ne!(
        before.get("mm.md").unwrap().hash,
        after.get("mm.md").unwrap().hash
    );
    assert_eq!(
        before.get("phb.md").unwrap().hash,
        after.get("phb.md").unwrap().hash
    );
}

#[tokio::test]
async fn test_missing_root_is_data_source_missing() {
    let tmp = TempDir::new().unwrap();
    let err = manager_for(tmp.path()).init_or_update().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RagError>(),
        Some(RagError::DataSourceMissing(_))
    ));
}

#[tokio::test]
async fn test_blank_documents_are_empty_corpus() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(data.join("blank.md"), "\n\n---\n   \n").unwrap();

    let manager = manager_for(tmp.path());
    let err = manager.init_or_update().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RagError>(),
        Some(RagError::EmptyCorpus { files: 1 })
    ));
    assert_eq!(manager.state(), IndexState::Absent);
    assert!(!tmp.path().join("storage/processed_files.json").exists());
}

#[tokio::test]
async fn test_unreadable_file_is_skipped_and_not_committed() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    fs::write(tmp.path().join("data/binary.md"), [0xff, 0xfe, 0x00, 0x81]).unwrap();

    let manager = manager_for(tmp.path());
    manager.init_or_update().await.unwrap();

    let ledger = ProcessingLedger::load(&tmp.path().join("storage/processed_files.json"));
    assert_eq!(ledger.len(), 2);
    assert!(ledger.get("binary.md").is_none());
}

#[tokio::test]
async fn test_reset_after_indexing_two_files() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let manager = manager_for(tmp.path());
    let handle = manager.init_or_update().await.unwrap().unwrap();

    manager.reset().await.unwrap();

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.state, IndexState::Absent);
    assert_eq!(stats.chunk_count, 0);
    assert_eq!(stats.document_count, 0);
    assert_eq!(stats.processed_file_count, 0);

    // The old handle was invalidated.
    use rulebook_rag_core::index::VectorIndex;
    assert!(handle.count().await.is_err());

    let err = manager.retrieve("fireball", 4).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RagError>(),
        Some(RagError::IndexUnavailable)
    ));

    // And the index can be rebuilt from scratch.
    manager.init_or_update().await.unwrap();
    assert_eq!(manager.stats().await.unwrap().chunk_count, 3);
}

/// Hashing embedder that can be switched to fail like an unreachable
/// model server.
struct SwitchableEmbedder {
    inner: HashingEmbedder,
    failing: AtomicBool,
}

#[async_trait]
impl Embedder for SwitchableEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("embedding server unreachable");
        }
        self.inner.embed(texts).await
    }
}

#[tokio::test]
async fn test_failed_update_keeps_old_chunks_and_retries() {
    let tmp = TempDir::new().unwrap();
    write_corpus(tmp.path());
    let embedder = Arc::new(SwitchableEmbedder {
        inner: HashingEmbedder::new(128),
        failing: AtomicBool::new(false),
    });
    let mut config = Config::default();
    config.paths.data_dir = tmp.path().join("data");
    config.paths.index_dir = tmp.path().join("storage");
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;
    let manager = IndexManager::new(config, embedder.clone());
    manager.init_or_update().await.unwrap();

    let ledger_path = tmp.path().join("storage/processed_files.json");
    let mm = tmp.path().join("data/mm.md");
    let old_hash = ProcessingLedger::load(&ledger_path).get("mm.md").unwrap().hash.clone();
    fs::write(&mm, "# Goblin\nGoblins are small sneaky humanoids.\n---\n# Orc\nOrcs are fierce.").unwrap();

    embedder.failing.store(true, Ordering::SeqCst);
    manager.init_or_update().await.unwrap();
    embedder.failing.store(false, Ordering::SeqCst);

    // The old goblin chunk survives and the ledger still holds the old hash.
    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.chunk_count, 3);
    assert_eq!(stats.document_count, 2);
    assert_eq!(ProcessingLedger::load(&ledger_path).get("mm.md").unwrap().hash, old_hash);

    // The next run picks the document up again.
    manager.init_or_update().await.unwrap();
    assert_eq!(manager.stats().await.unwrap().chunk_count, 4);
    assert_eq!(
        ProcessingLedger::load(&ledger_path).get("mm.md").unwrap().hash,
        fingerprint(&mm).unwrap()
    );
}

#[tokio::test]
async fn test_same_named_files_do_not_evict_each_other() {
    let tmp = TempDir::new().unwrap();
    let data = tmp.path().join("data");
    fs::create_dir_all(data.join("a")).unwrap();
    fs::create_dir_all(data.join("b")).unwrap();
    fs::write(data.join("a/rules.md"), "# Movement\nDifficult terrain costs double.").unwrap();
    fs::write(data.join("b/rules.md"), "# Resting\nA short rest lasts one hour.").unwrap();

    let manager = manager_for(tmp.path());
    for _ in 0..3 {
        manager.init_or_update().await.unwrap();
        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.chunk_count, 1);
        assert_eq!(stats.processed_file_count, 1);
    }

    let ledger = ProcessingLedger::load(&tmp.path().join("storage/processed_files.json"));
    assert_eq!(
        ledger.get("rules.md").unwrap().hash,
        fingerprint(&data.join("a/rules.md")).unwrap()
    );
    let hits = manager.retrieve("difficult terrain", 1).await.unwrap();
    assert!(hits[0].text.contains("Difficult terrain"));
}
