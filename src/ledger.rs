//! Processing ledger: which documents were indexed at which content hash.
//!
//! Persisted as `processed_files.json` next to the index:
//!
//! ```json
//! {
//!   "players-handbook.md": {
//!     "hash": "9e107d9d372bb6826bd81d3542a419d6",
//!     "processed": "2025-03-01 18:22:05"
//!   }
//! }
//! ```
//!
//! An entry is written only after a document's chunks are in the index, so
//! a document that failed is picked up again on the next run.

use anyhow::{Context, Result};
use chrono::Local;
use rulebook_rag_core::error::RagError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::scanner::{fingerprint, normalize_file_name};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Hex MD5 of the document bytes.
    pub hash: String,
    /// Local time of the last successful indexing.
    pub processed: String,
}

#[derive(Debug, Clone)]
pub struct ProcessingLedger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl ProcessingLedger {
    /// Load the ledger at `path`.
    ///
    /// A missing file is an empty ledger. So is a corrupt one, after a
    /// warning.
    pub fn load(path: &Path) -> Self {
        let entries = match read_entries(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring processing ledger");
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    /// Forget every entry (in memory only; call [`save`](Self::save) or
    /// [`commit`](Self::commit) to persist).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Most recent `processed` timestamp, if any.
    pub fn last_update(&self) -> Option<&str> {
        // The timestamp format sorts lexicographically.
        self.entries.values().map(|e| e.processed.as_str()).max()
    }

    /// Files that are new or whose content changed since they were
    /// recorded, in input order. Files that cannot be read are logged and
    /// left out.
    pub fn diff(&self, files: &[PathBuf]) -> Vec<PathBuf> {
        files
            .iter()
            .filter(|path| {
                let hash = match fingerprint(path) {
                    Ok(hash) => hash,
                    Err(e) => {
                        warn!(error = %e, "skipping file");
                        return false;
                    }
                };
                match self.entries.get(&normalize_file_name(path)) {
                    Some(entry) => entry.hash != hash,
                    None => true,
                }
            })
            .cloned()
            .collect()
    }

    /// Record `files` as processed now and persist the ledger.
    ///
    /// Hashes are recomputed here so the entry reflects the bytes on disk
    /// at commit time. Returns how many entries were written.
    pub fn commit(&mut self, files: &[PathBuf]) -> Result<usize> {
        let now = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let mut written = 0;
        for path in files {
            match fingerprint(path) {
                Ok(hash) => {
                    self.entries.insert(
                        normalize_file_name(path),
                        LedgerEntry {
                            hash,
                            processed: now.clone(),
                        },
                    );
                    written += 1;
                }
                Err(e) => warn!(error = %e, "not recording file in ledger"),
            }
        }
        self.save()?;
        Ok(written)
    }

    /// Write the ledger atomically: temp file in the same directory, then
    /// rename over the old one.
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let json = serde_json::to_string_pretty(&self.entries)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write ledger {}", self.path.display()))?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, LedgerEntry>, RagError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(RagError::LedgerCorrupt(e.to_string())),
    };
    serde_json::from_str(&content).map_err(|e| RagError::LedgerCorrupt(e.to_string()))
}
