//! Markdown file discovery and content fingerprints.
//!
//! Discovery walks the document root recursively and keeps files whose
//! extension is `.md` or `.markdown`, case-insensitively. Results are
//! sorted so a run always sees files in the same order.

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use rulebook_rag_core::error::RagError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const MARKDOWN_GLOBS: &[&str] = &["**/*.md", "**/*.markdown"];

/// List markdown files under `root`.
///
/// A missing root yields an empty list; callers that must tell "missing"
/// from "empty" check the root themselves.
pub fn list_markdown_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let include_set = markdown_globset()?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if include_set.is_match(relative) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(unique_file_names(files))
}

/// Keep the first path for each ledger key. Documents are keyed by base
/// name, so a later file with the same name would overwrite the earlier
/// file's chunks and ledger entry; it is skipped with a warning instead.
pub fn unique_file_names(files: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut unique = Vec::with_capacity(files.len());
    for path in files {
        let name = normalize_file_name(&path);
        if let Some(kept) = seen.get(&name) {
            warn!(
                path = %path.display(),
                kept = %kept.display(),
                "skipping file with a duplicate name"
            );
            continue;
        }
        seen.insert(name, path.clone());
        unique.push(path);
    }
    unique
}

/// Whether `path` has a markdown extension.
pub fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md") || e.eq_ignore_ascii_case("markdown"))
        .unwrap_or(false)
}

/// Ledger key for a document: its base name with any path separators
/// stripped.
pub fn normalize_file_name(path: &Path) -> String {
    let raw = path.to_string_lossy();
    raw.rsplit(['/', '\\']).next().unwrap_or("").trim().to_string()
}

/// Hex MD5 digest of the file's bytes.
pub fn fingerprint(path: &Path) -> Result<String, RagError> {
    let bytes = std::fs::read(path).map_err(|source| RagError::Compute {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(fingerprint_bytes(&bytes))
}

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

fn markdown_globset() -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in MARKDOWN_GLOBS {
        builder.add(GlobBuilder::new(pattern).case_insensitive(true).build()?);
    }
    Ok(builder.build()?)
}
