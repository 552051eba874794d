//! Context formatting and source citations.
//!
//! Retrieved chunks are handed to the model with an inline header naming
//! their document and page, so answers can cite them:
//!
//! ```text
//! [SOURCE: phb.md, Page: 241]
//! A bright streak flashes from your pointing finger...
//!
//! ---
//!
//! [SOURCE: phb.md, Page: 242]
//! ...
//! ```

use std::collections::HashSet;

use crate::models::{Chunk, SourceCitation};

/// Separator placed between formatted chunks.
pub const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// Excerpt length, in characters, kept on each citation.
pub const EXCERPT_CHARS: usize = 120;

/// Format retrieved chunks into a context block and collect their
/// citations, deduplicated by `(file, page)`.
pub fn build_context(chunks: &[Chunk]) -> (String, Vec<SourceCitation>) {
    let context = chunks
        .iter()
        .map(|c| {
            format!(
                "[SOURCE: {}, Page: {}]\n{}",
                c.document_name, c.page_number, c.text
            )
        })
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);

    let sources = dedup_sources(chunks.iter().map(citation));
    (context, sources)
}

/// Derive a citation from a chunk.
pub fn citation(chunk: &Chunk) -> SourceCitation {
    SourceCitation {
        file_name: chunk.document_name.clone(),
        page_number: chunk.page_number,
        section_path: chunk.section_path.clone(),
        content_excerpt: excerpt(&chunk.text, EXCERPT_CHARS),
    }
}

/// Keep the first citation for each `(file, page)` pair, preserving order.
pub fn dedup_sources<I>(sources: I) -> Vec<SourceCitation>
where
    I: IntoIterator<Item = SourceCitation>,
{
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    sources
        .into_iter()
        .filter(|s| {
            let (file, page) = s.key();
            seen.insert((file.to_string(), page))
        })
        .collect()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}…", head)
    } else {
        text.to_string()
    }
}
