//! Core data models shared by the splitter, the index and the query
//! orchestrator.

use serde::{Deserialize, Serialize};

/// Separator used when joining heading titles into a section path.
pub const SECTION_SEPARATOR: &str = " > ";

/// The atomic retrievable unit stored in the vector index.
///
/// Created by the [splitter](crate::splitter) and immutable afterwards.
/// The index assigns its own internal identifier on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Normalized file name of the source document (e.g. `players-handbook.md`).
    pub document_name: String,
    /// 1-based page number within the document.
    pub page_number: u32,
    /// Enclosing headings joined with `" > "`; empty when the text sits
    /// outside any heading.
    pub section_path: String,
    /// Character count of `text`.
    pub chunk_size: usize,
}

impl Chunk {
    pub fn new(text: String, document_name: &str, page_number: u32, section_path: String) -> Self {
        let chunk_size = text.chars().count();
        Self {
            text,
            document_name: document_name.to_string(),
            page_number,
            section_path,
            chunk_size,
        }
    }
}

/// A citation shown alongside an answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub file_name: String,
    pub page_number: u32,
    pub section_path: String,
    pub content_excerpt: String,
}

impl SourceCitation {
    /// Key used to deduplicate citations for display.
    pub fn key(&self) -> (&str, u32) {
        (self.file_name.as_str(), self.page_number)
    }
}

/// One answered sub-question of a decomposed query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestionRecord {
    pub question: String,
    pub answer: String,
}
