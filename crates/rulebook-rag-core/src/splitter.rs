//! Markdown document splitter.
//!
//! Turns one raw markdown document into an ordered list of [`Chunk`]s,
//! each stamped with the page it came from and the headings that enclose
//! it.
//!
//! # Algorithm
//!
//! 1. Split the document into pages on lines made of three or more
//!    hyphens (`---`). Page numbers follow split position: a blank page
//!    produces no chunks but still consumes its number.
//! 2. Within each page, split on ATX headings of levels 1–4. The heading
//!    context is a stack keyed by level, so a `##` heading replaces any
//!    previous `##`, `###` and `####` while keeping the enclosing `#`.
//!    Heading lines are not part of the section text, and `#` lines inside
//!    fenced code blocks are not headings.
//! 3. A section longer than twice `chunk_size` characters is cut into
//!    windows of at most `chunk_size` characters. Each window breaks at the
//!    last blank line it contains, else the last newline, else the last
//!    space, else a hard cut. The next window starts `chunk_overlap`
//!    characters before the previous cut.
//! 4. Every chunk gets the document name, page number, section path
//!    (`"Spells > Fireball"`) and its character count.
//!
//! # Example
//!
//! ```rust
//! use rulebook_rag_core::splitter::{DocumentSplitter, SplitterConfig};
//!
//! let splitter = DocumentSplitter::new(SplitterConfig::default());
//! let chunks = splitter.split("# Spells\n## Fireball\nDeals damage.", "phb.md");
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].section_path, "Spells > Fireball");
//! assert_eq!(chunks[0].page_number, 1);
//! ```

use tracing::debug;

use crate::models::{Chunk, SECTION_SEPARATOR};

/// Deepest heading level that opens a new section.
pub const MAX_HEADING_LEVEL: usize = 4;

/// Window sizing for oversized sections, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

/// Splits markdown documents into annotated chunks.
///
/// Splitting is a pure function of the text, the document name and the
/// configuration: identical input always yields an identical sequence.
#[derive(Debug, Clone)]
pub struct DocumentSplitter {
    config: SplitterConfig,
}

impl DocumentSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    /// Split `text` into chunks attributed to `document_name`.
    pub fn split(&self, text: &str, document_name: &str) -> Vec<Chunk> {
        let pages = split_pages(text);
        let mut chunks = Vec::new();

        for (index, page) in pages.iter().enumerate() {
            if page.trim().is_empty() {
                continue;
            }
            let page_number = (index + 1) as u32;

            for section in split_sections(page) {
                let section_path = section.headings.path();
                if section.text.chars().count() > self.config.chunk_size * 2 {
                    for piece in split_windows(
                        &section.text,
                        self.config.chunk_size,
                        self.config.chunk_overlap,
                    ) {
                        chunks.push(Chunk::new(
                            piece,
                            document_name,
                            page_number,
                            section_path.clone(),
                        ));
                    }
                } else {
                    chunks.push(Chunk::new(
                        section.text,
                        document_name,
                        page_number,
                        section_path,
                    ));
                }
            }
        }

        debug!(
            document = document_name,
            pages = pages.len(),
            chunks = chunks.len(),
            "split document"
        );
        chunks
    }
}

/// Split a document into pages on horizontal-rule lines.
///
/// The delimiter line itself belongs to no page. A rule on the very first
/// line does not split, so a leading `---` stays in page 1.
pub fn split_pages(text: &str) -> Vec<&str> {
    let mut pages = Vec::new();
    let mut page_start = 0;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        if line_start > 0 && is_page_break(line) {
            pages.push(&text[page_start..line_start]);
            page_start = offset;
        }
    }
    pages.push(&text[page_start..]);
    pages
}

fn is_page_break(line: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    line.len() >= 3 && line.bytes().all(|b| b == b'-')
}

/// Active headings, indexed by level - 1.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct HeadingStack([Option<String>; MAX_HEADING_LEVEL]);

impl HeadingStack {
    fn push(&mut self, level: usize, title: String) {
        for slot in &mut self.0[level - 1..] {
            *slot = None;
        }
        self.0[level - 1] = Some(title);
    }

    fn path(&self) -> String {
        self.0
            .iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }
}

#[derive(Debug)]
struct Section {
    headings: HeadingStack,
    text: String,
}

fn split_sections(page: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut headings = HeadingStack::default();
    let mut lines: Vec<&str> = Vec::new();
    let mut fence: Option<&'static str> = None;

    for line in page.lines() {
        let trimmed = line.trim_start();

        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            lines.push(line.trim_end());
            continue;
        }

        if let Some(marker) = fence_marker(trimmed) {
            fence = Some(marker);
            lines.push(line.trim_end());
            continue;
        }

        if let Some((level, title)) = parse_heading(trimmed) {
            flush_section(&mut sections, &headings, &mut lines);
            headings.push(level, title);
            continue;
        }

        lines.push(line.trim_end());
    }
    flush_section(&mut sections, &headings, &mut lines);

    sections
}

fn flush_section(sections: &mut Vec<Section>, headings: &HeadingStack, lines: &mut Vec<&str>) {
    let text = lines.join("\n");
    lines.clear();
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    sections.push(Section {
        headings: headings.clone(),
        text: text.to_string(),
    });
}

fn fence_marker(trimmed: &str) -> Option<&'static str> {
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

/// Parse `## Title` into `(2, "Title")`. Requires a space after the
/// hashes and a non-empty title.
fn parse_heading(trimmed: &str) -> Option<(usize, String)> {
    let level = trimmed.bytes().take_while(|b| *b == b'#').count();
    if level == 0 || level > MAX_HEADING_LEVEL {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let title = rest.trim();
    if title.is_empty() {
        return None;
    }
    Some((level, title.to_string()))
}

/// Cut `text` into overlapping windows of at most `size` characters.
///
/// Windows are trimmed; whitespace-only windows are dropped.
pub fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let overlap = overlap.min(size - 1);
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let cut = if end == chars.len() {
            end
        } else {
            find_break(&chars, start, end, overlap)
        };

        let piece: String = chars[start..cut].iter().collect();
        let piece = piece.trim();
        if !piece.is_empty() {
            windows.push(piece.to_string());
        }

        if cut >= chars.len() {
            break;
        }
        let next = cut.saturating_sub(overlap);
        start = if next > start { next } else { cut };
    }

    windows
}

/// Pick the cut position for the window `chars[start..end]`.
///
/// Only positions past `start + overlap` are considered so that the next
/// window always starts after the current one.
fn find_break(chars: &[char], start: usize, end: usize, overlap: usize) -> usize {
    let lo = (start + overlap + 1).min(end);

    let follows = |i: usize, c: char| chars[i - 1] == c;

    (lo..=end)
        .rev()
        .find(|&i| i >= start + 2 && follows(i, '\n') && follows(i - 1, '\n'))
        .or_else(|| (lo..=end).rev().find(|&i| follows(i, '\n')))
        .or_else(|| (lo..=end).rev().find(|&i| follows(i, ' ')))
        .unwrap_or(end)
}
