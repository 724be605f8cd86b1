//! Bounded-size document splitting.
//!
//! [`TextChunker`] turns loaded [`Document`]s into [`Passage`]s capped at
//! a fixed character budget with zero overlap. Splitting prefers
//! paragraph boundaries and falls back to a hard character split for
//! oversized paragraphs. The concatenation of a document's passages
//! reproduces the document text exactly, in order, so nothing is lost or
//! duplicated between passages.

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Document;

/// Default passage budget, in characters.
pub const DEFAULT_MAX_CHARS: usize = 3000;

/// A bounded-size slice of a document's text plus inherited metadata.
///
/// Passages are the retrieval unit: they are embedded, stored, searched,
/// and cited. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// The passage text, at most the chunker's budget in characters.
    pub content: String,
    /// Source path inherited from the originating document.
    pub source: String,
    /// Page number inherited from the originating document, if any.
    pub page: Option<u32>,
    /// Zero-based position of this passage within its document.
    pub chunk_index: usize,
}

/// Deterministic splitter with a fixed character budget and no overlap.
#[derive(Clone, Debug)]
pub struct TextChunker {
    max_chars: usize,
    paragraph_break: Regex,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl TextChunker {
    /// Creates a chunker with the given character budget per passage.
    ///
    /// A budget of zero is clamped to one so splitting always terminates.
    #[must_use]
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
            // A blank line (possibly with stray spaces) separates paragraphs.
            paragraph_break: Regex::new(r"\n[ \t]*\n").expect("static regex"),
        }
    }

    /// The configured character budget.
    #[must_use]
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Splits documents into passages, preserving metadata on each one.
    ///
    /// Deterministic for fixed input and configuration. Documents with
    /// empty content produce no passages.
    #[must_use]
    pub fn split(&self, documents: &[Document]) -> Vec<Passage> {
        let mut passages = Vec::new();
        for document in documents {
            for (chunk_index, content) in self.split_text(&document.content).into_iter().enumerate()
            {
                passages.push(Passage {
                    content,
                    source: document.source.clone(),
                    page: document.page,
                    chunk_index,
                });
            }
        }
        passages
    }

    /// Splits one text into pieces whose concatenation equals the input.
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }

        // Segment at paragraph breaks, keeping each separator attached to
        // the preceding segment so reassembly is lossless.
        let mut segments: Vec<&str> = Vec::new();
        let mut last = 0;
        for sep in self.paragraph_break.find_iter(text) {
            segments.push(&text[last..sep.end()]);
            last = sep.end();
        }
        if last < text.len() {
            segments.push(&text[last..]);
        }

        let mut pieces: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for segment in segments {
            let segment_chars = segment.chars().count();
            if segment_chars > self.max_chars {
                if !current.is_empty() {
                    pieces.push(std::mem::take(&mut current));
                    current_chars = 0;
                }
                pieces.extend(self.hard_split(segment));
                continue;
            }
            if current_chars + segment_chars > self.max_chars && !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            current.push_str(segment);
            current_chars += segment_chars;
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        pieces
    }

    /// Splits an oversized segment at character boundaries.
    fn hard_split(&self, segment: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut piece = String::new();
        let mut count = 0usize;
        for c in segment.chars() {
            piece.push(c);
            count += 1;
            if count == self.max_chars {
                out.push(std::mem::take(&mut piece));
                count = 0;
            }
        }
        if !piece.is_empty() {
            out.push(piece);
        }
        out
    }
}
