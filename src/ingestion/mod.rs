//! Document ingestion: loading files into normalized text units and
//! splitting them into bounded passages.
//!
//! The module provides two adapters:
//!
//! * [`load_document`] — dispatches a file path by extension to one of the
//!   parsers in the closed [`parsers::ParserKind`] registry and returns
//!   normalized [`Document`]s.
//! * [`chunk::TextChunker`] — splits documents into bounded-size
//!   [`chunk::Passage`]s with zero overlap, preserving source metadata.
//!
//! Parsing is blocking work (file reads, XML and PDF decoding), so
//! [`load_document`] offloads it to the blocking thread pool and the rest
//! of the crate stays async.

pub mod chunk;
pub mod parsers;

use std::ffi::OsStr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::task;

use crate::types::ParlorError;

pub use chunk::{Passage, TextChunker};
pub use parsers::ParserKind;

/// A normalized unit of loaded text plus its provenance.
///
/// Documents are immutable once produced. Multi-page formats (PDF, slide
/// decks) yield one document per page so page numbers survive into
/// citations; single-body formats yield one document with no page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Extracted text content.
    pub content: String,
    /// Source path the document was loaded from.
    pub source: String,
    /// Page or slide number within the source, when the format has pages.
    pub page: Option<u32>,
}

impl Document {
    /// Creates a document without a page number.
    #[must_use]
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page: None,
        }
    }

    /// Creates a document for one page of a paged source.
    #[must_use]
    pub fn with_page(content: impl Into<String>, source: impl Into<String>, page: u32) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            page: Some(page),
        }
    }
}

/// Load a file into normalized documents, dispatching by extension.
///
/// Supported extensions are fixed by the [`ParserKind`] registry:
/// `docx`/`doc`, `pdf`, `xlsx`/`xls`, `txt`, `html`, `pptx`, and `py`.
/// Anything else fails with [`ParlorError::UnsupportedFormat`], aborting
/// ingestion of that file only.
///
/// Each call is independent and idempotent: the same path yields
/// equivalent output.
///
/// # Errors
///
/// [`ParlorError::UnsupportedFormat`] for unrecognized extensions,
/// [`ParlorError::Parse`] when content extraction fails, and
/// [`ParlorError::Io`] for filesystem failures.
pub async fn load_document(path: impl AsRef<Path>) -> Result<Vec<Document>, ParlorError> {
    let path = path.as_ref().to_path_buf();
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let kind =
        ParserKind::from_extension(&extension).ok_or(ParlorError::UnsupportedFormat { extension })?;

    tracing::debug!(path = %path.display(), kind = ?kind, "loading document");

    task::spawn_blocking(move || kind.parse(&path))
        .await
        .map_err(|err| ParlorError::Parse(format!("parser task failed: {err}")))?
}
