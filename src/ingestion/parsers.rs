//! Format-specific document parsers behind a closed registry.
//!
//! [`ParserKind`] is the capability table for ingestion: every supported
//! file extension maps to exactly one variant, and dispatch is an
//! exhaustive `match`. Adding a format means adding a variant here — there
//! is no dynamic, configuration-named construction.
//!
//! Office formats (`docx`, `xlsx`, `pptx`) are ZIP containers of XML
//! parts; text is pulled out of the relevant elements with a streaming XML
//! reader. PDFs yield one [`Document`] per page so page numbers survive
//! into citations.

use std::fs;
use std::io::Read;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use scraper::{Html, Selector};

use super::Document;
use crate::types::ParlorError;

/// The closed set of supported document parsers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserKind {
    /// Word documents (`.docx`, `.doc`).
    Word,
    /// PDF documents, one document per page.
    Pdf,
    /// Excel workbooks (`.xlsx`, `.xls`).
    Spreadsheet,
    /// Plain text files (`.txt`).
    PlainText,
    /// HTML pages (`.html`).
    Html,
    /// PowerPoint decks (`.pptx`), one document per slide.
    Slides,
    /// Python source files (`.py`).
    PythonSource,
}

impl ParserKind {
    /// Resolve a lowercase file extension against the registry.
    ///
    /// Returns `None` for extensions outside the supported set; callers
    /// turn that into [`ParlorError::UnsupportedFormat`].
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "docx" | "doc" => Some(Self::Word),
            "pdf" => Some(Self::Pdf),
            "xlsx" | "xls" => Some(Self::Spreadsheet),
            "txt" => Some(Self::PlainText),
            "html" => Some(Self::Html),
            "pptx" => Some(Self::Slides),
            "py" => Some(Self::PythonSource),
            _ => None,
        }
    }

    /// Parse the file at `path` into normalized documents.
    ///
    /// Blocking: callers are expected to run this on the blocking pool
    /// (see [`super::load_document`]).
    pub fn parse(self, path: &Path) -> Result<Vec<Document>, ParlorError> {
        let source = path.display().to_string();
        match self {
            Self::PlainText | Self::PythonSource => parse_plain(path, &source),
            Self::Html => parse_html(path, &source),
            Self::Pdf => parse_pdf(path, &source),
            Self::Word => parse_word(path, &source),
            Self::Spreadsheet => parse_spreadsheet(path, &source),
            Self::Slides => parse_slides(path, &source),
        }
    }
}

fn parse_plain(path: &Path, source: &str) -> Result<Vec<Document>, ParlorError> {
    let content = fs::read_to_string(path)?;
    Ok(vec![Document::new(content, source)])
}

fn parse_html(path: &Path, source: &str) -> Result<Vec<Document>, ParlorError> {
    let raw = fs::read_to_string(path)?;
    let html = Html::parse_document(&raw);
    let body = Selector::parse("body")
        .map_err(|err| ParlorError::Parse(format!("body selector: {err}")))?;

    let text: Vec<String> = match html.select(&body).next() {
        Some(body) => body
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        None => html
            .root_element()
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    };

    Ok(vec![Document::new(text.join("\n"), source)])
}

fn parse_pdf(path: &Path, source: &str) -> Result<Vec<Document>, ParlorError> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|err| ParlorError::Parse(format!("pdf extraction: {err}")))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(idx, content)| Document::with_page(content, source, idx as u32 + 1))
        .collect())
}

fn parse_word(path: &Path, source: &str) -> Result<Vec<Document>, ParlorError> {
    let xml = read_zip_entry(path, "word/document.xml")?;
    let content = office_xml_text(&xml, b"w:t", Some(b"w:p"))?;
    Ok(vec![Document::new(content, source)])
}

fn parse_spreadsheet(path: &Path, source: &str) -> Result<Vec<Document>, ParlorError> {
    let xml = read_zip_entry(path, "xl/sharedStrings.xml")?;
    let content = office_xml_text(&xml, b"t", Some(b"si"))?;
    Ok(vec![Document::new(content, source)])
}

fn parse_slides(path: &Path, source: &str) -> Result<Vec<Document>, ParlorError> {
    let file = fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| ParlorError::Parse(format!("zip open: {err}")))?;

    // Slide parts are named ppt/slides/slideN.xml; sort numerically so
    // slide10 follows slide9.
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| slide_number(name).map(|n| (n, name.to_string())))
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let mut documents = Vec::with_capacity(slides.len());
    for (number, name) in slides {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|err| ParlorError::Parse(format!("zip entry {name}: {err}")))?
            .read_to_string(&mut xml)?;
        let content = office_xml_text(&xml, b"a:t", None)?;
        documents.push(Document::with_page(content, source, number));
    }

    Ok(documents)
}

fn slide_number(entry_name: &str) -> Option<u32> {
    let rest = entry_name.strip_prefix("ppt/slides/slide")?;
    rest.strip_suffix(".xml")?.parse().ok()
}

fn read_zip_entry(path: &Path, entry: &str) -> Result<String, ParlorError> {
    let file = fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| ParlorError::Parse(format!("zip open: {err}")))?;
    let mut xml = String::new();
    archive
        .by_name(entry)
        .map_err(|err| ParlorError::Parse(format!("zip entry {entry}: {err}")))?
        .read_to_string(&mut xml)?;
    Ok(xml)
}

/// Collect character data inside `text_element` tags, inserting a newline
/// at the close of each `break_element` (paragraph, shared-string item).
fn office_xml_text(
    xml: &str,
    text_element: &[u8],
    break_element: Option<&[u8]>,
) -> Result<String, ParlorError> {
    let mut reader = Reader::from_str(xml);
    let mut inside_text = false;
    let mut out = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == text_element => inside_text = true,
            Ok(Event::End(e)) if e.name().as_ref() == text_element => inside_text = false,
            Ok(Event::End(e)) => {
                if break_element.is_some_and(|b| e.name().as_ref() == b)
                    && !out.ends_with('\n')
                    && !out.is_empty()
                {
                    out.push('\n');
                }
            }
            Ok(Event::Text(t)) if inside_text => {
                let text = t
                    .unescape()
                    .map_err(|err| ParlorError::Parse(format!("xml text: {err}")))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(ParlorError::Parse(format!("xml parse: {err}"))),
            _ => {}
        }
    }

    Ok(out)
}
