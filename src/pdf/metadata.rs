//! PDF page counting and document info

use std::path::Path;

use lopdf::{Document, Object};
use tracing::debug;

use crate::error::{Error, Result};

/// Read the Count field from the root Pages dictionary
fn declared_page_count(doc: &Document) -> Option<i64> {
    let catalog = doc.catalog().ok()?;
    let pages_id = catalog.get(b"Pages").and_then(Object::as_reference).ok()?;
    let pages = doc.get_dictionary(pages_id).ok()?;
    pages.get(b"Count").and_then(Object::as_i64).ok()
}

/// Number of leaf pages reachable through the page tree.
///
/// This is what the splitter can address, so it wins over the declared
/// Count when a damaged file disagrees with itself.
pub fn reachable_page_count(doc: &Document) -> usize {
    let reachable = doc.get_pages().len();
    if let Some(declared) = declared_page_count(doc) {
        if declared != reachable as i64 {
            debug!(declared, reachable, "page tree Count disagrees with reachable pages");
        }
    }
    reachable
}

/// Document information shown in page listings
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
}

fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info_id = doc.trailer.get(b"Info").and_then(Object::as_reference).ok()?;
    let info = doc.get_dictionary(info_id).ok()?;
    let bytes = info.get(key).and_then(Object::as_str).ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Read page count, title and author from a PDF file
pub fn read_document_info(path: &Path) -> Result<DocumentInfo> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let page_count = reachable_page_count(&doc);

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(DocumentInfo {
        page_count,
        title: info_string(&doc, b"Title"),
        author: info_string(&doc, b"Author"),
    })
}

/// Count the number of pages in a PDF file
pub fn count_pages(path: &Path) -> Result<usize> {
    read_document_info(path).map(|info| info.page_count)
}
