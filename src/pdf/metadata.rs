//! PDF metadata extraction

use std::path::Path;
use lopdf::{Document, Object};
use crate::error::{Error, Result};

/// Read the Count field from the root Pages dictionary
///
/// Producers sometimes write a wrong Count, so this is only used to flag
/// disagreements with the walked page tree.
fn declared_page_count(doc: &Document) -> Option<usize> {
    let catalog = doc.catalog().ok()?;
    let pages_id = match catalog.get(b"Pages").ok()? {
        Object::Reference(id) => *id,
        _ => return None,
    };
    match doc.get_dictionary(pages_id).ok()?.get(b"Count").ok()? {
        Object::Integer(n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

/// Number of pages reachable through the page tree
///
/// This is the count the merge copies, so it is the one registered.
pub fn page_count_of(doc: &Document) -> usize {
    let walked = doc.get_pages().len();
    if let Some(declared) = declared_page_count(doc) {
        if declared != walked {
            tracing::warn!(declared, walked, "page tree Count disagrees with reachable pages");
        }
    }
    walked
}

/// PDF metadata
#[derive(Debug, Clone)]
pub struct PdfMetadata {
    /// Number of pages in the PDF
    pub page_count: usize,
    /// Document title (if present)
    pub title: Option<String>,
    /// Document author (if present)
    pub author: Option<String>,
}

fn info_string(doc: &Document, key: &[u8]) -> Option<String> {
    let info_id = match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => *id,
        _ => return None,
    };
    let bytes = doc.get_dictionary(info_id).ok()?.get(key).ok()?.as_str().ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Extract metadata from a PDF file
pub fn extract_metadata(path: &Path) -> Result<PdfMetadata> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let page_count = page_count_of(&doc);

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(PdfMetadata {
        page_count,
        title: info_string(&doc, b"Title"),
        author: info_string(&doc, b"Author"),
    })
}

/// Count the number of pages in a PDF file
pub fn count_pages(path: &Path) -> Result<u32> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let doc = Document::load(path)?;
    let page_count = page_count_of(&doc);

    if page_count == 0 {
        return Err(Error::EmptyPdf(path.to_path_buf()));
    }

    Ok(page_count as u32)
}

/// Count the pages of an in-memory PDF
pub fn count_pages_in(bytes: &[u8]) -> Result<u32> {
    let doc = Document::load_mem(bytes)?;
    let page_count = page_count_of(&doc);
    if page_count == 0 {
        return Err(Error::InvalidInput("PDF has no pages".to_string()));
    }
    Ok(page_count as u32)
}
