//! PDF manipulation module
//!
//! [`PdfBackend`] is the seam between the assembly run and the PDF library.
//! [`LopdfBackend`] implements it on top of `lopdf`.

pub mod merge;
pub mod metadata;
pub mod stamp;

use crate::error::Result;
use crate::layout::{Anchor, PageDimensions};

// Re-export commonly used items
pub use merge::LopdfBackend;
pub use metadata::{count_pages, count_pages_in, extract_metadata, PdfMetadata};

/// Visible page area, in PDF points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    /// Lower-left corner
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageBox {
    pub fn from_dimensions(dims: PageDimensions) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: dims.width,
            height: dims.height,
        }
    }

    pub fn dimensions(&self) -> PageDimensions {
        PageDimensions {
            width: self.width,
            height: self.height,
        }
    }
}

/// What appending one source document produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppendedDocument {
    pub page_count: u32,
    /// Box of the document's first page, used to size a following blank page
    pub first_page: PageBox,
}

/// PDF operations needed to assemble a merged document
pub trait PdfBackend {
    /// Append every page of the PDF in `bytes`
    fn append_document(&mut self, bytes: &[u8]) -> Result<AppendedDocument>;

    /// Append one empty page of the given size
    fn append_blank_page(&mut self, page: PageBox) -> Result<()>;

    /// Boxes of all pages appended so far, in order
    fn page_boxes(&self) -> Vec<PageBox>;

    /// Draw `label` on page `page_index` (0-based) at `anchor`
    ///
    /// `anchor` is relative to the page box origin.
    fn draw_page_number(&mut self, page_index: usize, anchor: Anchor, label: &str, font_size: f32) -> Result<()>;

    /// Serialize the merged document
    fn finish(self) -> Result<Vec<u8>>
    where
        Self: Sized;
}
