//! PDF merging functionality using lopdf
//!
//! [`LopdfBackend`] builds the merged document incrementally: each source is
//! loaded, renumbered above the objects already present and its pages are
//! re-parented under one shared Pages node. Blank pages are plain page
//! dictionaries with a MediaBox and no content.

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use crate::error::{Error, Result};
use crate::layout::{Anchor, PageDimensions};
use crate::pdf::stamp;
use crate::pdf::{AppendedDocument, PageBox, PdfBackend};

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic Parent chains in broken files
const MAX_TREE_DEPTH: usize = 64;

/// [`PdfBackend`] backed by an in-memory `lopdf` document
#[derive(Debug)]
pub struct LopdfBackend {
    doc: Document,
    pages_id: ObjectId,
    pages: Vec<(ObjectId, PageBox)>,
    font_id: Option<ObjectId>,
}

impl Default for LopdfBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LopdfBackend {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        // Reserved up front so every page can point at it while appending
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            pages: Vec::new(),
            font_id: None,
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn font(&mut self) -> ObjectId {
        match self.font_id {
            Some(id) => id,
            None => {
                let id = stamp::use_helvetica_font(&mut self.doc);
                self.font_id = Some(id);
                id
            }
        }
    }
}

impl PdfBackend for LopdfBackend {
    fn append_document(&mut self, bytes: &[u8]) -> Result<AppendedDocument> {
        let mut source = Document::load_mem(bytes)?;

        // Renumber objects in this document to avoid conflicts
        source.renumber_objects_with(self.doc.max_id + 1);

        let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(Error::InvalidInput("PDF has no pages".to_string()));
        }

        let mut boxes = Vec::with_capacity(page_ids.len());
        for &page_id in &page_ids {
            // The source page tree is dropped below, so inherited attributes
            // have to live on the page itself from now on.
            flatten_inherited(&mut source, page_id)?;
            boxes.push(media_box(&source, page_id));
            source
                .get_dictionary_mut(page_id)?
                .set("Parent", Object::Reference(self.pages_id));
        }

        self.doc.max_id = source.max_id;
        self.doc.objects.extend(
            source
                .objects
                .into_iter()
                .filter(|(_, object)| !is_tree_root(object)),
        );

        let page_count = page_ids.len() as u32;
        let first_page = boxes[0];
        self.pages.extend(page_ids.into_iter().zip(boxes));

        tracing::debug!(page_count, total = self.pages.len(), "appended source document");
        Ok(AppendedDocument {
            page_count,
            first_page,
        })
    }

    fn append_blank_page(&mut self, page: PageBox) -> Result<()> {
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![
                page.x.into(),
                page.y.into(),
                (page.x + page.width).into(),
                (page.y + page.height).into(),
            ],
            "Resources" => Dictionary::new(),
        });
        self.pages.push((page_id, page));
        Ok(())
    }

    fn page_boxes(&self) -> Vec<PageBox> {
        self.pages.iter().map(|(_, page)| *page).collect()
    }

    fn draw_page_number(&mut self, page_index: usize, anchor: Anchor, label: &str, font_size: f32) -> Result<()> {
        let (page_id, page) = *self.pages.get(page_index).ok_or_else(|| {
            Error::InvalidInput(format!("page index {page_index} out of range"))
        })?;
        let font_id = self.font();

        let absolute = Anchor {
            x: page.x + anchor.x,
            y: page.y + anchor.y,
        };
        stamp::stamp_page(&mut self.doc, page_id, font_id, absolute, label, font_size)
    }

    fn finish(self) -> Result<Vec<u8>> {
        let Self {
            mut doc,
            pages_id,
            pages,
            ..
        } = self;

        if pages.is_empty() {
            return Err(Error::InvalidInput("No input files provided".to_string()));
        }

        // Create Kids array with all page references
        let kids: Vec<Object> = pages
            .iter()
            .map(|(id, _)| Object::Reference(*id))
            .collect();

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => Object::Integer(pages.len() as i64),
                "Kids" => kids,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let created = chrono::Local::now().format("D:%Y%m%d%H%M%S").to_string();
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal(concat!("pdf-binder ", env!("CARGO_PKG_VERSION"))),
            "CreationDate" => Object::string_literal(created),
        });
        doc.trailer.set("Info", Object::Reference(info_id));

        // Compress and save
        doc.compress();
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;

        tracing::info!(pages = pages.len(), bytes = bytes.len(), "serialized merged PDF");
        Ok(bytes)
    }
}

/// Copy inheritable attributes from ancestors onto the page itself
fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    for key in INHERITABLE {
        if doc.get_dictionary(page_id)?.has(key) {
            continue;
        }
        if let Some(value) = inherited_attribute(doc, page_id, key) {
            doc.get_dictionary_mut(page_id)?.set(key, value);
        }
    }
    Ok(())
}

fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// MediaBox of a page whose attributes have been flattened
fn media_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let rect = doc
        .get_dictionary(page_id)
        .and_then(|page| page.get(b"MediaBox"))
        .ok()
        .and_then(|object| match object {
            Object::Reference(id) => doc.get_object(*id).ok(),
            other => Some(other),
        })
        .and_then(|object| object.as_array().ok())
        .and_then(|items| {
            let numbers: Vec<f32> = items.iter().filter_map(number).collect();
            <[f32; 4]>::try_from(numbers).ok()
        });

    match rect {
        Some([llx, lly, urx, ury]) => PageBox {
            x: llx.min(urx),
            y: lly.min(ury),
            width: (urx - llx).abs(),
            height: (ury - lly).abs(),
        },
        None => {
            tracing::warn!(?page_id, "page has no usable MediaBox, assuming US Letter");
            PageBox::from_dimensions(PageDimensions::letter())
        }
    }
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Catalog and Pages nodes of a source are replaced by the merged tree
fn is_tree_root(object: &Object) -> bool {
    let Ok(dict) = object.as_dict() else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog") | Ok(b"Pages")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::count_pages_in;
    use crate::test_helpers::sample_pdf;

    fn reload(bytes: &[u8]) -> Document {
        let mut doc = Document::load_mem(bytes).unwrap();
        doc.decompress();
        doc
    }

    #[test]
    fn test_merge_two_documents() {
        let mut backend = LopdfBackend::new();
        let first = backend.append_document(&sample_pdf(3, 612.0, 792.0)).unwrap();
        let second = backend.append_document(&sample_pdf(2, 595.0, 842.0)).unwrap();

        assert_eq!(first.page_count, 3);
        assert_eq!(second.page_count, 2);
        assert_eq!(second.first_page.width, 595.0);

        let bytes = backend.finish().unwrap();
        assert_eq!(count_pages_in(&bytes).unwrap(), 5);
    }

    #[test]
    fn test_pages_keep_inherited_attributes() {
        let mut backend = LopdfBackend::new();
        backend.append_document(&sample_pdf(2, 500.0, 700.0)).unwrap();
        let doc = reload(&backend.finish().unwrap());

        for (_, page_id) in doc.get_pages() {
            let page = doc.get_dictionary(page_id).unwrap();
            assert!(page.has(b"Resources"));
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            assert_eq!(number(&media_box[2]), Some(500.0));
        }
    }

    #[test]
    fn test_blank_page_takes_given_size() {
        let mut backend = LopdfBackend::new();
        let appended = backend.append_document(&sample_pdf(1, 420.0, 595.0)).unwrap();
        backend.append_blank_page(appended.first_page).unwrap();

        let boxes = backend.page_boxes();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1], appended.first_page);

        let doc = reload(&backend.finish().unwrap());
        let pages = doc.get_pages();
        let blank = doc.get_dictionary(pages[&2]).unwrap();
        assert!(!blank.has(b"Contents"));
    }

    #[test]
    fn test_only_one_catalog_survives() {
        let mut backend = LopdfBackend::new();
        backend.append_document(&sample_pdf(1, 612.0, 792.0)).unwrap();
        backend.append_document(&sample_pdf(1, 612.0, 792.0)).unwrap();
        let doc = reload(&backend.finish().unwrap());

        let catalogs = doc.objects.values().filter(|o| is_tree_root(o)).count();
        // one Catalog plus one Pages node
        assert_eq!(catalogs, 2);
    }

    #[test]
    fn test_finish_without_pages_fails() {
        assert!(matches!(
            LopdfBackend::new().finish(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_corrupt_source_is_rejected() {
        let mut backend = LopdfBackend::new();
        assert!(matches!(
            backend.append_document(b"%PDF-1.5 garbage"),
            Err(Error::Pdf(_))
        ));
        assert_eq!(backend.page_count(), 0);
    }
}
