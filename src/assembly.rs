//! One merge/catalog run over a registry snapshot
//!
//! [`assemble`] plans the pagination, copies every entry through a
//! [`PdfBackend`], pads and stamps the result and renders the catalog with a
//! [`CatalogRenderer`]. Artifacts are only returned once every step has
//! succeeded; writing them out is left to the caller.

use std::borrow::Cow;
use std::path::PathBuf;

use crate::catalog::build_catalog;
use crate::config::LayoutOptions;
use crate::docx::CatalogRenderer;
use crate::error::{Error, Result};
use crate::layout::PlacementPolicy;
use crate::pagination::{plan_entries, PaginationPlan};
use crate::pdf::PdfBackend;
use crate::registry::{DocumentEntry, EntryRegistry};

/// Where an entry's PDF bytes come from
pub trait SourceBytes {
    fn load(&self) -> Result<Cow<'_, [u8]>>;
}

impl SourceBytes for PathBuf {
    fn load(&self) -> Result<Cow<'_, [u8]>> {
        if !self.exists() {
            return Err(Error::FileNotFound(self.clone()));
        }
        Ok(Cow::Owned(std::fs::read(self)?))
    }
}

impl SourceBytes for Vec<u8> {
    fn load(&self) -> Result<Cow<'_, [u8]>> {
        Ok(Cow::Borrowed(self.as_slice()))
    }
}

/// What to produce in one run
#[derive(Debug, Clone)]
pub struct AssemblyRequest<'t> {
    pub options: LayoutOptions,
    pub merge_pdf: bool,
    pub generate_catalog: bool,
    /// DOCX template bytes, required when `generate_catalog` is set
    pub catalog_template: Option<&'t [u8]>,
}

impl Default for AssemblyRequest<'_> {
    fn default() -> Self {
        Self {
            options: LayoutOptions::default(),
            merge_pdf: true,
            generate_catalog: false,
            catalog_template: None,
        }
    }
}

/// Artifacts of a successful run
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    pub plan: PaginationPlan,
    pub pdf: Option<Vec<u8>>,
    pub catalog: Option<Vec<u8>>,
}

/// Run one assembly against a snapshot of `registry`
pub fn assemble<S, B, R>(
    registry: &EntryRegistry<S>,
    request: &AssemblyRequest<'_>,
    backend: B,
    renderer: &R,
) -> Result<AssemblyOutput>
where
    S: SourceBytes + Clone,
    B: PdfBackend,
    R: CatalogRenderer + ?Sized,
{
    let template = match (request.generate_catalog, request.catalog_template) {
        (true, None) => return Err(Error::MissingTemplate),
        (true, Some(template)) => Some(template),
        (false, _) => None,
    };
    if registry.is_empty() {
        return Err(Error::InvalidInput("No documents registered".to_string()));
    }

    let entries = registry.snapshot();
    let options = &request.options;
    let plan = plan_entries(&entries, options.blank_pages())?;
    tracing::info!(
        documents = entries.len(),
        total_pages = plan.total_pages(),
        blank_pages = plan.blank_pages(),
        "planned merge"
    );

    let pdf = if request.merge_pdf {
        Some(merge(&entries, &plan, options, backend)?)
    } else {
        None
    };

    let catalog = match template {
        Some(template) => {
            let catalog = build_catalog(&entries, &plan, &options.toc_title)?;
            let bytes = renderer.render(template, &catalog).map_err(|e| {
                tracing::error!(error = %e, "catalog rendering failed");
                Error::external("Failed to render table of contents", e)
            })?;
            Some(bytes)
        }
        None => None,
    };

    Ok(AssemblyOutput { plan, pdf, catalog })
}

fn merge<S, B>(entries: &[DocumentEntry<S>], plan: &PaginationPlan, options: &LayoutOptions, mut backend: B) -> Result<Vec<u8>>
where
    S: SourceBytes,
    B: PdfBackend,
{
    for (entry, slot) in entries.iter().zip(plan.slots()) {
        let bytes = entry.source().load().map_err(|e| {
            tracing::error!(entry = %entry.id(), title = %entry.title, error = %e, "failed to read source");
            Error::external(format!("Failed to read '{}'", entry.title), e)
        })?;
        let appended = backend.append_document(&bytes).map_err(|e| {
            tracing::error!(entry = %entry.id(), title = %entry.title, error = %e, "failed to copy pages");
            Error::external(format!("Failed to merge '{}'", entry.title), e)
        })?;

        if appended.page_count != entry.page_count() {
            tracing::error!(
                entry = %entry.id(),
                registered = entry.page_count(),
                found = appended.page_count,
                "page count changed since registration"
            );
            return Err(Error::external(
                format!("Failed to merge '{}'", entry.title),
                Error::InvalidInput(format!(
                    "expected {} pages but found {}",
                    entry.page_count(),
                    appended.page_count
                )),
            ));
        }

        if slot.blank_after {
            tracing::debug!(entry = %entry.id(), "inserting blank page");
            backend
                .append_blank_page(appended.first_page)
                .map_err(|e| Error::external("Failed to insert blank page", e))?;
        }
    }

    if let Some(position) = options.stamp_position() {
        let policy = PlacementPolicy::default();
        for (index, page) in backend.page_boxes().into_iter().enumerate() {
            let Some(anchor) = policy.anchor(index, position, page.width) else {
                continue;
            };
            backend
                .draw_page_number(index, anchor, &(index + 1).to_string(), options.font_size)
                .map_err(|e| Error::external("Failed to add page numbers", e))?;
        }
    }

    backend
        .finish()
        .map_err(|e| Error::external("Failed to write merged PDF", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::docx::DocxTemplate;
    use crate::layout::{Anchor, PageNumberPosition};
    use crate::pdf::{count_pages_in, AppendedDocument, LopdfBackend, PageBox};
    use crate::test_helpers::{document_xml, para, sample_docx, sample_pdf};

    /// Records every backend call; sources are page counts encoded as text
    #[derive(Debug, Default)]
    struct RecordingBackend {
        pages: Vec<PageBox>,
        blanks: Vec<usize>,
        stamps: Vec<(usize, Anchor, String)>,
        short_by: u32,
    }

    impl PdfBackend for RecordingBackend {
        fn append_document(&mut self, bytes: &[u8]) -> Result<AppendedDocument> {
            let pages: u32 = std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| Error::InvalidInput("unreadable".to_string()))?;
            let pages = pages - self.short_by;
            let first_page = PageBox {
                x: 0.0,
                y: 0.0,
                width: 600.0 + self.pages.len() as f32,
                height: 800.0,
            };
            self.pages.extend((0..pages).map(|_| first_page));
            Ok(AppendedDocument {
                page_count: pages,
                first_page,
            })
        }

        fn append_blank_page(&mut self, page: PageBox) -> Result<()> {
            self.blanks.push(self.pages.len());
            self.pages.push(page);
            Ok(())
        }

        fn page_boxes(&self) -> Vec<PageBox> {
            self.pages.clone()
        }

        fn draw_page_number(&mut self, page_index: usize, anchor: Anchor, label: &str, _font_size: f32) -> Result<()> {
            self.stamps.push((page_index, anchor, label.to_string()));
            Ok(())
        }

        fn finish(self) -> Result<Vec<u8>> {
            let stamps: Vec<String> = self
                .stamps
                .iter()
                .map(|(_, anchor, label)| format!("{label}@{}", anchor.x))
                .collect();
            Ok(format!(
                "{} pages, blanks at {:?}, stamps [{}]",
                self.pages.len(),
                self.blanks,
                stamps.join(" ")
            )
            .into_bytes())
        }
    }

    struct NoRenderer;

    impl CatalogRenderer for NoRenderer {
        fn render(&self, _template: &[u8], _catalog: &Catalog) -> Result<Vec<u8>> {
            Err(Error::Template("broken".to_string()))
        }
    }

    fn registry(counts: &[u32]) -> EntryRegistry<Vec<u8>> {
        let mut reg = EntryRegistry::new();
        for (i, &count) in counts.iter().enumerate() {
            reg.append(format!("Doc {}", i + 1), count, count.to_string().into_bytes())
                .unwrap();
        }
        reg
    }

    #[test]
    fn test_blank_pages_follow_plan() {
        let reg = registry(&[3, 4]);
        let output = assemble(&reg, &AssemblyRequest::default(), RecordingBackend::default(), &DocxTemplate).unwrap();

        assert_eq!(output.plan.total_pages(), 8);
        assert_eq!(
            output.pdf.unwrap(),
            b"8 pages, blanks at [3], stamps [1@550 2@50 3@550 4@50 5@554 6@50 7@554 8@50]"
        );
        assert!(output.catalog.is_none());
    }

    #[test]
    fn test_outside_numbers_alternate_and_follow_page_width() {
        let reg = registry(&[2]);
        let output = assemble(&reg, &AssemblyRequest::default(), RecordingBackend::default(), &DocxTemplate).unwrap();
        assert_eq!(output.pdf.unwrap(), b"2 pages, blanks at [], stamps [1@550 2@50]");
    }

    #[test]
    fn test_inside_numbers() {
        let reg = registry(&[2]);
        let request = AssemblyRequest {
            options: LayoutOptions {
                page_number_position: PageNumberPosition::Inside,
                ..LayoutOptions::default()
            },
            ..AssemblyRequest::default()
        };
        let output = assemble(&reg, &request, RecordingBackend::default(), &DocxTemplate).unwrap();
        assert_eq!(output.pdf.unwrap(), b"2 pages, blanks at [], stamps [1@50 2@550]");
    }

    #[test]
    fn test_no_stamps_when_disabled() {
        let reg = registry(&[1]);
        let request = AssemblyRequest {
            options: LayoutOptions {
                add_page_numbers: false,
                ..LayoutOptions::default()
            },
            ..AssemblyRequest::default()
        };
        let output = assemble(&reg, &request, RecordingBackend::default(), &DocxTemplate).unwrap();
        assert_eq!(output.pdf.unwrap(), b"2 pages, blanks at [1], stamps []");
    }

    #[test]
    fn test_missing_template_fails_first() {
        let reg: EntryRegistry<Vec<u8>> = EntryRegistry::new();
        let request = AssemblyRequest {
            generate_catalog: true,
            ..AssemblyRequest::default()
        };
        assert!(matches!(
            assemble(&reg, &request, RecordingBackend::default(), &DocxTemplate),
            Err(Error::MissingTemplate)
        ));
    }

    #[test]
    fn test_empty_registry_is_rejected() {
        let reg: EntryRegistry<Vec<u8>> = EntryRegistry::new();
        assert!(matches!(
            assemble(&reg, &AssemblyRequest::default(), RecordingBackend::default(), &DocxTemplate),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_page_count_drift_aborts() {
        let reg = registry(&[3]);
        let backend = RecordingBackend {
            short_by: 1,
            ..RecordingBackend::default()
        };
        let err = assemble(&reg, &AssemblyRequest::default(), backend, &DocxTemplate).unwrap_err();
        assert!(matches!(err, Error::ExternalToolFailure { .. }));
    }

    #[test]
    fn test_unreadable_source_is_external_failure() {
        let mut reg = EntryRegistry::new();
        reg.append("Broken", 1, b"not a number".to_vec()).unwrap();
        let err = assemble(&reg, &AssemblyRequest::default(), RecordingBackend::default(), &DocxTemplate).unwrap_err();
        match err {
            Error::ExternalToolFailure { context, source } => {
                assert!(context.contains("Broken"));
                assert!(matches!(*source, Error::InvalidInput(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_source_file() {
        let mut reg = EntryRegistry::new();
        reg.append("Gone", 1, PathBuf::from("/nonexistent/gone.pdf")).unwrap();
        match assemble(&reg, &AssemblyRequest::default(), RecordingBackend::default(), &DocxTemplate) {
            Err(Error::ExternalToolFailure { context, source }) => {
                assert_eq!(context, "Failed to read 'Gone'");
                assert!(matches!(*source, Error::FileNotFound(_)));
            }
            other => panic!("expected a wrapped read failure, got {other:?}"),
        }
    }

    #[test]
    fn test_renderer_failure_is_wrapped() {
        let reg = registry(&[1]);
        let template = b"unused".to_vec();
        let request = AssemblyRequest {
            merge_pdf: false,
            generate_catalog: true,
            catalog_template: Some(&template),
            ..AssemblyRequest::default()
        };
        assert!(matches!(
            assemble(&reg, &request, RecordingBackend::default(), &NoRenderer),
            Err(Error::ExternalToolFailure { .. })
        ));
    }

    #[test]
    fn test_full_run_with_lopdf_and_docx() {
        let mut reg = EntryRegistry::new();
        reg.append("Intro", 3, sample_pdf(3, 612.0, 792.0)).unwrap();
        reg.append("Appendix", 4, sample_pdf(4, 595.0, 842.0)).unwrap();

        let template = sample_docx(&[
            &para("{title}"),
            &para("{#entries}"),
            &para("{title}: {page}"),
            &para("{/entries}"),
        ]);
        let request = AssemblyRequest {
            generate_catalog: true,
            catalog_template: Some(&template),
            ..AssemblyRequest::default()
        };

        let output = assemble(&reg, &request, LopdfBackend::new(), &DocxTemplate).unwrap();

        assert_eq!(count_pages_in(&output.pdf.unwrap()).unwrap(), 8);
        let xml = document_xml(&output.catalog.unwrap());
        assert!(xml.contains(">Table of Contents</w:t>"));
        assert!(xml.contains(">Intro: 1</w:t>"));
        assert!(xml.contains(">Appendix: 5</w:t>"));
    }
}
