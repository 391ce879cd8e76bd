//! Error types for the pdf-binder library

use std::path::PathBuf;
use thiserror::Error;

use crate::registry::EntryId;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the pdf-binder library
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected input: wrong file type, zero page count, nothing to merge
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Strict registry operation on an id that is not registered
    #[error("No entry with id {0}")]
    NotFound(EntryId),

    /// Catalog generation requested without a template
    #[error("No DOCX template loaded")]
    MissingTemplate,

    /// A PDF or DOCX collaborator failed during assembly
    #[error("{context}: {source}")]
    ExternalToolFailure {
        context: String,
        #[source]
        source: Box<Error>,
    },

    /// PDF processing error
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DOCX container error
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Malformed template tags
    #[error("Template error: {0}")]
    Template(String),

    /// Template part is not well-formed XML
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Manifest could not be parsed
    #[error("Manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Invalid glob pattern
    #[error("Invalid glob pattern: {0}")]
    InvalidGlob(String),

    /// No files matched pattern
    #[error("No PDF files found matching pattern: {0}")]
    NoFilesMatched(String),

    /// Invalid PDF (no pages)
    #[error("PDF has no pages: {}", .0.display())]
    EmptyPdf(PathBuf),
}

impl Error {
    /// Wrap a collaborator failure with a short description of the step.
    pub fn external(context: impl Into<String>, source: Error) -> Self {
        match source {
            // Already classified at an inner boundary.
            Error::ExternalToolFailure { .. } => source,
            other => Error::ExternalToolFailure {
                context: context.into(),
                source: Box::new(other),
            },
        }
    }
}
