//! PDF Binder Library
//!
//! Binds a set of PDFs into one document and produces a matching table of
//! contents. This library provides functionality to:
//! - Keep an ordered, editable list of documents with display titles
//! - Plan where each document starts, with optional blank-page padding
//! - Merge the documents and stamp page numbers (left/right/outside/inside)
//! - Render the table of contents into a DOCX template
//!
//! # Example
//!
//! ```no_run
//! use pdf_binder::assembly::{assemble, AssemblyRequest};
//! use pdf_binder::config::Manifest;
//! use pdf_binder::docx::DocxTemplate;
//! use pdf_binder::pdf::LopdfBackend;
//! use std::path::PathBuf;
//!
//! let manifest = Manifest::from_paths([
//!     PathBuf::from("1. intro.pdf"),
//!     PathBuf::from("2. advanced.pdf"),
//! ]);
//! let registry = manifest.build_registry()?;
//!
//! let output = assemble(&registry, &AssemblyRequest::default(), LopdfBackend::new(), &DocxTemplate)?;
//! std::fs::write("merged.pdf", output.pdf.unwrap_or_default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod assembly;
pub mod catalog;
pub mod config;
pub mod docx;
pub mod error;
pub mod layout;
pub mod pagination;
pub mod pdf;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used items
pub use error::{Error, Result};
pub use registry::{DocumentEntry, EntryId, EntryRegistry};
