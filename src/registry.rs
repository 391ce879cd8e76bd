//! Ordered registry of source documents
//!
//! The registry owns every [`DocumentEntry`] and is the only place the merge
//! order is mutated. Ids come from a counter owned by the registry instance, so
//! two registries never share state and a deleted id is never handed out again.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Stable identifier of a registered document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryId(u64);

impl EntryId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One registered source document
///
/// `S` locates the raw bytes (a path for the CLI, the bytes themselves in
/// tests). Pagination never looks at it.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry<S> {
    id: EntryId,
    /// Display title, editable
    pub title: String,
    page_count: u32,
    source: S,
}

impl<S> DocumentEntry<S> {
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Natural page count of the source, fixed at registration
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// Ordered collection of document entries
#[derive(Debug, Clone)]
pub struct EntryRegistry<S> {
    entries: Vec<DocumentEntry<S>>,
    next_id: u64,
}

impl<S> Default for EntryRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> EntryRegistry<S> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Append a document at the end of the order
    ///
    /// Fails with [`Error::InvalidInput`] when `page_count` is zero; the
    /// registry is left untouched in that case.
    pub fn append(&mut self, title: impl Into<String>, page_count: u32, source: S) -> Result<EntryId> {
        let title = title.into();
        validate_page_count(&title, page_count)?;
        Ok(self.push(title, page_count, source))
    }

    /// Append several documents in order, all or nothing
    ///
    /// Every item is validated before the first one is inserted, so a batch
    /// with one bad document leaves the registry exactly as it was.
    pub fn append_all<I, T>(&mut self, items: I) -> Result<Vec<EntryId>>
    where
        I: IntoIterator<Item = (T, u32, S)>,
        T: Into<String>,
    {
        let items: Vec<(String, u32, S)> = items
            .into_iter()
            .map(|(title, count, source)| (title.into(), count, source))
            .collect();

        for (title, count, _) in &items {
            validate_page_count(title, *count)?;
        }

        Ok(items
            .into_iter()
            .map(|(title, count, source)| self.push(title, count, source))
            .collect())
    }

    fn push(&mut self, title: String, page_count: u32, source: S) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        tracing::debug!(%id, %title, page_count, "registered document");
        self.entries.push(DocumentEntry {
            id,
            title,
            page_count,
            source,
        });
        id
    }

    /// Replace the title of `id`; unknown ids are ignored
    pub fn rename(&mut self, id: EntryId, title: impl Into<String>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.title = title.into();
        }
    }

    /// Like [`rename`](Self::rename) but reports unknown ids
    pub fn rename_strict(&mut self, id: EntryId, title: impl Into<String>) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(Error::NotFound(id))?;
        entry.title = title.into();
        Ok(())
    }

    /// Remove `id`, keeping the relative order of the rest
    pub fn remove(&mut self, id: EntryId) -> Option<DocumentEntry<S>> {
        let index = self.position(id)?;
        Some(self.entries.remove(index))
    }

    /// Swap `id` with its predecessor; no-op at the top
    pub fn move_up(&mut self, id: EntryId) {
        if let Some(index) = self.position(id) {
            if index > 0 {
                self.entries.swap(index - 1, index);
            }
        }
    }

    /// Swap `id` with its successor; no-op at the bottom
    pub fn move_down(&mut self, id: EntryId) {
        if let Some(index) = self.position(id) {
            if index + 1 < self.entries.len() {
                self.entries.swap(index, index + 1);
            }
        }
    }

    pub fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn get(&self, id: EntryId) -> Option<&DocumentEntry<S>> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[DocumentEntry<S>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentEntry<S>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids in merge order
    pub fn ids(&self) -> Vec<EntryId> {
        self.entries.iter().map(|e| e.id).collect()
    }
}

impl<S: Clone> EntryRegistry<S> {
    /// Detached copy of the current order, used for one assembly run
    pub fn snapshot(&self) -> Vec<DocumentEntry<S>> {
        self.entries.clone()
    }
}

fn validate_page_count(title: &str, page_count: u32) -> Result<()> {
    if page_count == 0 {
        return Err(Error::InvalidInput(format!(
            "'{title}' has no pages; page count must be positive"
        )));
    }
    Ok(())
}
