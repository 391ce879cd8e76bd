//! Pagination planning
//!
//! Computes where every document lands in the merged output. The merge in
//! [`crate::pdf::merge`] inserts blank pages from the same [`PaginationPlan`],
//! so the catalog and the PDF can never disagree about page numbers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::registry::{DocumentEntry, EntryId};

/// Which predicate decides that a blank page follows a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BlankPageRule {
    /// A blank page follows every document whose own page count is odd
    #[default]
    AfterOddEntry,
    /// A blank page follows a document when the number of source pages
    /// copied so far (blank pages not counted) is odd
    AfterOddRunningTotal,
}

/// Placement of one document in the merged output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanSlot {
    /// Registry entry this slot was planned for, `None` for bare page counts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EntryId>,
    /// 1-based page on which the document's first page lands
    pub start_page: u32,
    pub page_count: u32,
    /// Whether one blank page is inserted right after this document
    pub blank_after: bool,
}

impl PlanSlot {
    /// Last page occupied by the document itself (blank page excluded)
    pub fn end_page(&self) -> u32 {
        self.start_page + self.page_count - 1
    }

    /// Pages this document adds to the merged output, blank page included
    pub fn contribution(&self) -> u32 {
        self.page_count + u32::from(self.blank_after)
    }
}

/// One page of the merged output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergedPage {
    /// `page` (0-based) of the document in slot `slot`
    Source { slot: usize, page: u32 },
    /// Blank page following the document in slot `after`
    Blank { after: usize },
}

/// Result of a pagination run, slots in merge order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationPlan {
    slots: Vec<PlanSlot>,
    total_pages: u32,
}

impl PaginationPlan {
    pub fn slots(&self) -> &[PlanSlot] {
        &self.slots
    }

    pub fn start_pages(&self) -> Vec<u32> {
        self.slots.iter().map(|s| s.start_page).collect()
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn blank_pages(&self) -> u32 {
        self.slots.iter().filter(|s| s.blank_after).count() as u32
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The merged page sequence, blank pages included
    pub fn page_sequence(&self) -> Vec<MergedPage> {
        let mut pages = Vec::with_capacity(self.total_pages as usize);
        for (slot, entry) in self.slots.iter().enumerate() {
            pages.extend((0..entry.page_count).map(|page| MergedPage::Source { slot, page }));
            if entry.blank_after {
                pages.push(MergedPage::Blank { after: slot });
            }
        }
        pages
    }
}

/// Plan a merge from bare page counts
///
/// `blanks` is `None` when no blank pages are inserted at all. A zero page
/// count is rejected; the registry never lets one through.
pub fn plan_pages<I>(page_counts: I, blanks: Option<BlankPageRule>) -> Result<PaginationPlan>
where
    I: IntoIterator<Item = u32>,
{
    plan_slots(page_counts.into_iter().map(|count| (None, count)), blanks)
}

/// Plan a merge of registry entries, in their current order
pub fn plan_entries<S>(
    entries: &[DocumentEntry<S>],
    blanks: Option<BlankPageRule>,
) -> Result<PaginationPlan> {
    plan_slots(
        entries.iter().map(|entry| (Some(entry.id()), entry.page_count())),
        blanks,
    )
}

fn plan_slots<I>(items: I, blanks: Option<BlankPageRule>) -> Result<PaginationPlan>
where
    I: IntoIterator<Item = (Option<EntryId>, u32)>,
{
    let too_long = || Error::InvalidInput(format!("merged document exceeds {} pages", u32::MAX));
    let mut cursor: u32 = 1;
    let mut copied: u32 = 0;
    let mut slots = Vec::new();

    for (index, (id, page_count)) in items.into_iter().enumerate() {
        if page_count == 0 {
            return Err(Error::InvalidInput(format!(
                "document {} has no pages",
                index + 1
            )));
        }

        let start_page = cursor;
        cursor = cursor.checked_add(page_count).ok_or_else(too_long)?;
        copied = copied.checked_add(page_count).ok_or_else(too_long)?;

        let blank_after = match blanks {
            None => false,
            Some(BlankPageRule::AfterOddEntry) => page_count % 2 == 1,
            Some(BlankPageRule::AfterOddRunningTotal) => copied % 2 == 1,
        };
        if blank_after {
            cursor = cursor.checked_add(1).ok_or_else(too_long)?;
        }

        slots.push(PlanSlot {
            id,
            start_page,
            page_count,
            blank_after,
        });
    }

    Ok(PaginationPlan {
        slots,
        total_pages: cursor - 1,
    })
}
