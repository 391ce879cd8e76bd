//! Table-of-contents data for the DOCX template

use serde::Serialize;

use crate::error::{Error, Result};
use crate::pagination::PaginationPlan;
use crate::registry::DocumentEntry;

/// One line of the table of contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub title: String,
    /// Start page in the merged document
    pub page: u32,
}

/// Data handed to the template: `{ title, entries: [{ title, page }] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    pub title: String,
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Template data object
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "entries": self.entries,
        })
    }
}

/// Pair every entry's title with its planned start page
///
/// `plan` must have been computed from exactly these entries, in this order.
/// A plan whose slots do not carry the same ids is stale and is rejected.
pub fn build_catalog<S>(
    entries: &[DocumentEntry<S>],
    plan: &PaginationPlan,
    toc_title: &str,
) -> Result<Catalog> {
    if entries.len() != plan.len() {
        return Err(Error::InvalidInput(format!(
            "pagination plan covers {} documents but {} are registered",
            plan.len(),
            entries.len()
        )));
    }

    let entries = entries
        .iter()
        .zip(plan.slots())
        .map(|(entry, slot)| {
            if slot.id != Some(entry.id()) || entry.page_count() != slot.page_count {
                return Err(Error::InvalidInput(format!(
                    "pagination plan is stale for '{}'",
                    entry.title
                )));
            }
            Ok(CatalogEntry {
                title: entry.title.clone(),
                page: slot.start_page,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Catalog {
        title: toc_title.to_string(),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::{plan_entries, plan_pages, BlankPageRule};
    use crate::registry::EntryRegistry;

    const ODD: Option<BlankPageRule> = Some(BlankPageRule::AfterOddEntry);

    fn sample() -> EntryRegistry<()> {
        let mut reg = EntryRegistry::new();
        reg.append_all(vec![("A", 3, ()), ("B", 4, ())]).unwrap();
        reg
    }

    #[test]
    fn test_catalog_follows_plan() {
        let reg = sample();
        let plan = plan_entries(reg.entries(), ODD).unwrap();
        let catalog = build_catalog(reg.entries(), &plan, "Contents").unwrap();

        assert_eq!(catalog.title, "Contents");
        assert_eq!(
            catalog.entries,
            [
                CatalogEntry { title: "A".into(), page: 1 },
                CatalogEntry { title: "B".into(), page: 5 },
            ]
        );
    }

    #[test]
    fn test_catalog_reflects_rename_and_reorder() {
        let mut reg = sample();
        let ids = reg.ids();
        reg.rename(ids[1], "Appendix");
        reg.move_up(ids[1]);

        let plan = plan_entries(reg.entries(), ODD).unwrap();
        let catalog = build_catalog(reg.entries(), &plan, "Contents").unwrap();

        let pages: Vec<_> = catalog.entries.iter().map(|e| (e.title.as_str(), e.page)).collect();
        assert_eq!(pages, [("Appendix", 1), ("A", 5)]);
    }

    #[test]
    fn test_stale_plan_rejected() {
        let mut reg = sample();
        let plan = plan_entries(reg.entries(), ODD).unwrap();
        reg.append("C", 2, ()).unwrap();
        assert!(matches!(
            build_catalog(reg.entries(), &plan, "Contents"),
            Err(Error::InvalidInput(_))
        ));

        let mut reg = sample();
        let first = reg.ids()[0];
        reg.move_down(first);
        assert!(build_catalog(reg.entries(), &plan, "Contents").is_err());
    }

    #[test]
    fn test_swapped_entries_with_equal_counts_rejected() {
        let mut reg = EntryRegistry::new();
        let ids = reg.append_all(vec![("A", 2, ()), ("B", 2, ())]).unwrap();
        let plan = plan_entries(reg.entries(), ODD).unwrap();

        reg.move_up(ids[1]);
        assert!(matches!(
            build_catalog(reg.entries(), &plan, "Contents"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_plan_from_another_registry_rejected() {
        let reg = sample();
        let mut other = EntryRegistry::new();
        other.append_all(vec![("X", 3, ()), ("Y", 4, ()), ("Z", 1, ())]).unwrap();
        other.remove(other.ids()[0]);

        let plan = plan_entries(other.entries(), ODD).unwrap();
        assert!(build_catalog(reg.entries(), &plan, "Contents").is_err());

        let counts_only = plan_pages([3, 4], ODD).unwrap();
        assert!(build_catalog(reg.entries(), &counts_only, "Contents").is_err());
    }

    #[test]
    fn test_template_value_shape() {
        let reg = sample();
        let plan = plan_entries(reg.entries(), None).unwrap();
        let value = build_catalog(reg.entries(), &plan, "TOC").unwrap().to_value();

        assert_eq!(value["title"], "TOC");
        assert_eq!(value["entries"][1]["title"], "B");
        assert_eq!(value["entries"][1]["page"], 4);
    }
}
