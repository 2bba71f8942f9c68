//! Highlight planning
//!
//! Turns extracted page words into the list of colored marks to draw. This
//! pass does no PDF I/O.

use crate::colors::{Color, ColorAssigner};
use crate::dialect::Dialect;
use crate::extractor::{PageGeometry, PageWords};
use crate::keeper::{extract_keeper_name, KeeperKey};
use crate::region::{Rect, RegionComputer};
use crate::rows::build_document_rows;
use crate::segmenter::{segment_line_items, LineItem};
use std::collections::BTreeMap;

/// What a mark covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkTarget {
    KeeperName,
    AdjustmentBlock,
}

/// One rectangle to highlight
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    /// Page number (1-indexed)
    pub page: u32,
    pub rect: Rect,
    pub color: Color,
    pub target: MarkTarget,
    pub keeper: KeeperKey,
}

/// Planned highlights for one document
#[derive(Debug, Clone, Default)]
pub struct HighlightPlan {
    /// Accepted line items, in document order
    pub items: Vec<LineItem>,
    /// Marks in emission order
    pub marks: Vec<Mark>,
    /// Keeper colors in first-seen order
    pub keepers: Vec<(KeeperKey, Color)>,
    /// Items whose name fell back to the whole header row
    pub degraded_names: usize,
    /// Items skipped because no name words were found
    pub skipped_names: usize,
    /// Regions dropped as degenerate after clipping
    pub skipped_regions: usize,
}

/// Plan every keeper-name and A&C highlight of a document
pub fn plan_highlights(
    pages: &[PageWords],
    dialect: &Dialect,
    regions: &RegionComputer,
) -> HighlightPlan {
    let rows = build_document_rows(pages, dialect.row_tolerance);
    let items = segment_line_items(&rows, dialect);
    log::debug!("{} rows, {} line items with A&C blocks", rows.len(), items.len());

    let geometry: BTreeMap<u32, PageGeometry> =
        pages.iter().map(|p| (p.page, p.geometry)).collect();
    let page_geometry = |page: u32| geometry.get(&page).copied().unwrap_or_default();

    let mut plan = HighlightPlan::default();
    let mut colors = ColorAssigner::new();

    for item in &items {
        let name = extract_keeper_name(item, dialect);
        if name.degraded {
            plan.degraded_names += 1;
        }
        let Some(name_page) = name.page() else {
            plan.skipped_names += 1;
            continue;
        };

        let keeper = name.key();
        let color = colors.assign(&keeper);
        log::debug!(
            "line item on page {}: keeper '{}', A&C on pages {:?}",
            name_page,
            keeper,
            item.pages
        );

        match regions.region(&name.words, &page_geometry(name_page)) {
            Some(rect) => plan.marks.push(Mark {
                page: name_page,
                rect,
                color,
                target: MarkTarget::KeeperName,
                keeper: keeper.clone(),
            }),
            None => plan.skipped_regions += 1,
        }

        for &page in &item.pages {
            let words = item.ac_words_on_page(page);
            if words.is_empty() {
                continue;
            }
            match regions.region(words, &page_geometry(page)) {
                Some(rect) => plan.marks.push(Mark {
                    page,
                    rect,
                    color,
                    target: MarkTarget::AdjustmentBlock,
                    keeper: keeper.clone(),
                }),
                None => plan.skipped_regions += 1,
            }
        }
    }

    plan.keepers = colors.bindings();
    plan.items = items;
    plan
}
