//! Line item segmentation
//!
//! Partitions the document's row stream into invoice line items, each with
//! its leading keeper rows and, when present, its Adjustments and Credit
//! block. Page breaks do not interrupt the scan.

use crate::dialect::Dialect;
use crate::extractor::Word;
use crate::rows::Row;
use std::collections::BTreeSet;

/// One billed entry of the invoice
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineItem {
    /// Leading rows of the item, header row first (at most the dialect's cap)
    pub keeper_rows: Vec<Row>,
    /// Rows between the A&C header and the next line item header
    pub ac_rows: Vec<Row>,
    /// Pages touched by `ac_rows`
    pub pages: BTreeSet<u32>,
}

impl LineItem {
    /// All A&C words, in row order
    pub fn ac_words(&self) -> impl Iterator<Item = &Word> {
        self.ac_rows.iter().flat_map(|r| r.words.iter())
    }

    /// A&C words on one page
    pub fn ac_words_on_page(&self, page: u32) -> Vec<&Word> {
        self.ac_rows
            .iter()
            .filter(|r| r.page == page)
            .flat_map(|r| r.words.iter())
            .collect()
    }

    /// Page of the header row
    pub fn first_page(&self) -> Option<u32> {
        self.keeper_rows.first().map(|r| r.page)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    InItem,
    InAcBlock,
}

/// Incremental line item state machine
pub struct LineItemSegmenter<'d> {
    dialect: &'d Dialect,
    state: State,
    current: Option<LineItem>,
    finished: Vec<LineItem>,
}

impl<'d> LineItemSegmenter<'d> {
    pub fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            state: State::Idle,
            current: None,
            finished: Vec::new(),
        }
    }

    /// Feed the next row in document order
    pub fn push(&mut self, row: &Row) {
        let text = row.text();

        // A header row closes whatever is open, A&C block included
        if self.dialect.is_line_item_header(&text) {
            self.close_current();
            self.current = Some(LineItem {
                keeper_rows: vec![row.clone()],
                ..LineItem::default()
            });
            self.state = State::InItem;
            return;
        }

        let Some(item) = self.current.as_mut() else {
            return;
        };

        match self.state {
            State::Idle => {}
            State::InItem => {
                if self.dialect.is_ac_header(&text) {
                    self.state = State::InAcBlock;
                } else if item.keeper_rows.len() < self.dialect.keeper_row_cap {
                    item.keeper_rows.push(row.clone());
                }
            }
            State::InAcBlock => {
                if !self.dialect.is_ac_header(&text) {
                    item.ac_rows.push(row.clone());
                    item.pages.insert(row.page);
                }
            }
        }
    }

    fn close_current(&mut self) {
        if let Some(item) = self.current.take() {
            log::trace!(
                "closing line item: {} keeper rows, {} A&C rows",
                item.keeper_rows.len(),
                item.ac_rows.len()
            );
            self.finished.push(item);
        }
        self.state = State::Idle;
    }

    /// Close the open item and return every item that has an A&C block
    pub fn finish(mut self) -> Vec<LineItem> {
        self.close_current();
        self.finished
            .into_iter()
            .filter(|item| !item.ac_rows.is_empty())
            .collect()
    }
}

/// Segment a full row stream into accepted line items
pub fn segment_line_items(rows: &[Row], dialect: &Dialect) -> Vec<LineItem> {
    let mut segmenter = LineItemSegmenter::new(dialect);
    for row in rows {
        segmenter.push(row);
    }
    segmenter.finish()
}
