//! Row reconstruction
//!
//! Groups a page's words into rows of words that share a text baseline.

use crate::extractor::{PageWords, Word};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Default vertical tolerance between words of one row
pub const DEFAULT_ROW_TOLERANCE: f32 = 2.0;

/// Words on one visual text line, ordered left to right
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub words: Vec<Word>,
    /// Page number (1-indexed)
    pub page: u32,
}

impl Row {
    /// Row text with whitespace collapsed to single spaces
    pub fn text(&self) -> String {
        self.words
            .iter()
            .flat_map(|w| w.text.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Top of the row's first word
    pub fn top(&self) -> Option<f32> {
        self.words.first().map(|w| w.top)
    }
}

/// Build rows from the words of one page.
///
/// Words are sorted by (top, x0); a new row starts whenever a word's top
/// differs from the current row's first word by more than `tolerance`.
pub fn build_rows(words: &[Word], tolerance: f32) -> Vec<Row> {
    let mut sorted: Vec<&Word> = words.iter().collect();
    sorted.sort_by(|a, b| {
        a.top
            .partial_cmp(&b.top)
            .unwrap_or(Ordering::Equal)
            .then(a.x0.partial_cmp(&b.x0).unwrap_or(Ordering::Equal))
    });

    let mut rows: Vec<Row> = Vec::new();
    for word in sorted {
        let starts_new_row = match rows.last().and_then(|r| r.top()) {
            Some(row_top) => (row_top - word.top).abs() > tolerance,
            None => true,
        };

        if starts_new_row {
            rows.push(Row {
                words: vec![word.clone()],
                page: word.page,
            });
        } else if let Some(row) = rows.last_mut() {
            row.words.push(word.clone());
        }
    }

    // Words within tolerance can arrive out of horizontal order
    for row in &mut rows {
        row.words
            .sort_by(|a, b| a.x0.partial_cmp(&b.x0).unwrap_or(Ordering::Equal));
    }

    rows
}

/// Build rows for every page and concatenate them in page order.
///
/// Pages are independent here, so they are processed in parallel; the
/// result keeps document order for the sequential passes that follow.
pub fn build_document_rows(pages: &[PageWords], tolerance: f32) -> Vec<Row> {
    let per_page: Vec<Vec<Row>> = pages
        .par_iter()
        .map(|p| build_rows(&p.words, tolerance))
        .collect();
    per_page.into_iter().flatten().collect()
}
