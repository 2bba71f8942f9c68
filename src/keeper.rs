//! Timekeeper name extraction
//!
//! The name sits between the date token and the task code token of a line
//! item's header row, and may wrap onto following rows in the same column.

use crate::dialect::Dialect;
use crate::extractor::Word;
use crate::segmenter::LineItem;
use std::fmt;

/// Extracted timekeeper name words
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameSpan {
    pub words: Vec<Word>,
    /// True when no date/task code pair was found and the whole header
    /// row stands in for the name
    pub degraded: bool,
}

impl NameSpan {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Page of the first name word
    pub fn page(&self) -> Option<u32> {
        self.words.first().map(|w| w.page)
    }

    pub fn key(&self) -> KeeperKey {
        KeeperKey::from_words(&self.words)
    }
}

/// Normalized timekeeper identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeeperKey(String);

impl KeeperKey {
    /// Strip trailing `.,;:` from each token, lowercase, and join with
    /// single spaces
    pub fn from_words(words: &[Word]) -> Self {
        Self::from_tokens(words.iter().map(|w| w.text.as_str()))
    }

    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        let normalized: Vec<String> = tokens
            .into_iter()
            .flat_map(str::split_whitespace)
            .map(|t| t.trim_end_matches(['.', ',', ';', ':']).to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        KeeperKey(normalized.join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeeperKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the timekeeper name words of a line item
pub fn extract_keeper_name(item: &LineItem, dialect: &Dialect) -> NameSpan {
    let Some(first_row) = item.keeper_rows.first() else {
        return NameSpan::default();
    };
    let words = &first_row.words;

    let date_idx = words.iter().position(|w| dialect.is_date(&w.text));
    let task_idx = date_idx.and_then(|d| {
        words[d + 1..]
            .iter()
            .position(|w| dialect.is_task_code(&w.text))
            .map(|i| d + 1 + i)
    });

    let (Some(date_idx), Some(task_idx)) = (date_idx, task_idx) else {
        log::warn!(
            "no date/task code in header row {:?}, using whole row as name",
            first_row.text()
        );
        return NameSpan {
            words: words.clone(),
            degraded: true,
        };
    };

    let mut name_words: Vec<Word> = words[date_idx + 1..task_idx].to_vec();
    // Name column of the header row, between the date and the task code
    let column = (words[date_idx].x1, words[task_idx].x0);

    // Continuation rows: same page, tokens aligned with the name's left edge.
    // An empty first-row span is seeded from tokens inside the name column.
    let tolerance = dialect.continuation_tolerance;
    let cap = dialect.keeper_row_cap;
    for row in item.keeper_rows.iter().take(cap).skip(1) {
        if row.page != first_row.page {
            break;
        }
        let aligned: Vec<Word> = if name_words.is_empty() {
            row.words
                .iter()
                .filter(|w| w.x0 >= column.0 && w.x0 < column.1)
                .cloned()
                .collect()
        } else {
            let anchor = name_words.iter().map(|w| w.x0).fold(f32::INFINITY, f32::min);
            row.words
                .iter()
                .filter(|w| (w.x0 - anchor).abs() < tolerance)
                .cloned()
                .collect()
        };
        if aligned.is_empty() {
            break;
        }
        name_words.extend(aligned);
    }

    NameSpan {
        words: name_words,
        degraded: false,
    }
}
