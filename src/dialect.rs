//! Invoice layout rulesets
//!
//! A [`Dialect`] bundles every layout-specific pattern and tolerance the
//! segmentation and name extraction passes consume. [`Platform`] is the
//! externally selectable name for a dialect.

use crate::rows::DEFAULT_ROW_TOLERANCE;
use crate::HighlightError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Maximum number of leading rows kept per line item
pub const DEFAULT_KEEPER_ROW_CAP: usize = 5;
/// Horizontal alignment tolerance for name continuation rows
pub const DEFAULT_CONTINUATION_TOLERANCE: f32 = 3.0;

static STANDARD_LINE_ITEM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\d{1,3}\s+\d{1,2}/\d{1,2}/\d{4}").unwrap());
static STANDARD_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").unwrap());
static STANDARD_TASK_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]\d{3}$").unwrap());

const STANDARD_AC_HEADER: &str = "Adjustments and Credit";

/// Pattern set and tolerances for one invoice layout
#[derive(Debug, Clone)]
pub struct Dialect {
    pub name: String,
    /// Matches the text of a row that opens a new line item
    pub line_item_header: Regex,
    /// Literal prefix of the A&C section header row
    pub ac_header: String,
    /// Whole-token date pattern
    pub date: Regex,
    /// Whole-token task code pattern
    pub task_code: Regex,
    /// Tokens that end the name span like a task code does
    pub task_code_literals: Vec<String>,
    pub keeper_row_cap: usize,
    pub row_tolerance: f32,
    pub continuation_tolerance: f32,
    /// Highlight opacity; `None` leaves the viewer default
    pub opacity: Option<f32>,
}

impl Dialect {
    /// Build a dialect from pattern sources, with reference tolerances.
    ///
    /// `date` and `task_code` are matched against whole tokens, so they are
    /// anchored here if the caller did not anchor them.
    pub fn new(
        name: &str,
        line_item_header: &str,
        ac_header: &str,
        date: &str,
        task_code: &str,
    ) -> Result<Self, HighlightError> {
        Ok(Self {
            name: name.to_string(),
            line_item_header: Regex::new(line_item_header)?,
            ac_header: ac_header.to_string(),
            date: Regex::new(&anchored(date))?,
            task_code: Regex::new(&anchored(task_code))?,
            task_code_literals: Vec::new(),
            keeper_row_cap: DEFAULT_KEEPER_ROW_CAP,
            row_tolerance: DEFAULT_ROW_TOLERANCE,
            continuation_tolerance: DEFAULT_CONTINUATION_TOLERANCE,
            opacity: None,
        })
    }

    /// Ruleset for the standard e-billing invoice layout
    pub fn standard() -> Self {
        Self {
            name: "standard".to_string(),
            line_item_header: STANDARD_LINE_ITEM_RE.clone(),
            ac_header: STANDARD_AC_HEADER.to_string(),
            date: STANDARD_DATE_RE.clone(),
            task_code: STANDARD_TASK_CODE_RE.clone(),
            task_code_literals: vec!["Expense".to_string()],
            keeper_row_cap: DEFAULT_KEEPER_ROW_CAP,
            row_tolerance: DEFAULT_ROW_TOLERANCE,
            continuation_tolerance: DEFAULT_CONTINUATION_TOLERANCE,
            opacity: None,
        }
    }

    pub fn with_task_code_literal(mut self, literal: &str) -> Self {
        self.task_code_literals.push(literal.to_string());
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity.clamp(0.0, 1.0));
        self
    }

    pub fn is_line_item_header(&self, row_text: &str) -> bool {
        self.line_item_header.is_match(row_text)
    }

    pub fn is_ac_header(&self, row_text: &str) -> bool {
        row_text.starts_with(self.ac_header.as_str())
    }

    pub fn is_date(&self, token: &str) -> bool {
        self.date.is_match(token)
    }

    /// Token that terminates the name span
    pub fn is_task_code(&self, token: &str) -> bool {
        self.task_code.is_match(token) || self.task_code_literals.iter().any(|l| l == token)
    }
}

fn anchored(pattern: &str) -> String {
    let mut p = pattern.to_string();
    if !p.starts_with('^') {
        p.insert(0, '^');
    }
    if !p.ends_with('$') {
        p.push('$');
    }
    p
}

/// Billing platform whose invoice layout is being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    #[default]
    Standard,
    CounselLink,
}

impl Platform {
    /// Resolve the ruleset for this platform
    pub fn dialect(&self) -> Result<Dialect, HighlightError> {
        match self {
            Platform::Standard => Ok(Dialect::standard()),
            Platform::CounselLink => Err(HighlightError::NotImplemented(
                "CounselLink highlighting is currently in development".to_string(),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Standard => "standard",
            Platform::CounselLink => "counsellink",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = HighlightError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "default" => Ok(Platform::Standard),
            "counsellink" | "counsel-link" => Ok(Platform::CounselLink),
            other => Err(HighlightError::NotImplemented(format!(
                "platform '{}' is not supported",
                other
            ))),
        }
    }
}
