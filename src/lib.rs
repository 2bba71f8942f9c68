//! Timekeeper and Adjustments and Credit highlighting for invoice PDFs
//!
//! This crate provides:
//! - Positioned word extraction and row reconstruction using lopdf
//! - Line item segmentation and timekeeper name extraction per invoice layout
//! - Stable per-timekeeper colors and highlight annotations written back
//!   into the PDF

pub mod annotate;
pub mod colors;
pub mod detector;
pub mod dialect;
pub mod extractor;
pub mod keeper;
pub mod planner;
pub mod region;
pub mod rows;
pub mod segmenter;

pub use annotate::{emit_mark, AnnotationBackend, Binding, LopdfAnnotator, MarkStyle};
pub use colors::{Color, ColorAssigner, PALETTE};
pub use detector::{detect_pdf_type, DetectionConfig, PdfType, PdfTypeResult};
pub use dialect::{Dialect, Platform};
pub use extractor::{extract_words, extract_words_mem, PageGeometry, PageWords, Word};
pub use keeper::{extract_keeper_name, KeeperKey, NameSpan};
pub use planner::{plan_highlights, HighlightPlan, Mark, MarkTarget};
pub use region::{Rect, RegionComputer};
pub use rows::{build_rows, Row};
pub use segmenter::{segment_line_items, LineItem, LineItemSegmenter};

use lopdf::Document;
use std::path::{Path, PathBuf};

/// Largest accepted input document (10 MB)
pub const DEFAULT_MAX_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Options for one highlighting run
#[derive(Debug, Clone)]
pub struct HighlightOptions {
    /// Invoice layout to apply
    pub platform: Platform,
    /// Margin added around every highlight region
    pub padding: f32,
    /// Regions thinner than this in either dimension are skipped
    pub min_dimension: f32,
    pub max_input_bytes: usize,
    /// Overrides the dialect's highlight opacity
    pub opacity: Option<f32>,
    /// Title written into the output document's metadata
    pub title: Option<String>,
    pub detection: DetectionConfig,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            platform: Platform::Standard,
            padding: 0.0,
            min_dimension: region::DEFAULT_MIN_DIMENSION,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            opacity: None,
            title: None,
            detection: DetectionConfig::default(),
        }
    }
}

/// Summary of one highlighting run
#[derive(Debug, Clone)]
pub struct HighlightReport {
    pub pdf_type: PdfType,
    pub page_count: u32,
    /// Line items with an A&C block
    pub line_items: usize,
    /// Keeper colors in first-seen order
    pub keepers: Vec<(KeeperKey, Color)>,
    /// Highlight annotations added
    pub highlights: usize,
    /// Rectangle outlines added where no highlight could bind
    pub outline_fallbacks: usize,
    pub skipped_regions: usize,
    pub skipped_names: usize,
    pub degraded_names: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Highlighted document and its report
#[derive(Debug)]
pub struct HighlightOutput {
    pub pdf: Vec<u8>,
    pub report: HighlightReport,
}

/// Highlight a PDF file and write the result to `output`
pub fn highlight_invoice<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    options: &HighlightOptions,
) -> Result<HighlightReport, HighlightError> {
    let buffer = std::fs::read(input.as_ref())?;
    let result = highlight_invoice_mem(&buffer, options)?;

    let output = output.as_ref();
    std::fs::write(output, &result.pdf)?;
    if !output.exists() {
        return Err(HighlightError::MissingOutput(output.to_path_buf()));
    }

    Ok(result.report)
}

/// Highlight a PDF held in memory
pub fn highlight_invoice_mem(
    buffer: &[u8],
    options: &HighlightOptions,
) -> Result<HighlightOutput, HighlightError> {
    // Unsupported platforms fail before the document is touched
    let mut dialect = options.platform.dialect()?;
    if let Some(opacity) = options.opacity {
        dialect = dialect.with_opacity(opacity);
    }
    highlight_with_dialect(buffer, &dialect, options)
}

/// Highlight a PDF held in memory using an explicit dialect
pub fn highlight_with_dialect(
    buffer: &[u8],
    dialect: &Dialect,
    options: &HighlightOptions,
) -> Result<HighlightOutput, HighlightError> {
    let start = std::time::Instant::now();

    validate_input(buffer, options.max_input_bytes)?;
    let mut doc = Document::load_mem(buffer)?;

    let detection = detector::detect_from_document(&doc, &options.detection);
    if !detection.pdf_type.has_text_layer() {
        return Err(HighlightError::NoTextLayer(detection.pdf_type));
    }

    let pages = extractor::extract_words_from_doc(&doc)?;
    let regions = RegionComputer::new(options.padding, options.min_dimension);
    let plan = plan_highlights(&pages, dialect, &regions);

    let mut highlights = 0;
    let mut outline_fallbacks = 0;
    {
        let mut annotator = LopdfAnnotator::new(&mut doc, &pages);
        for mark in &plan.marks {
            let style = MarkStyle {
                color: mark.color,
                opacity: dialect.opacity,
            };
            match emit_mark(&mut annotator, mark.page, &mark.rect, &style)? {
                Binding::Bound => highlights += 1,
                Binding::Unsupported => outline_fallbacks += 1,
            }
        }
    }

    if let Some(title) = &options.title {
        annotate::set_document_title(&mut doc, title);
    }
    let pdf = annotate::save_document(&mut doc)?;

    let report = HighlightReport {
        pdf_type: detection.pdf_type,
        page_count: detection.page_count,
        line_items: plan.items.len(),
        keepers: plan.keepers,
        highlights,
        outline_fallbacks,
        skipped_regions: plan.skipped_regions,
        skipped_names: plan.skipped_names,
        degraded_names: plan.degraded_names,
        processing_time_ms: start.elapsed().as_millis() as u64,
    };
    log::info!(
        "{} line items, {} keepers, {} highlights ({} outlines) in {}ms",
        report.line_items,
        report.keepers.len(),
        report.highlights,
        report.outline_fallbacks,
        report.processing_time_ms
    );

    Ok(HighlightOutput { pdf, report })
}

/// Reject input that cannot be a PDF we are willing to process
fn validate_input(buffer: &[u8], max_bytes: usize) -> Result<(), HighlightError> {
    if buffer.is_empty() {
        return Err(HighlightError::InvalidInput("empty file".to_string()));
    }
    if buffer.len() > max_bytes {
        return Err(HighlightError::InvalidInput(format!(
            "file size must be less than {} MB",
            max_bytes / (1024 * 1024)
        )));
    }
    // The header may follow up to 1024 bytes of leading junk
    let head = &buffer[..buffer.len().min(1024)];
    if !head.windows(5).any(|w| w == b"%PDF-") {
        return Err(HighlightError::InvalidInput(
            "only PDF files are allowed".to_string(),
        ));
    }
    Ok(())
}

/// Default output path: `<input stem>.highlighted.pdf` next to the input
pub fn default_output_path<P: AsRef<Path>>(input: P) -> PathBuf {
    input.as_ref().with_extension("highlighted.pdf")
}

#[derive(Debug, thiserror::Error)]
pub enum HighlightError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("failed to save PDF: {0}")]
    Save(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("PDF has no extractable text layer ({})", .0.as_str())]
    NoTextLayer(PdfType),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("output file was not created: {}", .0.display())]
    MissingOutput(PathBuf),
    #[error("annotation error: {0}")]
    Annotation(String),
}

impl From<lopdf::Error> for HighlightError {
    fn from(e: lopdf::Error) -> Self {
        HighlightError::Parse(e.to_string())
    }
}
