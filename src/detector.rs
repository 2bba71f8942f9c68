//! Text layer detection
//!
//! Highlighting needs an extractable text layer. This module samples a few
//! pages for text show operators (Tj/TJ) and image placements (Do) so that
//! scanned invoices are rejected before any segmentation work starts.

use crate::HighlightError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::Path;

/// PDF type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfType {
    /// PDF has extractable text (Tj/TJ operators found)
    TextBased,
    /// PDF appears to be scanned (images only, no text operators)
    Scanned,
    /// PDF contains mostly images with minimal text
    ImageBased,
    /// PDF has a mix of text and image-heavy pages
    Mixed,
}

impl PdfType {
    /// Whether the document carries enough text to locate line items
    pub fn has_text_layer(&self) -> bool {
        matches!(self, PdfType::TextBased | PdfType::Mixed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PdfType::TextBased => "text_based",
            PdfType::Scanned => "scanned",
            PdfType::ImageBased => "image_based",
            PdfType::Mixed => "mixed",
        }
    }
}

/// Result of PDF type detection
#[derive(Debug, Clone)]
pub struct PdfTypeResult {
    pub pdf_type: PdfType,
    /// Number of pages in the document
    pub page_count: u32,
    /// Number of pages sampled for detection
    pub pages_sampled: u32,
    /// Number of sampled pages with text operators
    pub pages_with_text: u32,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Title from metadata (if available)
    pub title: Option<String>,
}

/// Configuration for PDF type detection
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Maximum number of pages to sample (default: 5)
    pub max_pages_to_sample: u32,
    /// Minimum text operator count per page to consider as text-based
    pub min_text_ops_per_page: u32,
    /// Threshold ratio of text pages to total pages for classification
    pub text_page_ratio_threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_pages_to_sample: 5,
            min_text_ops_per_page: 3,
            text_page_ratio_threshold: 0.6,
        }
    }
}

/// Detect PDF type from file path
pub fn detect_pdf_type<P: AsRef<Path>>(path: P) -> Result<PdfTypeResult, HighlightError> {
    let doc = Document::load(path)?;
    Ok(detect_from_document(&doc, &DetectionConfig::default()))
}

/// Detect PDF type from memory buffer
pub fn detect_pdf_type_mem(buffer: &[u8]) -> Result<PdfTypeResult, HighlightError> {
    let doc = Document::load_mem(buffer)?;
    Ok(detect_from_document(&doc, &DetectionConfig::default()))
}

/// Detect PDF type of an already loaded document
pub fn detect_from_document(doc: &Document, config: &DetectionConfig) -> PdfTypeResult {
    let pages = doc.get_pages();
    let total_pages = pages.len() as u32;
    let sample = sample_page_numbers(total_pages, config.max_pages_to_sample);

    let mut counts = SampleCounts::default();
    for page_num in &sample {
        if let Some(&page_id) = pages.get(page_num) {
            let analysis = analyze_page_content(doc, page_id);
            if analysis.text_operator_count >= config.min_text_ops_per_page {
                counts.pages_with_text += 1;
            }
            if analysis.has_images {
                counts.pages_with_images += 1;
            }
            counts.total_text_ops += analysis.text_operator_count;
        }
    }
    counts.pages_sampled = sample.len() as u32;

    let (pdf_type, confidence) = classify(&counts, config);
    log::debug!(
        "detected {} ({} of {} sampled pages with text)",
        pdf_type.as_str(),
        counts.pages_with_text,
        counts.pages_sampled
    );

    PdfTypeResult {
        pdf_type,
        page_count: total_pages,
        pages_sampled: counts.pages_sampled,
        pages_with_text: counts.pages_with_text,
        confidence,
        title: get_document_title(doc),
    }
}

/// First page, last page, and evenly spaced pages in between
fn sample_page_numbers(total_pages: u32, max_samples: u32) -> Vec<u32> {
    let to_sample = max_samples.min(total_pages);
    if to_sample >= total_pages {
        return (1..=total_pages).collect();
    }

    let mut indices = vec![1];
    if to_sample > 1 {
        indices.push(total_pages);
    }
    let remaining = to_sample.saturating_sub(2);
    if remaining > 0 && total_pages > 2 {
        let step = (total_pages - 2) / (remaining + 1);
        for i in 1..=remaining {
            let idx = 1 + step * i;
            if idx > 1 && idx < total_pages {
                indices.push(idx);
            }
        }
    }
    indices.sort_unstable();
    indices.dedup();
    indices
}

#[derive(Debug, Default)]
struct SampleCounts {
    pages_sampled: u32,
    pages_with_text: u32,
    pages_with_images: u32,
    total_text_ops: u32,
}

fn classify(counts: &SampleCounts, config: &DetectionConfig) -> (PdfType, f32) {
    let text_ratio = if counts.pages_sampled > 0 {
        counts.pages_with_text as f32 / counts.pages_sampled as f32
    } else {
        0.0
    };

    if text_ratio >= config.text_page_ratio_threshold {
        (PdfType::TextBased, text_ratio)
    } else if counts.pages_with_text == 0 && counts.pages_with_images > 0 {
        if counts.total_text_ops == 0 {
            (PdfType::Scanned, 0.95)
        } else {
            (PdfType::ImageBased, 0.8)
        }
    } else if counts.pages_with_text > 0 && counts.pages_with_images > 0 {
        (PdfType::Mixed, 0.7)
    } else if counts.total_text_ops == 0 {
        (PdfType::Scanned, 0.9)
    } else {
        (PdfType::TextBased, text_ratio.max(0.5))
    }
}

struct PageAnalysis {
    text_operator_count: u32,
    has_images: bool,
}

/// Scan a page's content streams and XObject resources
fn analyze_page_content(doc: &Document, page_id: ObjectId) -> PageAnalysis {
    let mut text_ops = 0u32;
    let mut has_images = false;

    for content_id in doc.get_page_contents(page_id) {
        if let Ok(Object::Stream(stream)) = doc.get_object(content_id) {
            let content = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            let (ops, imgs) = scan_content_for_text_operators(&content);
            text_ops += ops;
            has_images |= imgs;
        }
    }

    PageAnalysis {
        text_operator_count: text_ops,
        has_images: has_images || page_has_image_xobject(doc, page_id),
    }
}

/// Fast byte scan for `Tj`/`TJ` text operators and `Do` placements
fn scan_content_for_text_operators(content: &[u8]) -> (u32, bool) {
    let is_delimiter = |i: usize| i >= content.len() || content[i].is_ascii_whitespace();

    let mut text_ops = 0u32;
    let mut has_images = false;
    for i in 0..content.len().saturating_sub(1) {
        match (content[i], content[i + 1]) {
            (b'T', b'j' | b'J') if is_delimiter(i + 2) => text_ops += 1,
            (b'D', b'o') if is_delimiter(i + 2) => has_images = true,
            _ => {}
        }
    }
    (text_ops, has_images)
}

fn as_dictionary<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn page_has_image_xobject(doc: &Document, page_id: ObjectId) -> bool {
    let Some(xobjects) = doc
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Resources").ok())
        .and_then(|res| as_dictionary(doc, res))
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|xobj| as_dictionary(doc, xobj))
    else {
        return false;
    };

    xobjects.iter().any(|(_, value)| {
        value
            .as_reference()
            .ok()
            .and_then(|id| doc.get_object(id).ok())
            .and_then(|obj| obj.as_stream().ok())
            .and_then(|stream| stream.dict.get(b"Subtype").ok())
            .and_then(|subtype| subtype.as_name().ok())
            .is_some_and(|name| name == b"Image")
    })
}

/// Get document title from Info dictionary
pub fn get_document_title(doc: &Document) -> Option<String> {
    let info_ref = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let info = doc.get_dictionary(info_ref).ok()?;

    match info.get(b"Title").ok()? {
        Object::String(bytes, _) => {
            // UTF-16BE with BOM
            if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
                let utf16: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                    .collect();
                Some(String::from_utf16_lossy(&utf16))
            } else {
                Some(String::from_utf8_lossy(bytes).to_string())
            }
        }
        _ => None,
    }
}
