//! Positioned word extraction from PDF using lopdf
//!
//! This module interprets each page's content stream, tracks glyph advances,
//! and merges glyphs into words whose boxes use a top-left page origin.

use crate::HighlightError;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::Path;

/// Maximum horizontal gap between two glyphs of the same word
const X_TOLERANCE: f32 = 1.0;
/// Maximum baseline drift between two glyphs of the same word
const Y_TOLERANCE: f32 = 1.0;
/// Glyph box extent above the baseline, as a fraction of the font size
const ASCENT: f32 = 0.8;
/// Glyph box extent below the baseline, as a fraction of the font size
const DESCENT: f32 = 0.2;
/// Glyph width (thousandths of an em) used when the font carries no metrics
const DEFAULT_GLYPH_WIDTH: f32 = 500.0;

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// A word with its bounding box on the page
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    /// The text content
    pub text: String,
    /// Left edge
    pub x0: f32,
    /// Right edge
    pub x1: f32,
    /// Top edge, measured down from the top of the page
    pub top: f32,
    /// Bottom edge, measured down from the top of the page
    pub bottom: f32,
    /// Page number (1-indexed)
    pub page: u32,
}

impl Word {
    pub fn new(text: impl Into<String>, x0: f32, x1: f32, top: f32, bottom: f32, page: u32) -> Self {
        Self {
            text: text.into(),
            x0,
            x1,
            top,
            bottom,
            page,
        }
    }
}

/// Page MediaBox in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageGeometry {
    /// US Letter, used when a page has no resolvable MediaBox
    pub const LETTER: PageGeometry = PageGeometry {
        x0: 0.0,
        y0: 0.0,
        x1: 612.0,
        y1: 792.0,
    };

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::LETTER
    }
}

/// Words of a single page, in content stream order
#[derive(Debug, Clone)]
pub struct PageWords {
    /// Page number (1-indexed)
    pub page: u32,
    pub geometry: PageGeometry,
    pub words: Vec<Word>,
}

/// Extract positioned words from a PDF file
pub fn extract_words<P: AsRef<Path>>(path: P) -> Result<Vec<PageWords>, HighlightError> {
    let doc = Document::load(path)?;
    extract_words_from_doc(&doc)
}

/// Extract positioned words from a PDF memory buffer
pub fn extract_words_mem(buffer: &[u8]) -> Result<Vec<PageWords>, HighlightError> {
    let doc = Document::load_mem(buffer)?;
    extract_words_from_doc(&doc)
}

/// Extract positioned words from every page of a loaded document
pub fn extract_words_from_doc(doc: &Document) -> Result<Vec<PageWords>, HighlightError> {
    let pages = doc.get_pages();
    let mut all_pages = Vec::with_capacity(pages.len());

    for (&page_num, &page_id) in pages.iter() {
        all_pages.push(extract_page_words(doc, page_id, page_num)?);
    }

    Ok(all_pages)
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

fn translation(tx: f32, ty: f32) -> [f32; 6] {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

/// A single decoded glyph in user space
#[derive(Debug, Clone)]
struct Glyph {
    ch: char,
    x0: f32,
    x1: f32,
    baseline: f32,
    size: f32,
}

/// Width metrics of a font resource
#[derive(Debug, Clone)]
struct FontMetrics {
    first_char: i64,
    widths: Vec<f32>,
    default_width: f32,
    /// Composite (Type0) fonts use two-byte codes
    two_byte: bool,
}

impl FontMetrics {
    fn fallback() -> Self {
        Self {
            first_char: 0,
            widths: Vec::new(),
            default_width: DEFAULT_GLYPH_WIDTH,
            two_byte: false,
        }
    }

    fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font.get(b"Subtype").ok().and_then(|s| s.as_name().ok());
        if subtype == Some(b"Type0".as_slice()) {
            let default_width = descendant_font(doc, font)
                .and_then(|d| d.get(b"DW").ok().and_then(get_number))
                .unwrap_or(1000.0);
            return Self {
                first_char: 0,
                widths: Vec::new(),
                default_width,
                two_byte: true,
            };
        }

        let first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(0);
        let widths = font
            .get(b"Widths")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|w| get_number(resolve(doc, w)).unwrap_or(0.0))
                    .collect()
            })
            .unwrap_or_default();
        let default_width = font
            .get(b"FontDescriptor")
            .ok()
            .map(|o| resolve(doc, o))
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"MissingWidth").ok().and_then(get_number))
            .filter(|w| *w > 0.0)
            .unwrap_or(DEFAULT_GLYPH_WIDTH);

        Self {
            first_char,
            widths,
            default_width,
            two_byte: false,
        }
    }

    /// Glyph width in thousandths of an em
    fn width(&self, code: u32) -> f32 {
        let idx = code as i64 - self.first_char;
        if idx >= 0 {
            if let Some(&w) = self.widths.get(idx as usize) {
                if w > 0.0 {
                    return w;
                }
            }
        }
        self.default_width
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| c.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
                .collect()
        } else {
            bytes.iter().map(|&b| b as u32).collect()
        }
    }
}

fn descendant_font<'a>(doc: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    let descendants = resolve(doc, font.get(b"DescendantFonts").ok()?).as_array().ok()?;
    resolve(doc, descendants.first()?).as_dict().ok()
}

/// Text state tracked while interpreting a content stream
struct TextState {
    font: Vec<u8>,
    font_size: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
    leading: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
}

impl TextState {
    fn new() -> Self {
        Self {
            font: Vec::new(),
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
        }
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_matrix = multiply_matrices(&translation(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn next_line(&mut self) {
        let leading = if self.leading != 0.0 {
            self.leading
        } else {
            // No TL seen, approximate the line height
            self.font_size * 1.2
        };
        self.move_line(0.0, -leading);
    }

    /// Advance the text matrix by a horizontal text-space displacement
    fn advance(&mut self, tx: f32) {
        self.text_matrix = multiply_matrices(&translation(tx, 0.0), &self.text_matrix);
    }
}

/// Per-page interpretation context
struct PageContext<'a> {
    doc: &'a Document,
    fonts: BTreeMap<Vec<u8>, &'a Dictionary>,
    metrics: BTreeMap<Vec<u8>, FontMetrics>,
}

impl<'a> PageContext<'a> {
    fn metrics(&mut self, font: &[u8]) -> FontMetrics {
        if let Some(m) = self.metrics.get(font) {
            return m.clone();
        }
        let m = self
            .fonts
            .get(font)
            .map(|dict| FontMetrics::from_dict(self.doc, dict))
            .unwrap_or_else(FontMetrics::fallback);
        self.metrics.insert(font.to_vec(), m.clone());
        m
    }

    /// Decode a text operand, handling encoding
    fn decode(&self, font: &[u8], bytes: &[u8]) -> String {
        if let Some(font_dict) = self.fonts.get(font) {
            if let Ok(encoding) = font_dict.get_font_encoding(self.doc) {
                if let Ok(text) = Document::decode_text(&encoding, bytes) {
                    return text;
                }
            }
        }

        // Fallback: try UTF-16BE then Latin-1
        if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
            let utf16: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                .collect();
            return String::from_utf16_lossy(&utf16);
        }

        bytes.iter().map(|&b| b as char).collect()
    }

    /// Show a string at the current text position, pushing glyphs and
    /// advancing the text matrix
    fn show(&mut self, state: &mut TextState, ctm: &[f32; 6], bytes: &[u8], glyphs: &mut Vec<Glyph>) {
        let font = state.font.clone();
        let metrics = self.metrics(&font);
        let text = self.decode(&font, bytes);
        let codes = metrics.codes(bytes);
        let chars: Vec<char> = text.chars().collect();

        let fs = state.font_size;
        let th = state.horizontal_scale;

        // Each char gets its code's width when the decoding is 1:1, otherwise
        // the string's total width is spread evenly.
        let per_char: Vec<(f32, bool)> = if chars.len() == codes.len() {
            codes
                .iter()
                .map(|&c| (metrics.width(c), !metrics.two_byte && c == 32))
                .collect()
        } else {
            let total: f32 = codes.iter().map(|&c| metrics.width(c)).sum();
            let share = if chars.is_empty() {
                0.0
            } else {
                total / chars.len() as f32
            };
            chars.iter().map(|&ch| (share, ch == ' ')).collect()
        };

        for (ch, (w, is_space)) in chars.into_iter().zip(per_char) {
            let glyph_width = w / 1000.0 * fs;
            let mut tx = glyph_width + state.char_spacing;
            if is_space {
                tx += state.word_spacing;
            }
            tx *= th;

            let combined = multiply_matrices(&state.text_matrix, ctm);
            let size = effective_font_size(fs, &combined);
            let x0 = combined[4];
            let x1 = x0 + glyph_width * th * combined[0];
            glyphs.push(Glyph {
                ch,
                x0: x0.min(x1),
                x1: x0.max(x1),
                baseline: combined[5],
                size,
            });

            state.advance(tx);
        }
    }
}

/// Extract words from a single page
fn extract_page_words(
    doc: &Document,
    page_id: ObjectId,
    page_num: u32,
) -> Result<PageWords, HighlightError> {
    let geometry = page_geometry(doc, page_id);

    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| HighlightError::Parse(e.to_string()))?;
    let content =
        Content::decode(&content_data).map_err(|e| HighlightError::Parse(e.to_string()))?;

    let mut ctx = PageContext {
        doc,
        fonts: doc.get_page_fonts(page_id).unwrap_or_default(),
        metrics: BTreeMap::new(),
    };

    let mut ctm = IDENTITY;
    let mut ctm_stack: Vec<[f32; 6]> = Vec::new();
    let mut state = TextState::new();
    let mut in_text_block = false;
    let mut glyphs = Vec::new();

    for op in &content.operations {
        let num = |i: usize| op.operands.get(i).and_then(get_number);
        match op.operator.as_str() {
            "q" => ctm_stack.push(ctm),
            "Q" => {
                if let Some(saved) = ctm_stack.pop() {
                    ctm = saved;
                }
            }
            "cm" => {
                if op.operands.len() >= 6 {
                    let m = [
                        num(0).unwrap_or(1.0),
                        num(1).unwrap_or(0.0),
                        num(2).unwrap_or(0.0),
                        num(3).unwrap_or(1.0),
                        num(4).unwrap_or(0.0),
                        num(5).unwrap_or(0.0),
                    ];
                    ctm = multiply_matrices(&m, &ctm);
                }
            }
            "BT" => {
                in_text_block = true;
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "ET" => in_text_block = false,
            "Tf" => {
                if let Some(Ok(name)) = op.operands.first().map(|o| o.as_name()) {
                    state.font = name.to_vec();
                }
                if let Some(size) = num(1) {
                    state.font_size = size;
                }
            }
            "Tc" => state.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => state.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => state.horizontal_scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => state.leading = num(0).unwrap_or(0.0),
            "Td" => state.move_line(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
            "TD" => {
                let ty = num(1).unwrap_or(0.0);
                state.leading = -ty;
                state.move_line(num(0).unwrap_or(0.0), ty);
            }
            "Tm" => {
                if op.operands.len() >= 6 {
                    for (i, slot) in state.text_matrix.iter_mut().enumerate() {
                        *slot = num(i).unwrap_or(IDENTITY[i]);
                    }
                    state.line_matrix = state.text_matrix;
                }
            }
            "T*" => state.next_line(),
            "Tj" if in_text_block => {
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    ctx.show(&mut state, &ctm, bytes, &mut glyphs);
                }
            }
            "TJ" if in_text_block => {
                if let Some(Ok(array)) = op.operands.first().map(|o| o.as_array()) {
                    for element in array {
                        match element {
                            Object::String(bytes, _) => {
                                ctx.show(&mut state, &ctm, bytes, &mut glyphs)
                            }
                            other => {
                                if let Some(adjust) = get_number(other) {
                                    let tx = -adjust / 1000.0
                                        * state.font_size
                                        * state.horizontal_scale;
                                    state.advance(tx);
                                }
                            }
                        }
                    }
                }
            }
            "'" if in_text_block => {
                state.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.first() {
                    ctx.show(&mut state, &ctm, bytes, &mut glyphs);
                }
            }
            "\"" if in_text_block => {
                state.word_spacing = num(0).unwrap_or(state.word_spacing);
                state.char_spacing = num(1).unwrap_or(state.char_spacing);
                state.next_line();
                if let Some(Object::String(bytes, _)) = op.operands.get(2) {
                    ctx.show(&mut state, &ctm, bytes, &mut glyphs);
                }
            }
            _ => {}
        }
    }

    let words = merge_glyphs(glyphs, &geometry, page_num);
    log::debug!("page {}: {} words", page_num, words.len());

    Ok(PageWords {
        page: page_num,
        geometry,
        words,
    })
}

/// Accumulates consecutive glyphs of one word
struct WordBuilder {
    text: String,
    x0: f32,
    x1: f32,
    y_top: f32,
    y_bottom: f32,
    last: Glyph,
}

impl WordBuilder {
    fn start(glyph: Glyph) -> Self {
        let mut text = String::new();
        text.push(glyph.ch);
        Self {
            text,
            x0: glyph.x0,
            x1: glyph.x1,
            y_top: glyph.baseline + ASCENT * glyph.size,
            y_bottom: glyph.baseline - DESCENT * glyph.size,
            last: glyph,
        }
    }

    fn accepts(&self, glyph: &Glyph) -> bool {
        (glyph.baseline - self.last.baseline).abs() <= Y_TOLERANCE
            && glyph.x0 - self.last.x1 <= X_TOLERANCE
            && glyph.x0 >= self.last.x0 - X_TOLERANCE
    }

    fn push(&mut self, glyph: Glyph) {
        self.text.push(glyph.ch);
        self.x0 = self.x0.min(glyph.x0);
        self.x1 = self.x1.max(glyph.x1);
        self.y_top = self.y_top.max(glyph.baseline + ASCENT * glyph.size);
        self.y_bottom = self.y_bottom.min(glyph.baseline - DESCENT * glyph.size);
        self.last = glyph;
    }

    fn finish(self, geometry: &PageGeometry, page: u32) -> Word {
        Word {
            text: self.text,
            x0: self.x0 - geometry.x0,
            x1: self.x1 - geometry.x0,
            top: geometry.y1 - self.y_top,
            bottom: geometry.y1 - self.y_bottom,
            page,
        }
    }
}

/// Merge glyphs (in stream order) into words. Whitespace always ends a word.
fn merge_glyphs(glyphs: Vec<Glyph>, geometry: &PageGeometry, page: u32) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current: Option<WordBuilder> = None;

    for glyph in glyphs {
        if glyph.ch.is_whitespace() || glyph.ch.is_control() {
            if let Some(builder) = current.take() {
                words.push(builder.finish(geometry, page));
            }
            continue;
        }

        match current.as_mut() {
            Some(builder) if builder.accepts(&glyph) => builder.push(glyph),
            _ => {
                if let Some(builder) = current.take() {
                    words.push(builder.finish(geometry, page));
                }
                current = Some(WordBuilder::start(glyph));
            }
        }
    }

    if let Some(builder) = current {
        words.push(builder.finish(geometry, page));
    }

    words
}

/// Resolve the page MediaBox, walking up the page tree via /Parent
fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    let media_box = resolve_inherited(doc, page_id, b"MediaBox")
        .map(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .and_then(|arr| {
            let nums: Vec<f32> = arr.iter().filter_map(|o| get_number(resolve(doc, o))).collect();
            (nums.len() == 4).then(|| PageGeometry {
                x0: nums[0].min(nums[2]),
                y0: nums[1].min(nums[3]),
                x1: nums[0].max(nums[2]),
                y1: nums[1].max(nums[3]),
            })
        });

    media_box.unwrap_or_default()
}

/// Look up a key on the page dictionary or its ancestors
fn resolve_inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current_id = page_id;
    // Bounded walk, guards against /Parent cycles
    for _ in 0..32 {
        let dict = doc.get_dictionary(current_id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Follow an indirect reference, if any
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Compute effective font size from base size and the text rendering matrix
fn effective_font_size(base_size: f32, matrix: &[f32; 6]) -> f32 {
    let scale_y = (matrix[2].powi(2) + matrix[3].powi(2)).sqrt();
    base_size * scale_y
}
