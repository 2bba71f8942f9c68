//! Annotation output
//!
//! [`AnnotationBackend`] is the seam between highlight planning and the PDF
//! writer. [`LopdfAnnotator`] is the lopdf implementation: `/Highlight`
//! annotations where text lies under the rectangle, `/Square` outlines
//! otherwise, each with a Flate-compressed appearance stream.

use crate::colors::Color;
use crate::extractor::{PageGeometry, PageWords};
use crate::region::Rect;
use crate::HighlightError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Write;

/// Author marker written into every annotation this crate creates
pub const ANNOTATION_AUTHOR: &str = "invoice-highlighter";

/// Whether a highlight can be bound to a rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Bound,
    Unsupported,
}

/// Visual style of one mark
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkStyle {
    pub color: Color,
    /// Constant opacity; `None` leaves the viewer default
    pub opacity: Option<f32>,
}

/// PDF annotation writer
pub trait AnnotationBackend {
    /// Can a highlight annotation bind to `rect` on `page`
    fn probe_highlight(&self, page: u32, rect: &Rect) -> Binding;

    fn add_highlight(&mut self, page: u32, rect: &Rect, style: &MarkStyle)
        -> Result<(), HighlightError>;

    fn add_outline(&mut self, page: u32, rect: &Rect, style: &MarkStyle)
        -> Result<(), HighlightError>;
}

/// Add a highlight, falling back to an outline when none can be bound.
///
/// Returns the probe outcome, `Unsupported` meaning the outline was used.
pub fn emit_mark<B: AnnotationBackend + ?Sized>(
    backend: &mut B,
    page: u32,
    rect: &Rect,
    style: &MarkStyle,
) -> Result<Binding, HighlightError> {
    let binding = backend.probe_highlight(page, rect);
    match binding {
        Binding::Bound => backend.add_highlight(page, rect, style)?,
        Binding::Unsupported => {
            log::warn!(
                "no text under {:?} on page {}, drawing outline instead",
                rect,
                page
            );
            backend.add_outline(page, rect, style)?
        }
    }
    Ok(binding)
}

/// Writes annotations into a loaded lopdf document
pub struct LopdfAnnotator<'a> {
    doc: &'a mut Document,
    pages: BTreeMap<u32, ObjectId>,
    geometry: BTreeMap<u32, PageGeometry>,
    word_boxes: BTreeMap<u32, Vec<Rect>>,
    created: usize,
}

impl<'a> LopdfAnnotator<'a> {
    /// `pages` supplies page geometry and the word boxes used to decide
    /// whether a highlight binds
    pub fn new(doc: &'a mut Document, pages: &[PageWords]) -> Self {
        let page_ids = doc.get_pages();
        let geometry = pages.iter().map(|p| (p.page, p.geometry)).collect();
        let word_boxes = pages
            .iter()
            .map(|p| {
                let boxes = p
                    .words
                    .iter()
                    .map(|w| Rect {
                        x0: w.x0,
                        top: w.top,
                        x1: w.x1,
                        bottom: w.bottom,
                    })
                    .collect();
                (p.page, boxes)
            })
            .collect();

        let annotator = Self {
            doc,
            pages: page_ids,
            geometry,
            word_boxes,
            created: 0,
        };

        let previous = annotator.existing_marks();
        if previous > 0 {
            log::warn!(
                "document already carries {} highlights from a previous run; adding new ones anyway",
                previous
            );
        }
        annotator
    }

    /// Number of annotations created so far
    pub fn created(&self) -> usize {
        self.created
    }

    /// Count annotations authored by this crate already in the document
    pub fn existing_marks(&self) -> usize {
        self.pages
            .values()
            .filter_map(|&id| self.doc.get_dictionary(id).ok())
            .filter_map(|page| page.get(b"Annots").ok())
            .filter_map(|annots| self.resolve(annots).as_array().ok())
            .flat_map(|arr| arr.iter())
            .filter_map(|a| self.resolve(a).as_dict().ok())
            .filter(|annot| {
                matches!(annot.get(b"T"), Ok(Object::String(t, _)) if t.as_slice() == ANNOTATION_AUTHOR.as_bytes())
            })
            .count()
    }

    fn resolve<'o>(&'o self, obj: &'o Object) -> &'o Object {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            _ => obj,
        }
    }

    /// Convert a top-left-origin rect to PDF user space [llx, lly, urx, ury]
    fn user_space(&self, page: u32, rect: &Rect) -> [f32; 4] {
        let g = self.geometry.get(&page).copied().unwrap_or_default();
        [g.x0 + rect.x0, g.y1 - rect.bottom, g.x0 + rect.x1, g.y1 - rect.top]
    }

    fn page_id(&self, page: u32) -> Result<ObjectId, HighlightError> {
        self.pages
            .get(&page)
            .copied()
            .ok_or_else(|| HighlightError::Annotation(format!("page {} not found", page)))
    }

    fn add_annotation(
        &mut self,
        page: u32,
        rect: &Rect,
        style: &MarkStyle,
        subtype: &str,
        appearance: String,
    ) -> Result<(), HighlightError> {
        let page_id = self.page_id(page)?;
        let [llx, lly, urx, ury] = self.user_space(page, rect);
        let [r, g, b] = style.color.components();

        let ap_id = self.add_appearance(urx - llx, ury - lly, style.opacity, &appearance)?;

        let serial = self.created + 1;
        let mut annot = dictionary! {
            "Type" => "Annot",
            "Subtype" => subtype,
            "Rect" => vec![llx.into(), lly.into(), urx.into(), ury.into()],
            "C" => vec![r.into(), g.into(), b.into()],
            "F" => 4i64,
            "P" => page_id,
            "T" => Object::string_literal(ANNOTATION_AUTHOR),
            "NM" => Object::string_literal(format!("{}-{}", ANNOTATION_AUTHOR, serial)),
            "AP" => dictionary! { "N" => ap_id },
        };
        if subtype == "Highlight" {
            annot.set(
                "QuadPoints",
                vec![
                    llx.into(),
                    ury.into(),
                    urx.into(),
                    ury.into(),
                    llx.into(),
                    lly.into(),
                    urx.into(),
                    lly.into(),
                ],
            );
        } else {
            annot.set("BS", dictionary! { "W" => 1i64 });
        }
        if let Some(opacity) = style.opacity {
            annot.set("CA", opacity);
        }

        let annot_id = self.doc.add_object(annot);
        self.attach(page_id, annot_id)?;
        self.created = serial;
        Ok(())
    }

    /// Normal appearance: a Form XObject sized to the annotation rect
    fn add_appearance(
        &mut self,
        width: f32,
        height: f32,
        opacity: Option<f32>,
        content: &str,
    ) -> Result<ObjectId, HighlightError> {
        let mut gs = dictionary! {
            "Type" => "ExtGState",
            "BM" => "Multiply",
        };
        if let Some(opacity) = opacity {
            gs.set("CA", opacity);
            gs.set("ca", opacity);
        }

        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Resources" => dictionary! {
                "ExtGState" => dictionary! { "GS0" => gs },
            },
            "Filter" => "FlateDecode",
        };
        let stream = Stream::new(dict, deflate(content.as_bytes())?).with_compression(false);
        Ok(self.doc.add_object(stream))
    }

    /// Append an annotation reference to the page's /Annots array
    fn attach(&mut self, page_id: ObjectId, annot_id: ObjectId) -> Result<(), HighlightError> {
        let annots_ref = self
            .doc
            .get_dictionary(page_id)
            .map_err(|e| HighlightError::Annotation(e.to_string()))?
            .get(b"Annots")
            .ok()
            .and_then(|o| o.as_reference().ok());

        if let Some(array_id) = annots_ref {
            if let Ok(Object::Array(arr)) = self.doc.get_object_mut(array_id) {
                arr.push(Object::Reference(annot_id));
                return Ok(());
            }
        }

        let page: &mut Dictionary = self
            .doc
            .get_dictionary_mut(page_id)
            .map_err(|e| HighlightError::Annotation(e.to_string()))?;
        if let Ok(Object::Array(arr)) = page.get_mut(b"Annots") {
            arr.push(Object::Reference(annot_id));
        } else {
            page.set("Annots", vec![Object::Reference(annot_id)]);
        }
        Ok(())
    }
}

impl AnnotationBackend for LopdfAnnotator<'_> {
    fn probe_highlight(&self, page: u32, rect: &Rect) -> Binding {
        let binds = self
            .word_boxes
            .get(&page)
            .is_some_and(|boxes| boxes.iter().any(|b| b.intersects(rect)));
        if binds {
            Binding::Bound
        } else {
            Binding::Unsupported
        }
    }

    fn add_highlight(
        &mut self,
        page: u32,
        rect: &Rect,
        style: &MarkStyle,
    ) -> Result<(), HighlightError> {
        let content = format!(
            "/GS0 gs {} rg 0 0 {} {} re f",
            rgb_operands(&style.color),
            fmt_num(rect.width()),
            fmt_num(rect.height())
        );
        self.add_annotation(page, rect, style, "Highlight", content)
    }

    fn add_outline(&mut self, page: u32, rect: &Rect, style: &MarkStyle) -> Result<(), HighlightError> {
        let content = format!(
            "{} RG 1 w 0.5 0.5 {} {} re S",
            rgb_operands(&style.color),
            fmt_num((rect.width() - 1.0).max(0.0)),
            fmt_num((rect.height() - 1.0).max(0.0))
        );
        self.add_annotation(page, rect, style, "Square", content)
    }
}

fn rgb_operands(color: &Color) -> String {
    let [r, g, b] = color.components();
    format!("{} {} {}", fmt_num(r), fmt_num(g), fmt_num(b))
}

fn fmt_num(v: f32) -> String {
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, HighlightError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Set /Title in the document information dictionary
pub fn set_document_title(doc: &mut Document, title: &str) {
    let info_id = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|o| o.as_reference().ok());

    if let Some(id) = info_id {
        if let Ok(info) = doc.get_dictionary_mut(id) {
            info.set("Title", Object::string_literal(title));
            return;
        }
    }

    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal(title),
    });
    doc.trailer.set("Info", info_id);
}

/// Compress and serialize the document
pub fn save_document(doc: &mut Document) -> Result<Vec<u8>, HighlightError> {
    doc.compress();
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|e| HighlightError::Save(e.to_string()))?;
    Ok(output)
}
