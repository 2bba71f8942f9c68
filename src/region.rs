//! Highlight region computation
//!
//! Regions use the same top-left origin as extracted words.

use crate::extractor::{PageGeometry, Word};

/// Default minimum width/height of a region worth highlighting
pub const DEFAULT_MIN_DIMENSION: f32 = 0.5;

/// Axis-aligned rectangle, top-left origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.top < other.bottom && other.top < self.bottom
    }

    /// Union bounding box of a set of words
    pub fn bounding<'a>(words: impl IntoIterator<Item = &'a Word>) -> Option<Rect> {
        words.into_iter().fold(None, |acc: Option<Rect>, w| {
            Some(match acc {
                None => Rect {
                    x0: w.x0,
                    top: w.top,
                    x1: w.x1,
                    bottom: w.bottom,
                },
                Some(r) => Rect {
                    x0: r.x0.min(w.x0),
                    top: r.top.min(w.top),
                    x1: r.x1.max(w.x1),
                    bottom: r.bottom.max(w.bottom),
                },
            })
        })
    }

    /// Grow every side by `margin`
    pub fn padded(&self, margin: f32) -> Rect {
        Rect {
            x0: self.x0 - margin,
            top: self.top - margin,
            x1: self.x1 + margin,
            bottom: self.bottom + margin,
        }
    }
}

/// Computes clipped highlight rectangles for word spans
#[derive(Debug, Clone, Copy)]
pub struct RegionComputer {
    pub padding: f32,
    pub min_dimension: f32,
}

impl Default for RegionComputer {
    fn default() -> Self {
        Self {
            padding: 0.0,
            min_dimension: DEFAULT_MIN_DIMENSION,
        }
    }
}

impl RegionComputer {
    pub fn new(padding: f32, min_dimension: f32) -> Self {
        Self {
            padding: padding.max(0.0),
            min_dimension,
        }
    }

    /// Region covering `words` on a page, or `None` when the clipped box
    /// is too small in either dimension
    pub fn region<'a>(
        &self,
        words: impl IntoIterator<Item = &'a Word>,
        page: &PageGeometry,
    ) -> Option<Rect> {
        let bbox = Rect::bounding(words)?.padded(self.padding);
        let clipped = Rect {
            x0: bbox.x0.max(0.0),
            top: bbox.top.max(0.0),
            x1: bbox.x1.min(page.width()),
            bottom: bbox.bottom.min(page.height()),
        };

        // NaN coordinates fail both comparisons and are rejected too
        if clipped.width() >= self.min_dimension && clipped.height() >= self.min_dimension {
            Some(clipped)
        } else {
            None
        }
    }
}
