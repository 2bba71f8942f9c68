//! Per-keeper color assignment

use crate::keeper::KeeperKey;
use std::collections::HashMap;
use std::fmt;

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    /// Build from a 0xRRGGBB value
    pub const fn from_hex(rgb: u32) -> Self {
        Self {
            r: ((rgb >> 16) & 0xFF) as u8,
            g: ((rgb >> 8) & 0xFF) as u8,
            b: (rgb & 0xFF) as u8,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Components in 0.0..=1.0, as PDF color operands expect
    pub fn components(&self) -> [f32; 3] {
        [self.r, self.g, self.b].map(|c| c as f32 / 255.0)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Reference highlight palette, in assignment order
pub const PALETTE: [Color; 6] = [
    Color::from_hex(0xFCF485),
    Color::from_hex(0xC5FB72),
    Color::from_hex(0x38E5FF),
    Color::from_hex(0xDCAAFF),
    Color::from_hex(0xFFA97B),
    Color::from_hex(0xF86464),
];

/// Assigns palette colors to keepers in first-seen order.
///
/// One assigner serves one document; the palette wraps once exhausted.
#[derive(Debug, Clone)]
pub struct ColorAssigner {
    palette: Vec<Color>,
    cursor: usize,
    bindings: HashMap<KeeperKey, Color>,
    order: Vec<KeeperKey>,
}

impl ColorAssigner {
    pub fn new() -> Self {
        Self::with_palette(PALETTE.to_vec())
    }

    /// Use a custom palette; an empty palette falls back to the reference one
    pub fn with_palette(palette: Vec<Color>) -> Self {
        let palette = if palette.is_empty() {
            PALETTE.to_vec()
        } else {
            palette
        };
        Self {
            palette,
            cursor: 0,
            bindings: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Color for `key`, binding the next palette entry on first sight
    pub fn assign(&mut self, key: &KeeperKey) -> Color {
        if let Some(&color) = self.bindings.get(key) {
            return color;
        }
        let color = self.palette[self.cursor % self.palette.len()];
        self.cursor += 1;
        self.bindings.insert(key.clone(), color);
        self.order.push(key.clone());
        log::debug!("keeper '{}' -> {}", key, color);
        color
    }

    pub fn get(&self, key: &KeeperKey) -> Option<Color> {
        self.bindings.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Bindings in first-seen order
    pub fn bindings(&self) -> Vec<(KeeperKey, Color)> {
        self.order
            .iter()
            .filter_map(|k| self.bindings.get(k).map(|&c| (k.clone(), c)))
            .collect()
    }
}

impl Default for ColorAssigner {
    fn default() -> Self {
        Self::new()
    }
}
