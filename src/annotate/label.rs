//! Text rendering for hold labels.
//!
//! A TrueType font is used when one is configured; otherwise labels fall back
//! to a built-in 5x7 lowercase bitmap face, which covers every palette name.

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

/// Rows of each lowercase glyph, most significant of the low 5 bits on the left.
const LOWERCASE: [[u8; 7]; 26] = [
    [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F], // a
    [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x1E], // b
    [0x00, 0x00, 0x0E, 0x10, 0x10, 0x11, 0x0E], // c
    [0x01, 0x01, 0x0D, 0x13, 0x11, 0x11, 0x0F], // d
    [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E], // e
    [0x06, 0x09, 0x08, 0x1C, 0x08, 0x08, 0x08], // f
    [0x00, 0x0F, 0x11, 0x11, 0x0F, 0x01, 0x0E], // g
    [0x10, 0x10, 0x16, 0x19, 0x11, 0x11, 0x11], // h
    [0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x0E], // i
    [0x02, 0x00, 0x06, 0x02, 0x02, 0x12, 0x0C], // j
    [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12], // k
    [0x0C, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E], // l
    [0x00, 0x00, 0x1A, 0x15, 0x15, 0x11, 0x11], // m
    [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11], // n
    [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E], // o
    [0x00, 0x00, 0x1E, 0x11, 0x1E, 0x10, 0x10], // p
    [0x00, 0x00, 0x0D, 0x13, 0x0F, 0x01, 0x01], // q
    [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10], // r
    [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E], // s
    [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06], // t
    [0x00, 0x00, 0x11, 0x11, 0x11, 0x13, 0x0D], // u
    [0x00, 0x00, 0x11, 0x11, 0x11, 0x0A, 0x04], // v
    [0x00, 0x00, 0x11, 0x11, 0x15, 0x15, 0x0A], // w
    [0x00, 0x00, 0x11, 0x0A, 0x04, 0x0A, 0x11], // x
    [0x00, 0x00, 0x11, 0x11, 0x0F, 0x01, 0x0E], // y
    [0x00, 0x00, 0x1F, 0x02, 0x04, 0x08, 0x1F], // z
];

#[derive(Clone)]
pub enum LabelFont {
    Bitmap { scale: u32 },
    TrueType { font: FontArc, scale: PxScale },
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bitmap { scale } => f.debug_struct("Bitmap").field("scale", scale).finish(),
            Self::TrueType { scale, .. } => f.debug_struct("TrueType").field("scale", &scale.y).finish(),
        }
    }
}

impl LabelFont {
    pub fn bitmap(scale: u32) -> Self {
        Self::Bitmap { scale: scale.max(1) }
    }

    /// Load a TrueType/OpenType font from disk.
    pub fn from_file(path: &std::path::Path, px: f32) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read label font {}: {}", path.display(), e))?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| anyhow::anyhow!("Invalid label font {}: {}", path.display(), e))?;
        Ok(Self::TrueType {
            font,
            scale: PxScale::from(px),
        })
    }

    /// Rendered `(width, height)` of `text`.
    pub fn text_size(&self, text: &str) -> (u32, u32) {
        match self {
            Self::Bitmap { scale } => {
                let chars = text.chars().count() as u32;
                if chars == 0 {
                    return (0, 0);
                }
                ((chars * GLYPH_ADVANCE - 1) * scale, GLYPH_HEIGHT * scale)
            }
            Self::TrueType { font, scale } => text_size(*scale, font, text),
        }
    }

    pub fn draw(&self, canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, text: &str) {
        match self {
            Self::Bitmap { scale } => draw_bitmap_text(canvas, color, x, y, *scale, text),
            Self::TrueType { font, scale } => draw_text_mut(canvas, color, x, y, *scale, font, text),
        }
    }
}

impl Default for LabelFont {
    fn default() -> Self {
        Self::bitmap(2)
    }
}

fn draw_bitmap_text(canvas: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, scale: u32, text: &str) {
    let step = scale as i32;
    for (i, ch) in text.chars().enumerate() {
        let Some(rows) = glyph(ch) else {
            continue;
        };
        let origin_x = x + (i as u32 * GLYPH_ADVANCE) as i32 * step;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (0x10 >> col) != 0 {
                    let rect = Rect::at(origin_x + col as i32 * step, y + row as i32 * step)
                        .of_size(scale, scale);
                    draw_filled_rect_mut(canvas, rect, color);
                }
            }
        }
    }
}

fn glyph(ch: char) -> Option<&'static [u8; 7]> {
    let lower = ch.to_ascii_lowercase();
    lower
        .is_ascii_lowercase()
        .then(|| &LOWERCASE[(lower as u8 - b'a') as usize])
}
