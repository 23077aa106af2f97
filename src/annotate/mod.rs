//! Drawing hold outlines and colour labels on wall images.

pub mod label;

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::models::Detection;
pub use label::LabelFont;

/// Outline colour of holds in a stored route rendering.
pub const ACCEPTED_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
/// Outline colour of holds in a duplicate-scan query rendering.
pub const COMPARISON_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Outline colour of the full-detection preview.
pub const PREVIEW_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

/// Gap between a box's top edge and its label.
const LABEL_GAP: i32 = 3;

#[derive(Debug, Clone)]
pub struct HoldAnnotator {
    pub stroke_width: u32,
    pub font: LabelFont,
}

impl HoldAnnotator {
    pub fn new() -> Self {
        Self {
            stroke_width: 3,
            font: LabelFont::default(),
        }
    }

    pub fn with_stroke_width(mut self, stroke_width: u32) -> Self {
        self.stroke_width = stroke_width.max(1);
        self
    }

    pub fn with_font(mut self, font: LabelFont) -> Self {
        self.font = font;
        self
    }

    /// Draw `holds` onto a copy of `image`.
    ///
    /// The input is left untouched and the output has the same dimensions.
    /// Labels carry the hold's colour name and sit above the box, pushed
    /// back inside the image when the box touches an edge.
    pub fn annotate(
        &self,
        image: &DynamicImage,
        holds: &[Detection],
        box_color: Rgb<u8>,
        label: bool,
    ) -> RgbImage {
        let mut canvas = image.to_rgb8();
        for hold in holds {
            self.draw_box(&mut canvas, hold, box_color);
            if label {
                self.draw_label(&mut canvas, hold, box_color);
            }
        }
        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, hold: &Detection, color: Rgb<u8>) {
        let (w, h) = canvas.dimensions();
        let x_min = hold.bbox.x1.min(w.saturating_sub(1));
        let y_min = hold.bbox.y1.min(h.saturating_sub(1));
        let x_max = hold.bbox.x2.min(w).max(x_min + 1);
        let y_max = hold.bbox.y2.min(h).max(y_min + 1);
        let rw = x_max - x_min;
        let rh = y_max - y_min;

        // Thick strokes are nested one-pixel outlines growing inward.
        let layers = self.stroke_width.min(rw.div_ceil(2)).min(rh.div_ceil(2)).max(1);
        for t in 0..layers {
            let inner_w = rw.saturating_sub(2 * t).max(1);
            let inner_h = rh.saturating_sub(2 * t).max(1);
            let rect = Rect::at((x_min + t) as i32, (y_min + t) as i32).of_size(inner_w, inner_h);
            draw_hollow_rect_mut(canvas, rect, color);
        }
    }

    fn draw_label(&self, canvas: &mut RgbImage, hold: &Detection, color: Rgb<u8>) {
        let text = hold.color.as_str();
        let (tw, th) = self.font.text_size(text);
        let (w, _) = canvas.dimensions();

        let y = (hold.bbox.y1 as i32 - th as i32 - LABEL_GAP).max(0);
        let x = (hold.bbox.x1 as i32).min(w as i32 - tw as i32).max(0);
        self.font.draw(canvas, color, x, y, text);
    }
}

impl Default for HoldAnnotator {
    fn default() -> Self {
        Self::new()
    }
}
