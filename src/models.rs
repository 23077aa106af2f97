use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{PipelineError, Result};

/// Axis-aligned box in canonical-image pixel coordinates.
///
/// `x2`/`y2` are exclusive, so `width() == x2 - x1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BoxWire", into = "BoxWire")]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self> {
        if x2 <= x1 || y2 <= y1 {
            return Err(PipelineError::InvalidInput(format!(
                "degenerate bounding box ({x1}, {y1})-({x2}, {y2})"
            )));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Build a box from detector center-format output, clamped into a
    /// `width` x `height` image. Returns `None` if nothing is left after
    /// clamping.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, width: u32, height: u32) -> Option<Self> {
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
            return None;
        }
        let clamp_x = |v: f32| v.round().clamp(0.0, width as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, height as f32) as u32;
        let x1 = clamp_x(cx - w / 2.0);
        let x2 = clamp_x(cx + w / 2.0);
        let y1 = clamp_y(cy - h / 2.0);
        let y2 = clamp_y(cy + h / 2.0);
        Self::new(x1, y1, x2, y2).ok()
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Get center coordinates
    pub fn center(&self) -> (u32, u32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x2 <= width && self.y2 <= height
    }

    /// Copy the boxed region out of `img`, clipped to the image.
    pub fn extract_region(&self, img: &RgbImage) -> Option<RgbImage> {
        let x = self.x1.min(img.width());
        let y = self.y1.min(img.height());
        let width = self.x2.min(img.width()).saturating_sub(x);
        let height = self.y2.min(img.height()).saturating_sub(y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(image::imageops::crop_imm(img, x, y, width, height).to_image())
    }
}

#[derive(Serialize, Deserialize)]
struct BoxWire {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    #[serde(default, skip_deserializing)]
    width: u32,
    #[serde(default, skip_deserializing)]
    height: u32,
    #[serde(default, skip_deserializing)]
    center_x: u32,
    #[serde(default, skip_deserializing)]
    center_y: u32,
}

impl TryFrom<BoxWire> for BoundingBox {
    type Error = String;

    fn try_from(wire: BoxWire) -> std::result::Result<Self, Self::Error> {
        let coord = |v: f64| {
            if v.is_finite() && v >= 0.0 && v <= u32::MAX as f64 {
                Ok(v.round() as u32)
            } else {
                Err(format!("invalid bounding box coordinate {v}"))
            }
        };
        BoundingBox::new(coord(wire.x1)?, coord(wire.y1)?, coord(wire.x2)?, coord(wire.y2)?)
            .map_err(|e| e.to_string())
    }
}

impl From<BoundingBox> for BoxWire {
    fn from(bbox: BoundingBox) -> Self {
        let (center_x, center_y) = bbox.center();
        Self {
            x1: bbox.x1 as f64,
            y1: bbox.y1 as f64,
            x2: bbox.x2 as f64,
            y2: bbox.y2 as f64,
            width: bbox.width(),
            height: bbox.height(),
            center_x,
            center_y,
        }
    }
}

/// Named hold colours the classifier can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum HoldColor {
    Red,
    Yellow,
    Green,
    Blue,
    Purple,
    Black,
    White,
    Gray,
    #[default]
    Unknown,
}

impl HoldColor {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Blue => "blue",
            Self::Purple => "purple",
            Self::Black => "black",
            Self::White => "white",
            Self::Gray => "gray",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for HoldColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldColor {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "red" => Self::Red,
            "yellow" => Self::Yellow,
            "green" => Self::Green,
            "blue" => Self::Blue,
            "purple" => Self::Purple,
            "black" => Self::Black,
            "white" => Self::White,
            "gray" | "grey" => Self::Gray,
            _ => Self::Unknown,
        })
    }
}

impl From<String> for HoldColor {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(color) => color,
            Err(never) => match never {},
        }
    }
}

impl From<HoldColor> for &'static str {
    fn from(color: HoldColor) -> Self {
        color.as_str()
    }
}

fn default_class() -> String {
    "hold".to_string()
}

/// A single detected hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: u32,
    #[serde(default = "default_class")]
    pub class: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub color: HoldColor,
    pub bbox: BoundingBox,
}

/// One route submission: the chosen holds and the image they were picked on.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub selected_ids: BTreeSet<u32>,
    pub all_detections: Vec<Detection>,
    pub base_image: DynamicImage,
}

impl SelectionRequest {
    pub fn new(
        selected_ids: impl IntoIterator<Item = u32>,
        all_detections: Vec<Detection>,
        base_image: DynamicImage,
    ) -> Self {
        Self {
            selected_ids: selected_ids.into_iter().collect(),
            all_detections,
            base_image,
        }
    }

    /// Reject requests that cannot produce a rendering.
    pub fn validate(&self) -> Result<()> {
        if self.selected_ids.is_empty() {
            return Err(PipelineError::EmptySelection);
        }
        let (width, height) = (self.base_image.width(), self.base_image.height());
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidInput("base image is empty".to_string()));
        }
        if let Some(outside) = self
            .all_detections
            .iter()
            .filter(|d| self.selected_ids.contains(&d.id))
            .find(|d| !d.bbox.fits_within(width, height))
        {
            return Err(PipelineError::InvalidInput(format!(
                "hold {} lies outside the {width}x{height} image",
                outside.id
            )));
        }
        Ok(())
    }
}

/// Which of the two route renderings an image is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderRole {
    /// Stored route, holds outlined in blue.
    Accepted,
    /// Duplicate-scan query, holds outlined in red. Never stored.
    Comparison,
}

impl RenderRole {
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Accepted => "blue",
            Self::Comparison => "red",
        }
    }
}

/// An annotated route image together with its encoded form.
#[derive(Debug, Clone)]
pub struct Rendering {
    pub role: RenderRole,
    pub image: RgbImage,
    pub jpeg: Vec<u8>,
}

/// A stored route, identified by its filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteImage {
    pub name: String,
}

impl RouteImage {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Creation time encoded in the filename, if it follows the naming scheme.
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        crate::core::store::naming::parse_timestamp(&self.name)
    }
}

impl fmt::Display for RouteImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Outcome of a duplicate scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonVerdict {
    pub is_match: bool,
    pub matched_route: Option<RouteImage>,
    pub explanation: String,
    /// Comparator calls attempted during the scan.
    pub comparisons: usize,
    /// Comparisons that errored and were treated as "no match".
    pub failures: usize,
}

impl ComparisonVerdict {
    pub fn no_match(explanation: impl Into<String>) -> Self {
        Self {
            is_match: false,
            matched_route: None,
            explanation: explanation.into(),
            comparisons: 0,
            failures: 0,
        }
    }
}
