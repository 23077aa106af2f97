use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::{Detection, RouteImage};

pub const JPEG_DATA_URI: &str = "data:image/jpeg;base64";

#[derive(Debug, Serialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
    pub original_width: u32,
    pub original_height: u32,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub success: bool,
    pub detections: Vec<Detection>,
    pub total_detections: usize,
    /// Base64 JPEG of the resized image the detections refer to.
    pub image: String,
    pub image_format: &'static str,
    pub image_dimensions: ImageDimensions,
}

/// Body of `POST /select/{submission_id}`.
#[derive(Debug, Deserialize)]
pub struct SelectPayload {
    #[serde(default)]
    pub selected_ids: Vec<u32>,
    #[serde(default)]
    pub selected_detections: Vec<Detection>,
    #[serde(default)]
    pub all_detections: Vec<Detection>,
    /// Resized image returned by `/detect-holds`, optionally as a data URI.
    pub image_base64: String,
}

impl SelectPayload {
    /// Selected hold ids, falling back to the ids of `selected_detections`.
    pub fn hold_ids(&self) -> Vec<u32> {
        if self.selected_ids.is_empty() {
            self.selected_detections.iter().map(|d| d.id).collect()
        } else {
            self.selected_ids.clone()
        }
    }

    /// Detections the selection refers into.
    pub fn into_detections(self) -> Vec<Detection> {
        if self.all_detections.is_empty() {
            self.selected_detections
        } else {
            self.all_detections
        }
    }

    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(strip_data_uri(&self.image_base64).trim())
            .map_err(|e| PipelineError::InvalidInput(format!("image_base64 is not valid base64: {e}")))
    }
}

/// Drop a `data:<mime>;base64,` prefix, if any.
pub fn strip_data_uri(value: &str) -> &str {
    match value.strip_prefix("data:").and_then(|rest| rest.split_once(',')) {
        Some((_, data)) => data,
        None => value,
    }
}

#[derive(Debug, Serialize)]
pub struct ComparisonSummary {
    pub explanation: String,
}

#[derive(Debug, Serialize)]
pub struct SelectResponse {
    pub success: bool,
    pub is_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_image_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blue_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub red_filename: Option<String>,
    pub gemini_response: ComparisonSummary,
}

#[derive(Debug, Serialize)]
pub struct RoutesResponse {
    pub success: bool,
    pub images: Vec<RouteImage>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
}
