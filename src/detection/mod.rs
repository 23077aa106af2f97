pub mod color;
pub mod preprocessing;
pub mod remote;

use std::sync::Arc;

use image::{DynamicImage, RgbImage};

use crate::annotate::{HoldAnnotator, PREVIEW_COLOR};
use crate::error::{PipelineError, Result};
use crate::models::{BoundingBox, Detection};
use crate::worker::WorkerPool;
pub use color::ColorClassifier;
pub use remote::{HoldDetector, RawPrediction, RoboflowDetector};

pub const DEFAULT_CANONICAL_SIZE: u32 = 1024;
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.40;

/// Result of running detection on one uploaded image.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// The upload resized to the canonical square resolution.
    pub resized: RgbImage,
    /// JPEG encoding of `resized`, as sent to the detector.
    pub resized_jpeg: Vec<u8>,
    pub detections: Vec<Detection>,
    pub original_width: u32,
    pub original_height: u32,
}

/// Hold detection orchestrator: resize, detect, classify colours.
pub struct DetectionService<D> {
    detector: Arc<D>,
    classifier: ColorClassifier,
    pool: WorkerPool,
    pub canonical_size: u32,
    pub min_confidence: f32,
}

impl<D: HoldDetector> DetectionService<D> {
    pub fn new(detector: Arc<D>, pool: WorkerPool) -> Self {
        Self {
            detector,
            classifier: ColorClassifier::new(),
            pool,
            canonical_size: DEFAULT_CANONICAL_SIZE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_canonical_size(mut self, size: u32) -> Self {
        self.canonical_size = size.max(1);
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    /// Run the full detection pass on an uploaded image.
    ///
    /// Detector failures abort the call with `UpstreamDetection` and are not
    /// retried. An image without holds yields an empty list.
    pub async fn detect(&self, image: DynamicImage) -> Result<DetectionResult> {
        let original_width = image.width();
        let original_height = image.height();
        if original_width == 0 || original_height == 0 {
            return Err(PipelineError::InvalidInput("image has no pixels".to_string()));
        }

        let size = self.canonical_size;
        let (resized, resized_jpeg) = self
            .pool
            .run_blocking("resize", move || {
                let resized = preprocessing::to_canonical(&image, size);
                let jpeg = preprocessing::encode_jpeg(&resized)?;
                Ok::<_, PipelineError>((resized, jpeg))
            })
            .await??;
        tracing::debug!(original_width, original_height, size, "resized upload");

        let predictions = self
            .pool
            .run("detect", self.detector.detect(&resized_jpeg, self.min_confidence))
            .await??;
        let returned = predictions.len();

        let boxes: Vec<(RawPrediction, BoundingBox)> = predictions
            .into_iter()
            .filter(|p| p.confidence >= self.min_confidence)
            .filter_map(|p| {
                let bbox = BoundingBox::from_center(p.x, p.y, p.width, p.height, size, size)?;
                Some((p, bbox))
            })
            .collect();

        let classifier = self.classifier.clone();
        let (resized, detections) = self
            .pool
            .run_blocking("classify", move || {
                let detections = boxes
                    .into_iter()
                    .enumerate()
                    .map(|(id, (prediction, bbox))| {
                        let color = bbox
                            .extract_region(&resized)
                            .map(|region| classifier.classify(&region))
                            .unwrap_or_default();
                        Detection {
                            id: id as u32,
                            class: prediction.class,
                            confidence: prediction.confidence,
                            color,
                            bbox,
                        }
                    })
                    .collect::<Vec<_>>();
                (resized, detections)
            })
            .await?;

        tracing::info!(
            returned,
            kept = detections.len(),
            min_confidence = self.min_confidence,
            "hold detection finished"
        );

        Ok(DetectionResult {
            resized,
            resized_jpeg,
            detections,
            original_width,
            original_height,
        })
    }
}

/// Render every detection on the resized image, labelled with its colour.
pub fn annotate_preview(annotator: &HoldAnnotator, result: &DetectionResult) -> RgbImage {
    let image = DynamicImage::ImageRgb8(result.resized.clone());
    annotator.annotate(&image, &result.detections, PREVIEW_COLOR, true)
}
