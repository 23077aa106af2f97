use std::collections::BTreeSet;

use image::DynamicImage;

use crate::annotate::{ACCEPTED_COLOR, COMPARISON_COLOR, HoldAnnotator};
use crate::detection::ColorClassifier;
use crate::detection::preprocessing::encode_jpeg;
use crate::error::{PipelineError, Result};
use crate::models::{Detection, RenderRole, Rendering};

/// The two renderings built for every submission.
#[derive(Debug, Clone)]
pub struct RouteRenderings {
    pub accepted: Rendering,
    pub comparison: Rendering,
}

#[derive(Debug, Clone)]
pub struct RouteRenderer {
    annotator: HoldAnnotator,
    classifier: ColorClassifier,
    /// Re-derive hold colours from the image instead of trusting the
    /// colours echoed back by the client.
    pub recolor: bool,
    /// Draw colour labels next to the outlines.
    pub label: bool,
}

impl RouteRenderer {
    pub fn new(annotator: HoldAnnotator) -> Self {
        Self {
            annotator,
            classifier: ColorClassifier::new(),
            recolor: true,
            label: true,
        }
    }

    pub fn with_recolor(mut self, recolor: bool) -> Self {
        self.recolor = recolor;
        self
    }

    pub fn with_labels(mut self, label: bool) -> Self {
        self.label = label;
        self
    }

    /// Build the accepted (blue) and comparison (red) renderings of the
    /// selected holds.
    ///
    /// Ids missing from `all_detections` are skipped; if none remain the
    /// selection is rejected with `EmptySelection`.
    pub fn render(
        &self,
        base_image: &DynamicImage,
        all_detections: &[Detection],
        selected_ids: &BTreeSet<u32>,
    ) -> Result<RouteRenderings> {
        let mut holds = select_holds(all_detections, selected_ids);
        if holds.is_empty() {
            return Err(PipelineError::EmptySelection);
        }
        if holds.len() < selected_ids.len() {
            tracing::debug!(
                requested = selected_ids.len(),
                resolved = holds.len(),
                "ignoring selected ids without a matching detection"
            );
        }

        if self.recolor {
            let pixels = base_image.to_rgb8();
            for hold in &mut holds {
                if let Some(region) = hold.bbox.extract_region(&pixels) {
                    hold.color = self.classifier.classify(&region);
                }
            }
        }

        let accepted = self.annotator.annotate(base_image, &holds, ACCEPTED_COLOR, self.label);
        let comparison = self.annotator.annotate(base_image, &holds, COMPARISON_COLOR, self.label);

        Ok(RouteRenderings {
            accepted: Rendering {
                role: RenderRole::Accepted,
                jpeg: encode_jpeg(&accepted)?,
                image: accepted,
            },
            comparison: Rendering {
                role: RenderRole::Comparison,
                jpeg: encode_jpeg(&comparison)?,
                image: comparison,
            },
        })
    }
}

/// The detections whose ids were selected, in detection order.
pub fn select_holds(all_detections: &[Detection], selected_ids: &BTreeSet<u32>) -> Vec<Detection> {
    all_detections
        .iter()
        .filter(|d| selected_ids.contains(&d.id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, HoldColor};
    use image::{Rgb, RgbImage};

    fn detection(id: u32, x1: u32, y1: u32) -> Detection {
        Detection {
            id,
            class: "hold".to_string(),
            confidence: 0.8,
            color: HoldColor::Unknown,
            bbox: BoundingBox::new(x1, y1, x1 + 30, y1 + 30).unwrap(),
        }
    }

    fn base() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(160, 120, Rgb([90, 90, 90])))
    }

    #[test]
    fn test_renders_only_selected_holds() {
        let renderer = RouteRenderer::new(HoldAnnotator::new()).with_labels(false);
        let all = vec![detection(0, 10, 40), detection(1, 100, 40)];
        let out = renderer.render(&base(), &all, &BTreeSet::from([0])).unwrap();

        assert_eq!(out.accepted.image.dimensions(), (160, 120));
        assert_eq!(out.comparison.image.dimensions(), (160, 120));
        assert_eq!(*out.accepted.image.get_pixel(10, 50), ACCEPTED_COLOR);
        assert_eq!(*out.comparison.image.get_pixel(10, 50), COMPARISON_COLOR);
        // Hold 1 was not selected.
        assert_eq!(*out.accepted.image.get_pixel(100, 50), Rgb([90, 90, 90]));
        assert_eq!(out.accepted.role, RenderRole::Accepted);
        assert_eq!(out.comparison.role, RenderRole::Comparison);
        assert!(!out.accepted.jpeg.is_empty());
    }

    #[test]
    fn test_unknown_ids_only_is_empty_selection() {
        let renderer = RouteRenderer::new(HoldAnnotator::new());
        let all = vec![detection(0, 10, 40)];
        let err = renderer.render(&base(), &all, &BTreeSet::from([5, 9])).unwrap_err();
        assert!(matches!(err, PipelineError::EmptySelection));
    }

    #[test]
    fn test_select_holds_keeps_detection_order() {
        let all = vec![detection(2, 0, 0), detection(0, 40, 0), detection(1, 80, 0)];
        let ids: Vec<u32> = select_holds(&all, &BTreeSet::from([1, 2])).iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
