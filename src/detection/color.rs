//! Dominant-colour classification of hold regions.
//!
//! Pixels are converted to HSV (8-bit convention: hue `0..180`, saturation and
//! value `0..=255`), washed-out wall pixels are dropped, and the remainder is
//! clustered with k-means. The largest cluster's centroid names the colour.

use std::collections::BTreeSet;

use image::RgbImage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;

use crate::models::HoldColor;

const HUE_STEPS: f32 = 180.0;

/// Chromatic palette bands `[start, end)` on the 180-step hue circle. Red
/// wraps through zero.
const HUE_BANDS: [(HoldColor, f32, f32); 5] = [
    (HoldColor::Red, 165.0, 195.0),
    (HoldColor::Yellow, 15.0, 35.0),
    (HoldColor::Green, 35.0, 85.0),
    (HoldColor::Blue, 85.0, 130.0),
    (HoldColor::Purple, 130.0, 165.0),
];

#[derive(Debug, Clone)]
pub struct ColorClassifier {
    /// Number of k-means clusters.
    pub clusters: usize,
    /// Seed for centroid initialisation. Fixed so results are reproducible.
    pub seed: u64,
    pub max_iterations: usize,
    /// Fraction of each side kept when cropping to the centre of the region.
    pub center_fraction: f32,
    /// Minimum number of usable pixels needed to attempt clustering.
    pub min_samples: usize,
    /// Pixels at or below this saturation are treated as wall.
    pub min_saturation: u8,
    /// Pixels at or above this value are treated as wall.
    pub max_value: u8,
}

impl ColorClassifier {
    pub fn new() -> Self {
        Self {
            clusters: 3,
            seed: 42,
            max_iterations: 20,
            center_fraction: 0.7,
            min_samples: 9,
            min_saturation: 50,
            max_value: 220,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Name the dominant colour of `region`.
    ///
    /// Deterministic: the same region always yields the same colour.
    pub fn classify(&self, region: &RgbImage) -> HoldColor {
        let Some(center) = center_crop(region, self.center_fraction) else {
            return HoldColor::Unknown;
        };

        let samples: Vec<[u8; 3]> = center
            .pixels()
            .map(|p| rgb_to_hsv(p.0))
            .filter(|hsv| hsv[1] > self.min_saturation && hsv[2] < self.max_value)
            .collect();

        if samples.len() < self.min_samples.max(self.clusters) {
            return HoldColor::Unknown;
        }

        match self.dominant_centroid(&samples) {
            Some([h, s, v]) => hsv_to_color(h, s, v),
            None => HoldColor::Unknown,
        }
    }

    /// Lloyd's k-means over HSV samples; returns the centroid of the largest
    /// cluster, or `None` when there are fewer distinct samples than clusters.
    fn dominant_centroid(&self, samples: &[[u8; 3]]) -> Option<[f32; 3]> {
        let k = self.clusters.max(2);
        let distinct: BTreeSet<[u8; 3]> = samples.iter().copied().collect();
        if distinct.len() < k {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids: Vec<[f32; 3]> = distinct
            .iter()
            .choose_multiple(&mut rng, k)
            .into_iter()
            .map(|p| to_f32(*p))
            .collect();

        let points: Vec<[f32; 3]> = samples.iter().map(|p| to_f32(*p)).collect();
        let mut labels = vec![usize::MAX; points.len()];

        for _ in 0..self.max_iterations {
            let mut changed = false;
            for (label, point) in labels.iter_mut().zip(&points) {
                let nearest = nearest_centroid(&centroids, point);
                if *label != nearest {
                    *label = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }

            let mut sums = vec![[0.0f32; 3]; k];
            let mut counts = vec![0usize; k];
            for (label, point) in labels.iter().zip(&points) {
                counts[*label] += 1;
                for c in 0..3 {
                    sums[*label][c] += point[c];
                }
            }
            for (i, centroid) in centroids.iter_mut().enumerate() {
                // Empty clusters keep their previous centroid.
                if counts[i] > 0 {
                    let n = counts[i] as f32;
                    *centroid = [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n];
                }
            }
        }

        let mut counts = vec![0usize; k];
        for label in &labels {
            counts[*label] += 1;
        }
        let dominant = counts
            .iter()
            .enumerate()
            .fold(0, |best, (i, count)| if *count > counts[best] { i } else { best });
        Some(centroids[dominant])
    }
}

impl Default for ColorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn center_crop(region: &RgbImage, fraction: f32) -> Option<RgbImage> {
    let (width, height) = region.dimensions();
    let crop_w = ((width as f32 * fraction) as u32).max(1).min(width);
    let crop_h = ((height as f32 * fraction) as u32).max(1).min(height);
    if width < 2 || height < 2 {
        return None;
    }
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;
    Some(image::imageops::crop_imm(region, x, y, crop_w, crop_h).to_image())
}

fn to_f32(p: [u8; 3]) -> [f32; 3] {
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

fn nearest_centroid(centroids: &[[f32; 3]], point: &[f32; 3]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = (c[0] - point[0]).powi(2) + (c[1] - point[1]).powi(2) + (c[2] - point[2]).powi(2);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// Convert an RGB pixel to 8-bit HSV (hue halved to fit `0..180`).
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    [
        ((h / 2.0).round() as u32 % 180) as u8,
        s.round().min(255.0) as u8,
        max as u8,
    ]
}

/// Map an HSV centroid to the nearest palette colour.
///
/// Low value is black and low saturation is white or gray. Chromatic hues
/// take the band they fall in: distance to a band is zero inside it, and the
/// bands tile the hue circle.
pub fn hsv_to_color(h: f32, s: f32, v: f32) -> HoldColor {
    if v < 50.0 {
        return HoldColor::Black;
    }
    if s < 50.0 {
        return if v > 200.0 { HoldColor::White } else { HoldColor::Gray };
    }

    let h = h.rem_euclid(HUE_STEPS);
    HUE_BANDS
        .iter()
        .find(|(_, start, end)| (h - start).rem_euclid(HUE_STEPS) < end - start)
        .map(|(color, _, _)| *color)
        .unwrap_or(HoldColor::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// A hold-sized patch of `base` with a sprinkle of darker and lighter
    /// shades so the region is never a single colour.
    fn textured_patch(base: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(40, 40, |x, y| {
            let shade = match (x * 7 + y * 13) % 5 {
                0 => -25i16,
                1 => -12,
                2 => 12,
                _ => 0,
            };
            let channel = |c: u8| (c as i16 + shade).clamp(0, 255) as u8;
            Rgb([channel(base[0]), channel(base[1]), channel(base[2])])
        })
    }

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
    }

    #[test]
    fn test_palette_mapping() {
        assert_eq!(hsv_to_color(2.0, 200.0, 200.0), HoldColor::Red);
        assert_eq!(hsv_to_color(175.0, 200.0, 200.0), HoldColor::Red);
        assert_eq!(hsv_to_color(28.0, 200.0, 200.0), HoldColor::Yellow);
        assert_eq!(hsv_to_color(60.0, 200.0, 200.0), HoldColor::Green);
        assert_eq!(hsv_to_color(115.0, 200.0, 200.0), HoldColor::Blue);
        assert_eq!(hsv_to_color(150.0, 200.0, 200.0), HoldColor::Purple);
        assert_eq!(hsv_to_color(0.0, 200.0, 30.0), HoldColor::Black);
        assert_eq!(hsv_to_color(0.0, 10.0, 240.0), HoldColor::White);
        assert_eq!(hsv_to_color(0.0, 10.0, 120.0), HoldColor::Gray);
    }

    #[test]
    fn test_palette_band_edges() {
        let cases = [
            (0.0, HoldColor::Red),
            (13.0, HoldColor::Red),
            (14.9, HoldColor::Red),
            (15.0, HoldColor::Yellow),
            (34.9, HoldColor::Yellow),
            (35.0, HoldColor::Green),
            (42.0, HoldColor::Green),
            (84.0, HoldColor::Green),
            (85.0, HoldColor::Blue),
            (128.0, HoldColor::Blue),
            (130.0, HoldColor::Purple),
            (164.0, HoldColor::Purple),
            (165.0, HoldColor::Red),
            (179.5, HoldColor::Red),
            (180.0, HoldColor::Red),
        ];
        for (h, expected) in cases {
            assert_eq!(hsv_to_color(h, 200.0, 200.0), expected, "hue {h}");
        }
    }

    #[test]
    fn test_classifies_textured_holds() {
        let classifier = ColorClassifier::new();
        assert_eq!(classifier.classify(&textured_patch([200, 30, 30])), HoldColor::Red);
        assert_eq!(classifier.classify(&textured_patch([30, 170, 40])), HoldColor::Green);
        assert_eq!(classifier.classify(&textured_patch([30, 50, 200])), HoldColor::Blue);
        assert_eq!(classifier.classify(&textured_patch([210, 190, 20])), HoldColor::Yellow);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = ColorClassifier::new().with_seed(7);
        let patch = RgbImage::from_fn(30, 30, |x, y| {
            if (x + y) % 3 == 0 {
                Rgb([40, 60, 190])
            } else {
                Rgb([160, 40, 150 + (x % 20) as u8])
            }
        });
        let first = classifier.classify(&patch);
        for _ in 0..5 {
            assert_eq!(classifier.classify(&patch), first);
        }
    }

    #[test]
    fn test_tiny_region_is_unknown() {
        let classifier = ColorClassifier::new();
        let patch = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        assert_eq!(classifier.classify(&patch), HoldColor::Unknown);
        let patch = RgbImage::from_fn(3, 3, |x, _| Rgb([200, 10 * x as u8, 10]));
        assert_eq!(classifier.classify(&patch), HoldColor::Unknown);
    }

    #[test]
    fn test_single_colour_region_is_unknown() {
        let classifier = ColorClassifier::new();
        let patch = RgbImage::from_pixel(40, 40, Rgb([200, 20, 20]));
        assert_eq!(classifier.classify(&patch), HoldColor::Unknown);
    }

    #[test]
    fn test_bare_wall_is_unknown() {
        let classifier = ColorClassifier::new();
        let wall = RgbImage::from_fn(40, 40, |x, y| {
            let v = 225 + ((x + y) % 20) as u8;
            Rgb([v, v, v])
        });
        assert_eq!(classifier.classify(&wall), HoldColor::Unknown);
    }
}
